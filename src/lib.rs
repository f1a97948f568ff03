pub mod analyze;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod formats;
pub mod hashing;
pub mod ingest;
pub mod logging;
pub mod normalize;
pub mod schema;

// Operator-facing seams (picker, prompts, device mounts) and their adapters
pub mod app;
pub mod infra;
