use anyhow::{anyhow, Context, Result};
use clap::Parser;
use gpsmax::schema::{bundled_for, compile, violations};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::exit;

/// Check a sidecar or normalization manifest against its JSON Schema.
#[derive(Parser, Debug)]
#[command(name = "validate-sidecar", version, about = "Validate a gpsmax sidecar or manifest against its schema")]
struct Cli {
    /// Sidecar or manifest JSON file
    path: PathBuf,

    /// Schema file to use instead of the bundled one named by the document's "schema" tag
    #[arg(long)]
    schema: Option<PathBuf>,
}

fn read_document(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not JSON", path.display()))
}

fn schema_for(document: &Value, explicit: Option<&Path>) -> Result<Value> {
    if let Some(path) = explicit {
        return read_document(path);
    }
    let tag = document
        .get("schema")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Document has no \"schema\" tag; pass --schema"))?;
    let text = bundled_for(tag).ok_or_else(|| anyhow!("No bundled schema for '{tag}'"))?;
    Ok(serde_json::from_str(text)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let document = read_document(&cli.path)?;
    let schema = compile(schema_for(&document, cli.schema.as_deref())?)?;

    let problems = violations(&schema, &document);
    if problems.is_empty() {
        println!("valid");
        return Ok(());
    }
    eprintln!("invalid: {} ({} problem(s))", cli.path.display(), problems.len());
    for problem in &problems {
        eprintln!("- {problem}");
    }
    exit(1)
}
