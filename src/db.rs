use crate::error::{GpsmaxError, Result};
use crate::ingest::manifest::IngestManifest;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const MIGRATION: &str = include_str!("../migrations/001_create_ingest_tables.sql");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub run_id: i64,
    pub inserted: usize,
    pub skipped: usize,
}

/// SQLite store of imported ingest manifests.
pub struct IngestDb {
    conn: Connection,
}

impl IngestDb {
    /// Open (creating the file and its directory if needed) and apply the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(MIGRATION)?;
        Ok(Self { conn })
    }

    pub fn import(&mut self, manifest: &IngestManifest, manifest_path: &Path) -> Result<ImportReport> {
        if manifest.ingest_utc.is_empty() {
            return Err(GpsmaxError::MissingField("ingest_utc".to_string()));
        }
        let dest_base = &manifest.destination.dest_base;
        if dest_base.is_empty() {
            return Err(GpsmaxError::MissingField("destination.dest_base".to_string()));
        }
        let device_id = &manifest.device.device_id;
        let counts = &manifest.counts;

        let tx = self.conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM ingest_runs WHERE ingest_utc = ?1 AND device_id = ?2 AND dest_base = ?3",
                params![manifest.ingest_utc, device_id, dest_base],
                |row| row.get(0),
            )
            .optional()?;

        let run_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE ingest_runs SET planned = ?1, copied = ?2, records = ?3 WHERE id = ?4",
                    params![counts.planned, counts.copied, counts.records, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO ingest_runs (ingest_utc, device_id, mtp_uri, mtp_host, gvfs_mount,
                        dest_base, layout, planned, copied, records, manifest_path, imported_utc)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        manifest.ingest_utc,
                        device_id,
                        manifest.device.mtp_uri,
                        manifest.device.mtp_host,
                        manifest.device.gvfs_mount,
                        dest_base,
                        manifest.destination.layout,
                        counts.planned,
                        counts.copied,
                        counts.records,
                        manifest_path.to_string_lossy().into_owned(),
                        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false),
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        let mut inserted = 0;
        let mut skipped = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO ingest_files (ingest_run_id, category, source_path,
                    source_relpath, dest_path, dest_relpath, bytes, mtime_utc, sha256)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for file in &manifest.files {
                let Some(dest_relpath) = file.dest_relpath.as_deref() else {
                    warn!(dest = ?file.dest_path, "File entry without dest_relpath, skipping");
                    skipped += 1;
                    continue;
                };
                let changed = stmt.execute(params![
                    run_id,
                    file.category,
                    file.source_path,
                    file.source_relpath,
                    file.dest_path,
                    dest_relpath,
                    file.bytes,
                    file.mtime_utc,
                    file.sha256,
                ])?;
                if changed == 0 {
                    skipped += 1;
                } else {
                    inserted += 1;
                }
            }
        }
        tx.commit()?;

        Ok(ImportReport {
            run_id,
            inserted,
            skipped,
        })
    }

    pub fn file_count(&self, run_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM ingest_files WHERE ingest_run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Load an ingest `manifest.json` into the database at `db_path`. Re-importing
/// the same manifest inserts nothing new.
pub fn import_manifest(db_path: &Path, manifest_path: &Path) -> Result<ImportReport> {
    let text = fs::read_to_string(manifest_path)?;
    let manifest: IngestManifest = serde_json::from_str(&text)?;
    let mut db = IngestDb::open(db_path)?;
    let report = db.import(&manifest, manifest_path)?;
    info!(
        run_id = report.run_id,
        inserted = report.inserted,
        skipped = report.skipped,
        db = %db_path.display(),
        "Imported ingest manifest"
    );
    Ok(report)
}
