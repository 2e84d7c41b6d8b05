use crate::database::DatabaseError;
use crate::regions::{Region, RegionStore};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub rows_read: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub failed_batches: u64,
}

/// `code,name` row to a region. Anything else is rejected.
pub fn parse_row(record: &StringRecord) -> Option<Region> {
    if record.len() != 2 {
        return None;
    }
    let code = record.get(0)?.trim();
    let name = record.get(1)?.trim();
    if code.is_empty() || name.is_empty() {
        return None;
    }
    Region::from_code(code, name).ok()
}

pub async fn migrate_file(
    path: impl AsRef<Path>,
    store: &RegionStore,
    batch_size: usize,
) -> Result<MigrationReport, MigrationError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| MigrationError::Io {
        path: path.display().to_string(),
        source,
    })?;
    tracing::info!("Migrating regions from {}", path.display());
    migrate_csv(file, store, batch_size).await
}

/// Streams a headerless `code,name` CSV into the store in batches.
///
/// Existing codes are skipped without error. A failing batch is logged and
/// counted, and the run carries on with the next one.
pub async fn migrate_csv<R: Read>(
    reader: R,
    store: &RegionStore,
    batch_size: usize,
) -> Result<MigrationReport, MigrationError> {
    let batch_size = batch_size.max(1);
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut report = MigrationReport::default();
    let mut batch: Vec<Region> = Vec::with_capacity(batch_size);
    let mut batch_number = 0u64;

    for (line, record) in rdr.records().enumerate() {
        report.rows_read += 1;
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                tracing::warn!("Skipping unreadable row {}: {}", line + 1, e);
                report.skipped += 1;
                continue;
            }
        };

        match parse_row(&record) {
            Some(region) => batch.push(region),
            None => {
                tracing::debug!("Skipping invalid row {}: {:?}", line + 1, record);
                report.skipped += 1;
                continue;
            }
        }

        if batch.len() >= batch_size {
            batch_number += 1;
            flush(store, &mut batch, batch_number, &mut report).await;
        }
    }

    if !batch.is_empty() {
        batch_number += 1;
        flush(store, &mut batch, batch_number, &mut report).await;
    }

    tracing::info!(
        "Migration finished: {} inserted, {} duplicates, {} skipped, {} failed batches",
        report.inserted,
        report.duplicates,
        report.skipped,
        report.failed_batches
    );
    Ok(report)
}

async fn flush(
    store: &RegionStore,
    batch: &mut Vec<Region>,
    batch_number: u64,
    report: &mut MigrationReport,
) {
    let size = batch.len() as u64;
    match store.insert_batch(batch).await {
        Ok(inserted) => {
            report.inserted += inserted;
            report.duplicates += size.saturating_sub(inserted);
            tracing::info!(
                "Batch {}: {} of {} regions inserted",
                batch_number,
                inserted,
                size
            );
        }
        Err(e) => {
            report.failed_batches += 1;
            tracing::error!("Batch {} failed: {}", batch_number, e);
        }
    }
    batch.clear();
}
