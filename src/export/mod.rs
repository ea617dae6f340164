//! CSV writer for the final dataset.

use crate::models::{DatasetRow, NormalizedRecord};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Write records as CSV with a header row. Absent values are empty cells.
pub fn write_csv<W: Write>(writer: W, records: &[NormalizedRecord]) -> Result<usize> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(writer);

    for record in records {
        wtr.serialize(DatasetRow::from(record))
            .with_context(|| format!("serialize {:?}", record.raw.address))?;
    }

    wtr.flush()?;
    Ok(records.len())
}

pub fn export_csv(path: &Path, records: &[NormalizedRecord]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Could not create {:?}", path))?;

    let n = write_csv(file, records)?;
    info!("Wrote {} rows to {:?}", n, path);
    Ok(n)
}
