//! Audit CSV of the filtered result set.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use arrow::csv::WriterBuilder;
use arrow::record_batch::RecordBatch;

/// Write `batches` to `path` as CSV with a header row.
///
/// Parent directories are created as needed. An empty result set produces an
/// empty file.
pub fn write_csv(path: &Path, batches: &[RecordBatch]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);

    for batch in batches {
        writer
            .write(batch)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    tracing::info!(
        path = %path.display(),
        rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
        "Wrote results CSV"
    );
    Ok(())
}
