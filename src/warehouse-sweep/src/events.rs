//! Path extraction and filtering over the warehouse result set.

use anyhow::{Context, Result};
use arrow::array::{Array, BooleanArray, StringArray};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use regex::Regex;

use crate::config::PathsConfig;

/// Reads logical table paths out of result rows.
#[derive(Debug, Clone)]
pub struct PathExtractor {
    column: String,
    pattern: Option<Regex>,
}

impl PathExtractor {
    pub fn new(column: impl Into<String>, pattern: Option<Regex>) -> Self {
        Self {
            column: column.into(),
            pattern,
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Result<Self> {
        Ok(Self::new(paths.column.clone(), paths.compiled_pattern()?))
    }

    /// One entry per row: the row's logical path, or `None` when the cell is
    /// null or does not match the pattern.
    pub fn extract(&self, batch: &RecordBatch) -> Result<Vec<Option<String>>> {
        let column = batch.column_by_name(&self.column).with_context(|| {
            format!(
                "Result set has no '{}' column (columns: {})",
                self.column,
                column_names(batch)
            )
        })?;

        let text = cast(column, &DataType::Utf8)
            .with_context(|| format!("Column '{}' cannot be read as text", self.column))?;
        let text = text
            .as_any()
            .downcast_ref::<StringArray>()
            .context("Text cast did not produce a string array")?;

        Ok(text
            .iter()
            .map(|cell| cell.and_then(|value| self.path_from(value)))
            .collect())
    }

    fn path_from(&self, value: &str) -> Option<String> {
        match &self.pattern {
            Some(pattern) => pattern
                .captures(value)
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str().to_string()),
            None => Some(value.to_string()),
        }
    }
}

fn column_names(batch: &RecordBatch) -> String {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result rows kept by the filter, with the path of each kept row.
#[derive(Debug, Clone, Default)]
pub struct FilteredEvents {
    pub batches: Vec<RecordBatch>,
    /// Extracted paths in row order; rows without a path are not listed
    pub paths: Vec<String>,
}

impl FilteredEvents {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }
}

/// Keeps rows whose extracted path starts with a prefix.
#[derive(Debug, Clone)]
pub struct PathFilter {
    extractor: PathExtractor,
    prefix: Option<String>,
}

impl PathFilter {
    pub fn new(extractor: PathExtractor, prefix: Option<String>) -> Self {
        Self {
            extractor,
            prefix: prefix.filter(|p| !p.is_empty()),
        }
    }

    /// Apply the filter to every batch.
    ///
    /// Without a prefix all rows are kept. With one, the match is a
    /// case-sensitive `starts_with` on the extracted path, and rows without
    /// a path are dropped.
    pub fn apply(&self, batches: &[RecordBatch]) -> Result<FilteredEvents> {
        let mut filtered = FilteredEvents::default();

        for batch in batches {
            let paths = self.extractor.extract(batch)?;
            let keep: Vec<bool> = paths.iter().map(|path| self.keeps(path.as_deref())).collect();

            let mask = BooleanArray::from(keep.clone());
            let kept = filter_record_batch(batch, &mask).context("Failed to filter result batch")?;
            if kept.num_rows() > 0 {
                filtered.batches.push(kept);
            }

            filtered.paths.extend(
                paths
                    .into_iter()
                    .zip(keep)
                    .filter_map(|(path, keep)| if keep { path } else { None }),
            );
        }

        tracing::info!(
            prefix = self.prefix.as_deref().unwrap_or(""),
            rows = filtered.num_rows(),
            paths = filtered.paths.len(),
            "Filtered warehouse events"
        );
        Ok(filtered)
    }

    fn keeps(&self, path: Option<&str>) -> bool {
        match (&self.prefix, path) {
            (None, _) => true,
            (Some(prefix), Some(path)) => path.starts_with(prefix.as_str()),
            (Some(_), None) => false,
        }
    }
}

/// A single-column batch of paths, handy for building result sets.
#[cfg(test)]
pub(crate) fn path_batch(column: &str, paths: &[Option<&str>]) -> Result<RecordBatch> {
    let array = std::sync::Arc::new(StringArray::from(paths.to_vec()));
    RecordBatch::try_from_iter([(column, array as std::sync::Arc<dyn Array>)])
        .context("Failed to build path batch")
}
