//! Recursive prefix deletion with dry-run support.
//!
//! The purger lists every object under a [`StoragePrefix`] and either logs
//! it as a would-be deletion (dry-run) or deletes it individually (live).
//!
//! ## Failure isolation
//!
//! - A failed delete is recorded and the remaining objects are still processed.
//! - A failed listing is recorded on the prefix's result; nothing under that
//!   prefix is deleted and the caller moves on to the next prefix.
//! - Prefixes shallower than the configured minimum depth are refused before
//!   any listing happens.

use crate::prefix::{PrefixError, StoragePrefix};
use futures::StreamExt;
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;
use std::fmt;
use std::sync::Arc;

/// Minimum prefix depth used unless configured otherwise.
pub const DEFAULT_MIN_PREFIX_DEPTH: usize = 2;

/// Whether deletions are performed or only previewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionMode {
    DryRun,
    Live,
}

impl DeletionMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run { Self::DryRun } else { Self::Live }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun)
    }
}

impl fmt::Display for DeletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun => write!(f, "dry-run"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// Outcome of purging one prefix.
#[derive(Debug, Clone)]
pub struct DeletionResult {
    /// Deletion target, rendered as `scheme://bucket/prefix`
    pub prefix: String,
    /// Objects listed under the prefix.
    pub objects_found: usize,
    /// Objects actually deleted (always zero in dry-run mode).
    pub objects_deleted: usize,
    /// Objects whose deletion failed.
    pub errors: usize,
    pub mode: DeletionMode,
    /// Failed keys with their error messages.
    pub failed_deletions: Vec<(String, String)>,
    /// Set when the prefix could not be listed.
    pub listing_error: Option<String>,
}

impl DeletionResult {
    fn empty(prefix: &StoragePrefix, mode: DeletionMode) -> Self {
        Self {
            prefix: prefix.to_string(),
            objects_found: 0,
            objects_deleted: 0,
            errors: 0,
            mode,
            failed_deletions: Vec::new(),
            listing_error: None,
        }
    }

    /// Objects handled successfully: previewed in dry-run, deleted in live mode.
    pub fn objects_processed(&self) -> usize {
        match self.mode {
            DeletionMode::DryRun => self.objects_found,
            DeletionMode::Live => self.objects_deleted,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors == 0 && self.listing_error.is_none()
    }
}

/// Totals across every prefix of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub prefixes: usize,
    pub objects_found: usize,
    pub objects_processed: usize,
    pub objects_deleted: usize,
    /// Per-object deletion failures.
    pub object_errors: usize,
    /// Prefixes that could not be listed.
    pub listing_failures: usize,
    /// Items skipped before reaching storage (lookup failures, rejected prefixes).
    pub item_failures: usize,
}

impl RunSummary {
    pub fn record(&mut self, result: &DeletionResult) {
        self.prefixes += 1;
        self.objects_found += result.objects_found;
        self.objects_processed += result.objects_processed();
        self.objects_deleted += result.objects_deleted;
        self.object_errors += result.errors;
        if result.listing_error.is_some() {
            self.listing_failures += 1;
        }
    }

    pub fn record_item_failure(&mut self) {
        self.item_failures += 1;
    }

    pub fn total_errors(&self) -> usize {
        self.object_errors + self.listing_failures + self.item_failures
    }

    pub fn log(&self, mode: DeletionMode) {
        tracing::info!(
            mode = %mode,
            prefixes = self.prefixes,
            objects_found = self.objects_found,
            objects_processed = self.objects_processed,
            objects_deleted = self.objects_deleted,
            errors = self.total_errors(),
            "Sweep complete"
        );
    }
}

/// Deletes (or previews deleting) everything under a prefix.
pub struct StoragePurger {
    object_store: Arc<dyn ObjectStore>,
    mode: DeletionMode,
    min_prefix_depth: usize,
}

impl StoragePurger {
    pub fn new(object_store: Arc<dyn ObjectStore>, mode: DeletionMode) -> Self {
        Self {
            object_store,
            mode,
            min_prefix_depth: DEFAULT_MIN_PREFIX_DEPTH,
        }
    }

    /// Override the minimum number of key segments a target must have.
    pub fn with_min_prefix_depth(mut self, min_prefix_depth: usize) -> Self {
        self.min_prefix_depth = min_prefix_depth;
        self
    }

    pub fn mode(&self) -> DeletionMode {
        self.mode
    }

    /// Purge every object under `target`.
    ///
    /// # Errors
    ///
    /// Returns [`PrefixError::Degenerate`] when `target` is too shallow to be
    /// a safe deletion target, and [`PrefixError::InvalidKey`] when its key is
    /// not a valid object path. Listing and per-object failures never fail the
    /// call; they are reported in the returned [`DeletionResult`].
    pub async fn purge(&self, target: &StoragePrefix) -> Result<DeletionResult, PrefixError> {
        target.ensure_depth(self.min_prefix_depth)?;
        let key_prefix = target.object_path()?;

        let mut result = DeletionResult::empty(target, self.mode);

        tracing::info!(
            prefix = %target,
            mode = %self.mode,
            "Purging prefix"
        );

        let objects = match self.list_objects(&key_prefix).await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::error!(
                    prefix = %target,
                    error = %e,
                    "Failed to list objects under prefix"
                );
                result.listing_error = Some(e.to_string());
                return Ok(result);
            }
        };
        result.objects_found = objects.len();

        for location in &objects {
            match self.mode {
                DeletionMode::DryRun => {
                    tracing::info!(
                        path = %location,
                        prefix = %target,
                        "[DRY-RUN] Would delete object"
                    );
                }
                DeletionMode::Live => match self.object_store.delete(location).await {
                    Ok(()) => {
                        tracing::debug!(path = %location, "Deleted object");
                        result.objects_deleted += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            path = %location,
                            error = %e,
                            "Failed to delete object"
                        );
                        result.errors += 1;
                        result
                            .failed_deletions
                            .push((location.to_string(), e.to_string()));
                    }
                },
            }
        }

        tracing::info!(
            prefix = %target,
            found = result.objects_found,
            deleted = result.objects_deleted,
            failed = result.errors,
            mode = %self.mode,
            "Prefix purge complete"
        );

        Ok(result)
    }

    /// List every object key under `path`, following pagination to the end.
    async fn list_objects(&self, path: &ObjectPath) -> object_store::Result<Vec<ObjectPath>> {
        let mut locations = Vec::new();
        let mut list_stream = self.object_store.list(Some(path));

        while let Some(meta) = list_stream.next().await {
            locations.push(meta?.location);
        }

        Ok(locations)
    }
}
