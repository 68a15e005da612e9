//! The catalog sweep pipeline.
//!
//! history -> drop events -> pre-drop metadata -> data root -> purge
//!
//! A failed history fetch aborts the run. Everything after that is per
//! table: a failed lookup, an underivable path or a refused prefix is
//! reported and the sweep moves on to the next drop.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::prefix::StoragePrefix;
use common::{DeletionMode, DeletionResult, RunSummary, StoragePurger};
use object_store::ObjectStore;

use crate::client::NessieClient;
use crate::config::CatalogSweepConfig;
use crate::drops::{DropEvent, parse_drops};
use crate::history::filter_expression;
use crate::resolver::MetadataResolver;

/// What happened to one dropped table.
#[derive(Debug, Clone)]
pub enum TableOutcome {
    Purged {
        table: String,
        data_root: String,
        result: DeletionResult,
    },
    Skipped {
        table: String,
        reason: String,
    },
}

impl TableOutcome {
    pub fn table(&self) -> &str {
        match self {
            Self::Purged { table, .. } | Self::Skipped { table, .. } => table,
        }
    }
}

/// Result of a full sweep.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub since: DateTime<Utc>,
    pub mode: DeletionMode,
    pub drops: Vec<DropEvent>,
    pub outcomes: Vec<TableOutcome>,
    pub summary: RunSummary,
}

pub struct CatalogSweeper {
    client: NessieClient,
    purger: StoragePurger,
    storage_root: StoragePrefix,
    config: CatalogSweepConfig,
}

impl CatalogSweeper {
    /// Build a sweeper purging through `object_store`, which must serve the
    /// configured storage root's bucket.
    pub fn new(config: CatalogSweepConfig, object_store: Arc<dyn ObjectStore>) -> Result<Self> {
        let client = NessieClient::new(
            &config.catalog_endpoint,
            &config.token,
            config.request_timeout,
        )
        .context("Failed to build catalog client")?;

        let purger = StoragePurger::new(object_store, config.mode())
            .with_min_prefix_depth(config.min_prefix_depth);

        Ok(Self {
            client,
            purger,
            storage_root: config.storage_root_prefix()?,
            config,
        })
    }

    /// Sweep tables dropped within the lookback window ending at `now`.
    ///
    /// # Errors
    ///
    /// Only a failed history fetch is fatal.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let since = self.config.since(now)?;
        let filter = filter_expression(since);

        tracing::info!(
            branch = %self.config.branch,
            days = self.config.days,
            since = %since,
            mode = %self.purger.mode(),
            "Scanning catalog history for dropped tables"
        );

        let entries = self
            .client
            .commit_log(&self.config.branch, &filter)
            .await
            .with_context(|| format!("Failed to fetch commit history of '{}'", self.config.branch))?;

        let drops = parse_drops(&entries);
        tracing::info!(
            commits = entries.len(),
            drops = drops.len(),
            "Parsed commit history"
        );

        let resolver = MetadataResolver::new(&self.client);
        let mut summary = RunSummary::default();
        let mut outcomes = Vec::with_capacity(drops.len());

        for event in &drops {
            let outcome = self.sweep_table(&resolver, event).await;
            match &outcome {
                TableOutcome::Purged { result, .. } => summary.record(result),
                TableOutcome::Skipped { table, reason } => {
                    tracing::warn!(table = %table, reason = %reason, "Skipping dropped table");
                    summary.record_item_failure();
                }
            }
            outcomes.push(outcome);
        }

        summary.log(self.purger.mode());

        Ok(SweepReport {
            since,
            mode: self.purger.mode(),
            drops,
            outcomes,
            summary,
        })
    }

    async fn sweep_table(&self, resolver: &MetadataResolver<'_>, event: &DropEvent) -> TableOutcome {
        let table = event.table_identifier.clone();
        let skipped = |reason: String| TableOutcome::Skipped {
            table: table.clone(),
            reason,
        };

        let snapshot = match resolver.resolve(event).await {
            Ok(snapshot) => snapshot,
            Err(e) => return skipped(format!("Failed to fetch metadata: {e}")),
        };

        let data_root = match snapshot.data_root() {
            Ok(root) => root.to_string(),
            Err(e) => return skipped(e.to_string()),
        };

        let target = match self.storage_root.resolve_within(&data_root) {
            Ok(target) => target,
            Err(e) => return skipped(e.to_string()),
        };

        tracing::info!(
            table = %table,
            data_root = %data_root,
            parent_commit = %event.parent_commit_id,
            "Purging dropped table data"
        );

        match self.purger.purge(&target).await {
            Ok(result) => TableOutcome::Purged {
                table: event.table_identifier.clone(),
                data_root,
                result,
            },
            Err(e) => skipped(e.to_string()),
        }
    }
}
