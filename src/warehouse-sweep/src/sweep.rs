//! The warehouse sweep pipeline.
//!
//! query -> path filter -> audit CSV -> prefix derivation -> purge
//!
//! A failed query aborts the run. A prefix the purger refuses is counted as
//! an error and the sweep continues with the next path.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use common::prefix::{PathMapping, StoragePrefix};
use common::{DeletionMode, DeletionResult, RunSummary, StoragePurger};
use object_store::ObjectStore;

use crate::config::WarehouseSweepConfig;
use crate::events::{PathExtractor, PathFilter};
use crate::report::write_csv;
use crate::warehouse::EventSource;

/// What happened to one extracted path.
#[derive(Debug, Clone)]
pub enum PrefixOutcome {
    Purged {
        path: String,
        result: DeletionResult,
    },
    Rejected {
        path: String,
        prefix: StoragePrefix,
        reason: String,
    },
}

impl PrefixOutcome {
    pub fn path(&self) -> &str {
        match self {
            Self::Purged { path, .. } | Self::Rejected { path, .. } => path,
        }
    }
}

/// Result of a full sweep.
#[derive(Debug, Clone)]
pub struct WarehouseSweepReport {
    pub mode: DeletionMode,
    /// Rows returned by the query
    pub rows_fetched: usize,
    /// Rows kept by the path filter
    pub rows_kept: usize,
    pub output_csv: Option<PathBuf>,
    pub outcomes: Vec<PrefixOutcome>,
    pub summary: RunSummary,
}

pub struct WarehouseSweeper {
    query: String,
    filter: PathFilter,
    mapping: PathMapping,
    bucket: String,
    purger: StoragePurger,
    output_csv: Option<PathBuf>,
}

impl WarehouseSweeper {
    /// Build a sweeper purging through `object_store`, which must serve the
    /// configured bucket.
    pub fn new(config: &WarehouseSweepConfig, object_store: Arc<dyn ObjectStore>) -> Result<Self> {
        let extractor = PathExtractor::from_config(&config.paths)?;
        let purger = StoragePurger::new(object_store, config.mode())
            .with_min_prefix_depth(config.paths.min_prefix_depth);

        Ok(Self {
            query: config.connection.query.clone(),
            filter: PathFilter::new(extractor, config.filter_prefix.clone()),
            mapping: config.paths.mapping(),
            bucket: config.bucket.clone(),
            purger,
            output_csv: Some(config.output_csv.clone()),
        })
    }

    /// Skip writing the audit CSV.
    pub fn without_output(mut self) -> Self {
        self.output_csv = None;
        self
    }

    /// Run the sweep until it finishes or `shutdown` resolves, then close
    /// `source`.
    ///
    /// The session is closed on every path. A close failure is logged and
    /// does not mask the sweep's own result.
    ///
    /// # Errors
    ///
    /// Everything [`run`](Self::run) reports, plus an interruption error when
    /// `shutdown` resolves first. Deletions already issued stay applied.
    pub async fn run_to_completion<S, F>(
        &self,
        source: &mut S,
        shutdown: F,
    ) -> Result<WarehouseSweepReport>
    where
        S: EventSource + ?Sized,
        F: Future<Output = Result<()>>,
    {
        let outcome = tokio::select! {
            biased;
            signal = shutdown => match signal {
                Ok(()) => Err(anyhow::anyhow!("Interrupted, sweep stopped")),
                Err(e) => Err(e),
            },
            report = self.run(&mut *source) => report,
        };

        if let Err(e) = source.close().await {
            tracing::warn!(error = %e, "Failed to close warehouse session");
        }

        outcome
    }

    /// Run the query against `source` and purge every derived prefix.
    ///
    /// The caller owns `source` and closes it afterwards; see
    /// [`run_to_completion`](Self::run_to_completion).
    ///
    /// # Errors
    ///
    /// Query, filter and CSV failures are fatal. Purge problems are reported
    /// per prefix.
    pub async fn run<S>(&self, source: &mut S) -> Result<WarehouseSweepReport>
    where
        S: EventSource + ?Sized,
    {
        tracing::info!(
            bucket = %self.bucket,
            mode = %self.purger.mode(),
            "Querying warehouse for dropped tables"
        );

        let batches = source
            .fetch(&self.query)
            .await
            .context("Failed to execute warehouse query")?;
        let rows_fetched = batches.iter().map(|b| b.num_rows()).sum();

        let filtered = self.filter.apply(&batches)?;

        if let Some(path) = &self.output_csv {
            write_csv(path, &filtered.batches)?;
        }

        let mut summary = RunSummary::default();
        let mut outcomes = Vec::with_capacity(filtered.paths.len());

        for path in &filtered.paths {
            let prefix = self.mapping.derive(path, &self.bucket);
            let outcome = match self.purger.purge(&prefix).await {
                Ok(result) => {
                    summary.record(&result);
                    PrefixOutcome::Purged {
                        path: path.clone(),
                        result,
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path, prefix = %prefix, error = %e, "Rejected prefix");
                    summary.record_item_failure();
                    PrefixOutcome::Rejected {
                        path: path.clone(),
                        prefix,
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        summary.log(self.purger.mode());

        Ok(WarehouseSweepReport {
            mode: self.purger.mode(),
            rows_fetched,
            rows_kept: filtered.num_rows(),
            output_csv: self.output_csv.clone(),
            outcomes,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, PathsConfig};
    use crate::events::path_batch;
    use crate::warehouse::WarehouseError;
    use arrow::record_batch::RecordBatch;
    use async_trait::async_trait;
    use common::config::StorageConfig;
    use futures::StreamExt;
    use object_store::PutPayload;
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectPath;
    use std::time::Duration;

    struct FakeWarehouse {
        result: Option<Vec<RecordBatch>>,
        queries: Vec<String>,
    }

    impl FakeWarehouse {
        fn returning(batches: Vec<RecordBatch>) -> Self {
            Self {
                result: Some(batches),
                queries: Vec::new(),
            }
        }

        fn failing() -> Self {
            Self {
                result: None,
                queries: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl EventSource for FakeWarehouse {
        async fn fetch(&mut self, query: &str) -> Result<Vec<RecordBatch>, WarehouseError> {
            self.queries.push(query.to_string());
            self.result
                .clone()
                .ok_or_else(|| WarehouseError::Query("table not found".into()))
        }

        async fn close(&mut self) -> Result<(), WarehouseError> {
            Ok(())
        }
    }

    fn config(dry_run: bool, filter_prefix: Option<&str>) -> WarehouseSweepConfig {
        WarehouseSweepConfig {
            connection: ConnectionConfig {
                host: "localhost".to_string(),
                port: 32010,
                token: "secret".to_string(),
                tls: false,
                project_id: None,
                query: "SELECT path FROM drops".to_string(),
                timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(5),
            },
            paths: PathsConfig::default(),
            storage: StorageConfig::default(),
            bucket: "lake".to_string(),
            filter_prefix: filter_prefix.map(str::to_string),
            dry_run,
            output_csv: PathBuf::from("unused.csv"),
        }
    }

    async fn seeded_store() -> Arc<InMemory> {
        let store = Arc::new(InMemory::new());
        for key in [
            "sales/orders/data/1.parquet",
            "sales/orders/data/2.parquet",
            "sales/orders_archive/data/1.parquet",
            "finance/ledger/data/1.parquet",
        ] {
            store
                .put(&ObjectPath::from(key), PutPayload::from_static(b"x"))
                .await
                .unwrap();
        }
        store
    }

    async fn keys(store: &InMemory) -> Vec<String> {
        let mut keys: Vec<String> = store
            .list(None)
            .map(|meta| meta.unwrap().location.to_string())
            .collect()
            .await;
        keys.sort();
        keys
    }

    fn drops() -> Vec<RecordBatch> {
        vec![
            path_batch(
                "path",
                &[Some("src.sales.orders"), Some("src"), None, Some("src.finance.ledger")],
            )
            .unwrap(),
        ]
    }

    #[tokio::test]
    async fn test_live_sweep() {
        let store = seeded_store().await;
        let sweeper = WarehouseSweeper::new(&config(false, None), store.clone())
            .unwrap()
            .without_output();
        let mut source = FakeWarehouse::returning(drops());

        let report = sweeper.run(&mut source).await.unwrap();

        assert_eq!(source.queries, vec!["SELECT path FROM drops"]);
        assert_eq!(report.rows_fetched, 4);
        assert_eq!(report.rows_kept, 4);

        let paths: Vec<_> = report.outcomes.iter().map(PrefixOutcome::path).collect();
        assert_eq!(paths, vec!["src.sales.orders", "src", "src.finance.ledger"]);
        assert!(matches!(
            &report.outcomes[1],
            PrefixOutcome::Rejected { prefix, .. } if prefix.to_string() == "s3://lake/src"
        ));

        assert_eq!(report.summary.prefixes, 2);
        assert_eq!(report.summary.objects_deleted, 3);
        assert_eq!(report.summary.item_failures, 1);
        assert_eq!(report.summary.total_errors(), 1);

        // Segment-wise prefixes never reach the sibling table
        assert_eq!(keys(&store).await, vec!["sales/orders_archive/data/1.parquet"]);
    }

    #[tokio::test]
    async fn test_dry_run_with_filter() {
        let store = seeded_store().await;
        let sweeper = WarehouseSweeper::new(&config(true, Some("src.sales")), store.clone())
            .unwrap()
            .without_output();
        let mut source = FakeWarehouse::returning(drops());

        let report = sweeper.run(&mut source).await.unwrap();

        assert_eq!(report.rows_kept, 1);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.summary.objects_found, 2);
        assert_eq!(report.summary.objects_processed, 2);
        assert_eq!(report.summary.objects_deleted, 0);
        assert_eq!(keys(&store).await.len(), 4);
    }

    #[tokio::test]
    async fn test_writes_audit_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(true, Some("src.finance"));
        config.output_csv = dir.path().join("results.csv");

        let store = seeded_store().await;
        let sweeper = WarehouseSweeper::new(&config, store).unwrap();
        let report = sweeper
            .run(&mut FakeWarehouse::returning(drops()))
            .await
            .unwrap();

        assert_eq!(report.output_csv.as_deref(), Some(config.output_csv.as_path()));
        let csv = std::fs::read_to_string(&config.output_csv).unwrap();
        assert_eq!(csv, "path\nsrc.finance.ledger\n");
    }

    #[tokio::test]
    async fn test_query_failure_is_fatal() {
        let store = seeded_store().await;
        let sweeper = WarehouseSweeper::new(&config(false, None), store.clone())
            .unwrap()
            .without_output();

        let err = sweeper.run(&mut FakeWarehouse::failing()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to execute warehouse query"));
        assert!(format!("{err:#}").contains("table not found"));
        assert_eq!(keys(&store).await.len(), 4);
    }
}
