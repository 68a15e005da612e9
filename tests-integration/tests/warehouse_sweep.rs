//! Warehouse sweep integration tests
//!
//! Runs the full sweep against a scripted warehouse and in-memory object
//! storage, with configuration loaded from a TOML file.

use anyhow::Result;
use arrow::array::{Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use common::DeletionMode;
use std::future::pending;
use std::path::Path;
use std::sync::Arc;
use tests_integration::fixtures::{ScriptedWarehouse, StorageTestContext};
use warehouse_sweep::{ConfigOverrides, PrefixOutcome, WarehouseSweepConfig, WarehouseSweeper};

fn table_files() -> Vec<&'static str> {
    vec![
        "sales/orders/data/00000.parquet",
        "sales/orders/metadata/v1.metadata.json",
        "sales/orders_v2/data/00000.parquet",
        "finance/ledger/data/00000.parquet",
        "finance/ledger/data/00001.parquet",
    ]
}

/// A history result set with the path buried in a free-text column.
fn history() -> Vec<RecordBatch> {
    let details = StringArray::from(vec![
        Some(r#"{"path":"lakehouse.sales.orders","user":"alice"}"#),
        Some(r#"{"path":"lakehouse","user":"bob"}"#),
        Some("scheduled maintenance"),
        Some(r#"{"path":"lakehouse.finance.ledger","user":"carol"}"#),
        None,
    ]);
    let event_ids = Int64Array::from(vec![1, 2, 3, 4, 5]);

    vec![
        RecordBatch::try_from_iter([
            ("event_id", Arc::new(event_ids) as Arc<dyn Array>),
            ("details", Arc::new(details) as Arc<dyn Array>),
        ])
        .unwrap(),
    ]
}

fn load_config(dir: &Path, overrides: ConfigOverrides) -> Result<WarehouseSweepConfig> {
    let path = dir.join("warehouse-sweep.toml");
    std::fs::write(
        &path,
        format!(
            r#"
            output_csv = "{}"

            [connection]
            host = "warehouse.example.com"
            token = "secret"
            query = "SELECT event_id, details FROM sys.history WHERE event = 'DROP'"

            [paths]
            column = "details"
            pattern = '"path":"([^"]+)"'
            "#,
            dir.join("results.csv").display()
        ),
    )?;

    WarehouseSweepConfig::load(
        &path,
        &ConfigOverrides {
            bucket: Some("lake".to_string()),
            ..overrides
        },
    )
}

#[tokio::test]
async fn test_live_sweep_with_pattern_extraction() -> Result<()> {
    tests_integration::init_test_logging();

    let dir = tempfile::tempdir()?;
    let config = load_config(
        dir.path(),
        ConfigOverrides {
            dry_run: Some(false),
            ..Default::default()
        },
    )?;
    assert_eq!(config.mode(), DeletionMode::Live);

    let storage = StorageTestContext::seeded(&table_files()).await?;
    let mut warehouse = ScriptedWarehouse::returning(history());
    let sweeper = WarehouseSweeper::new(&config, storage.object_store.clone())?;

    let report = sweeper
        .run_to_completion(&mut warehouse, pending::<Result<()>>())
        .await?;

    assert_eq!(warehouse.queries, vec![config.connection.query.clone()]);
    assert_eq!(warehouse.close_calls, 1);
    assert_eq!(report.rows_fetched, 5);
    assert_eq!(report.rows_kept, 5);

    let paths: Vec<_> = report.outcomes.iter().map(PrefixOutcome::path).collect();
    assert_eq!(
        paths,
        vec![
            "lakehouse.sales.orders",
            "lakehouse",
            "lakehouse.finance.ledger"
        ]
    );

    // A source-only path maps to a single segment and is refused
    assert!(matches!(&report.outcomes[1], PrefixOutcome::Rejected { .. }));
    assert_eq!(report.summary.prefixes, 2);
    assert_eq!(report.summary.objects_deleted, 4);
    assert_eq!(report.summary.total_errors(), 1);

    assert_eq!(
        storage.list_all_objects().await?,
        vec!["sales/orders_v2/data/00000.parquet"]
    );

    let csv = std::fs::read_to_string(dir.path().join("results.csv"))?;
    assert!(csv.starts_with("event_id,details\n"));
    assert_eq!(csv.lines().count(), 6);
    Ok(())
}

#[tokio::test]
async fn test_filtered_dry_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = load_config(
        dir.path(),
        ConfigOverrides {
            filter_prefix: Some("lakehouse.finance".to_string()),
            ..Default::default()
        },
    )?;
    assert_eq!(config.mode(), DeletionMode::DryRun);

    let storage = StorageTestContext::seeded(&table_files()).await?;
    let mut warehouse = ScriptedWarehouse::returning(history());
    let report = WarehouseSweeper::new(&config, storage.object_store.clone())?
        .run(&mut warehouse)
        .await?;

    assert_eq!(report.rows_kept, 1);
    match &report.outcomes[..] {
        [PrefixOutcome::Purged { path, result }] => {
            assert_eq!(path, "lakehouse.finance.ledger");
            assert_eq!(result.prefix, "s3://lake/finance/ledger");
            assert_eq!(result.objects_found, 2);
            assert_eq!(result.objects_deleted, 0);
        }
        other => panic!("unexpected outcomes: {other:?}"),
    }
    assert_eq!(storage.list_all_objects().await?.len(), 5);

    let csv = std::fs::read_to_string(dir.path().join("results.csv"))?;
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("carol"));
    Ok(())
}

#[tokio::test]
async fn test_query_failure_leaves_storage_untouched() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = load_config(
        dir.path(),
        ConfigOverrides {
            dry_run: Some(false),
            ..Default::default()
        },
    )?;

    let storage = StorageTestContext::seeded(&table_files()).await?;
    let mut warehouse = ScriptedWarehouse::failing("Table 'sys.history' not found");
    let err = WarehouseSweeper::new(&config, storage.object_store.clone())?
        .run_to_completion(&mut warehouse, pending::<Result<()>>())
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("sys.history"));
    assert_eq!(warehouse.close_calls, 1);
    assert!(!dir.path().join("results.csv").exists());
    assert_eq!(storage.list_all_objects().await?.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_interrupt_closes_session_and_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = load_config(
        dir.path(),
        ConfigOverrides {
            dry_run: Some(false),
            ..Default::default()
        },
    )?;

    let storage = StorageTestContext::seeded(&table_files()).await?;
    let mut warehouse = ScriptedWarehouse::returning(history());
    let err = WarehouseSweeper::new(&config, storage.object_store.clone())?
        .run_to_completion(&mut warehouse, async { Ok(()) })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Interrupted"));
    assert_eq!(warehouse.close_calls, 1);
    assert!(warehouse.queries.is_empty());
    assert_eq!(storage.list_all_objects().await?.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_failed_signal_handler_still_closes_session() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = load_config(dir.path(), ConfigOverrides::default())?;

    let storage = StorageTestContext::seeded(&table_files()).await?;
    let mut warehouse = ScriptedWarehouse::returning(history());
    let err = WarehouseSweeper::new(&config, storage.object_store.clone())?
        .run_to_completion(&mut warehouse, async {
            Err(anyhow::anyhow!("Failed to install SIGTERM handler"))
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("SIGTERM"));
    assert_eq!(warehouse.close_calls, 1);
    Ok(())
}
