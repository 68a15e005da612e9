use std::path::PathBuf;

use anyhow::{Context, Result};
use catalog_sweep::config::DEFAULT_CONFIG_FILE;
use catalog_sweep::{
    CatalogSweepConfig, CatalogSweeper, ConfigOverrides, SweepReport, TableOutcome,
};
use chrono::Utc;
use clap::Parser;
use common::cli::CommonArgs;
use common::cli::utils::{init_logging, report_error};
use common::storage::create_object_store;

/// Purge the storage of Iceberg tables recently dropped in the catalog
#[derive(Parser, Debug)]
#[command(name = "catalog-sweep", author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Lookback window in days
    #[arg(long)]
    days: Option<u32>,

    /// Catalog branch to scan
    #[arg(long)]
    branch: Option<String>,

    /// Only list what would be deleted
    #[arg(long)]
    dry_run: bool,

    /// Delete for real (overrides --dry-run)
    #[arg(long)]
    delete: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let dry_run = if self.delete {
            Some(false)
        } else if self.dry_run {
            Some(true)
        } else {
            None
        };

        ConfigOverrides {
            days: self.days,
            dry_run,
            branch: self.branch.clone(),
        }
    }

    fn config_path(&self) -> PathBuf {
        self.common
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    async fn run(&self) -> Result<()> {
        let config = CatalogSweepConfig::load(&self.config_path(), &self.overrides())?;
        let now = Utc::now();
        let days = config.days;
        let since = config.since(now)?;

        let object_store = create_object_store(&config.storage_root, &config.storage)
            .context("Failed to create object store")?;
        let sweeper = CatalogSweeper::new(config, object_store)?;

        println!(
            "Cleaning up S3 storage for iceberg tables that were dropped in the catalog in the last {days} days (since {} UTC):",
            since.format("%Y-%m-%d %H:%M:%S")
        );

        let report = sweeper.run(now).await?;
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &SweepReport) {
    for outcome in &report.outcomes {
        match outcome {
            TableOutcome::Purged {
                table,
                data_root,
                result,
            } => {
                println!(" -  Table: {table}");
                println!("     - S3: {data_root}");
                if report.mode.is_dry_run() {
                    println!("       would delete {} object(s)", result.objects_found);
                } else {
                    println!(
                        "       deleted {} of {} object(s)",
                        result.objects_deleted, result.objects_found
                    );
                }
                if let Some(listing_error) = &result.listing_error {
                    println!("       listing failed: {listing_error}");
                }
                for (key, error) in &result.failed_deletions {
                    println!("       failed to delete {key}: {error}");
                }
            }
            TableOutcome::Skipped { table, reason } => {
                println!(" -  Table: {table}");
                println!("     skipped: {reason}");
            }
        }
    }

    let purged = report
        .outcomes
        .iter()
        .filter(|o| matches!(o, TableOutcome::Purged { .. }))
        .count();
    let summary = &report.summary;

    println!();
    println!("Summary ({}):", report.mode);
    println!("  Drops found:       {}", report.drops.len());
    println!("  Tables purged:     {purged}");
    println!("  Tables skipped:    {}", report.outcomes.len() - purged);
    println!("  Objects found:     {}", summary.objects_found);
    println!("  Objects processed: {}", summary.objects_processed);
    println!("  Objects deleted:   {}", summary.objects_deleted);
    println!("  Errors:            {}", summary.total_errors());
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.common);

    if let Err(e) = cli.run().await {
        report_error(&e);
        std::process::exit(1);
    }
}
