use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use common::cli::CommonArgs;
use common::cli::utils::{init_logging, report_error, wait_for_shutdown_signal};
use common::storage::create_object_store;
use warehouse_sweep::config::DEFAULT_CONFIG_FILE;
use warehouse_sweep::{
    ConfigOverrides, FlightSqlSession, PrefixOutcome, WarehouseSweepConfig,
    WarehouseSweepReport, WarehouseSweeper,
};

/// Purge the storage of tables dropped according to the warehouse's event history
#[derive(Parser, Debug)]
#[command(name = "warehouse-sweep", author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Bucket holding the table data
    #[arg(short, long)]
    bucket: String,

    /// Only sweep paths starting with this prefix (case-sensitive)
    #[arg(short, long)]
    filter_prefix: Option<String>,

    /// Only list what would be deleted (default)
    #[arg(long)]
    dry_run: bool,

    /// Delete for real (overrides --dry-run)
    #[arg(long)]
    delete: bool,

    /// Where to write the results CSV
    #[arg(long)]
    output: Option<PathBuf>,
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
            bucket: Some(self.bucket.clone()),
            filter_prefix: self.filter_prefix.clone(),
            dry_run,
            output_csv: self.output.clone(),
        }
    }

    fn config_path(&self) -> PathBuf {
        self.common
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    async fn run(&self) -> Result<()> {
        let config = WarehouseSweepConfig::load(&self.config_path(), &self.overrides())?;

        let object_store =
            create_object_store(&format!("s3://{}", config.bucket), &config.storage)
                .context("Failed to create object store")?;
        let sweeper = WarehouseSweeper::new(&config, object_store)?;

        let mut session = FlightSqlSession::connect(&config.connection)
            .await
            .context("Failed to connect to warehouse")?;

        let report = sweeper
            .run_to_completion(&mut session, wait_for_shutdown_signal())
            .await?;
        print_report(&config, &report);
        Ok(())
    }
}

fn print_report(config: &WarehouseSweepConfig, report: &WarehouseSweepReport) {
    println!(
        "Found {} row(s), {} after filtering",
        report.rows_fetched, report.rows_kept
    );
    if let Some(path) = &report.output_csv {
        println!("Results written to {}", path.display());
    }

    for outcome in &report.outcomes {
        match outcome {
            PrefixOutcome::Purged { path, result } => {
                println!(" -  {path}");
                println!("     - S3: {}", result.prefix);
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
            PrefixOutcome::Rejected {
                path,
                prefix,
                reason,
            } => {
                println!(" -  {path}");
                println!("     rejected {prefix}: {reason}");
            }
        }
    }

    let summary = &report.summary;
    println!();
    println!("Summary ({}, bucket {}):", report.mode, config.bucket);
    println!("  Prefixes:          {}", summary.prefixes);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_only() {
        let cli = Cli::parse_from(["warehouse-sweep", "-b", "lake"]);
        let overrides = cli.overrides();
        assert_eq!(overrides.bucket.as_deref(), Some("lake"));
        // Left to the config file, which defaults to dry-run
        assert_eq!(overrides.dry_run, None);
        assert_eq!(overrides.filter_prefix, None);
        assert_eq!(cli.config_path(), PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_delete_overrides_dry_run() {
        let cli = Cli::parse_from(["warehouse-sweep", "-b", "lake", "--dry-run", "--delete"]);
        assert_eq!(cli.overrides().dry_run, Some(false));

        let cli = Cli::parse_from(["warehouse-sweep", "-b", "lake", "--dry-run"]);
        assert_eq!(cli.overrides().dry_run, Some(true));
    }

    #[test]
    fn test_filter_and_output() {
        let cli = Cli::parse_from([
            "warehouse-sweep",
            "--bucket",
            "lake",
            "-f",
            "source.sales",
            "--output",
            "audit.csv",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.filter_prefix.as_deref(), Some("source.sales"));
        assert_eq!(overrides.output_csv, Some(PathBuf::from("audit.csv")));
    }

    #[test]
    fn test_bucket_is_required() {
        assert!(Cli::try_parse_from(["warehouse-sweep", "--delete"]).is_err());
    }
}
