use clap::Parser;
use std::path::PathBuf;

/// CLI arguments shared by every lakesweep binary
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(short, long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

impl CommonArgs {
    /// Default log filter derived from the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging based on CLI arguments.
    ///
    /// `RUST_LOG` takes precedence over the verbosity flags when set.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(args.log_level()));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    /// Print an error and its cause chain to stderr.
    pub fn report_error(error: &anyhow::Error) {
        eprintln!("Error: {error}");
        for cause in error.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }

    /// Waits for a shutdown signal (SIGINT or SIGTERM)
    pub async fn wait_for_shutdown_signal() -> Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint =
                signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
            let mut sigterm =
                signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

            tokio::select! {
                _ = sigint.recv() => log::info!("Received SIGINT"),
                _ = sigterm.recv() => log::info!("Received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            log::info!("Received Ctrl+C");
        }

        Ok(())
    }
}
