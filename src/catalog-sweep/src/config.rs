//! Catalog sweep configuration.
//!
//! Loaded from a JSON file (default `config.json`), then overridden by
//! `CATALOG_SWEEP_*` environment variables, then by command-line flags.
//! The file keeps the camelCase keys operators already use:
//!
//! ```json
//! {
//!   "catalogEndpoint": "https://nessie.example.com/api/v2",
//!   "s3RootPath": "s3://lakehouse/warehouse",
//!   "token": "<bearer token>",
//!   "days": 1,
//!   "dryrun": true
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::DeletionMode;
use common::config::{StorageConfig, require_file};
use common::prefix::StoragePrefix;
use common::purge::DEFAULT_MIN_PREFIX_DEPTH;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Environment variable prefix, e.g. `CATALOG_SWEEP_TOKEN`.
pub const ENV_PREFIX: &str = "CATALOG_SWEEP_";

/// Longest accepted lookback window, in days.
pub const MAX_DAYS: u32 = 36_500;

const GUIDANCE: &str = r#"Create a JSON configuration file such as:

{
  "catalogEndpoint": "https://nessie.example.com/api/v2",
  "s3RootPath": "s3://lakehouse/warehouse",
  "token": "<bearer token>",
  "days": 1,
  "dryrun": true
}

or point to an existing one with --config <path>."#;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSweepConfig {
    /// Catalog REST base URL, without trailing slash
    pub catalog_endpoint: String,

    /// Storage root every purged data root must live under
    #[serde(rename = "s3RootPath")]
    pub storage_root: String,

    /// Bearer token for the catalog API
    pub token: String,

    /// Lookback window in days
    #[serde(default = "default_days")]
    pub days: u32,

    /// Preview deletions instead of performing them
    #[serde(default = "default_dry_run", rename = "dryrun")]
    pub dry_run: bool,

    /// Branch whose history is scanned
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Timeout applied to every catalog request
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Minimum key depth of a purgeable data root, relative to the bucket
    #[serde(default = "default_min_prefix_depth")]
    pub min_prefix_depth: usize,

    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_days() -> u32 {
    1
}

fn default_dry_run() -> bool {
    true
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_min_prefix_depth() -> usize {
    DEFAULT_MIN_PREFIX_DEPTH
}

/// Command-line values that take precedence over file and environment.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "dryrun")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl CatalogSweepConfig {
    /// Layered providers: file, then environment.
    pub fn figment(path: &Path) -> Figment {
        Figment::new().merge(Json::file(path)).merge(
            Env::prefixed(ENV_PREFIX)
                .lowercase(false)
                .map(|key| env_key_to_field(key.as_str()).into()),
        )
    }

    /// Load, normalize and validate the configuration.
    pub fn load(path: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        require_file(path, GUIDANCE)?;

        let config: Self = Self::figment(path)
            .merge(Serialized::defaults(overrides))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Strip trailing slashes from the endpoint and storage root.
    pub fn normalized(mut self) -> Self {
        self.catalog_endpoint = self.catalog_endpoint.trim_end_matches('/').to_string();
        self.storage_root = self.storage_root.trim_end_matches('/').to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.catalog_endpoint.starts_with("http://")
            || self.catalog_endpoint.starts_with("https://"))
        {
            anyhow::bail!(
                "catalogEndpoint must be an http(s) URL, got '{}'",
                self.catalog_endpoint
            );
        }

        if self.token.trim().is_empty() {
            anyhow::bail!("token cannot be empty");
        }

        if self.days == 0 {
            anyhow::bail!("days must be positive, got {}", self.days);
        }

        if self.days > MAX_DAYS {
            anyhow::bail!(
                "days must be at most {MAX_DAYS}, got {}; use a shorter lookback window",
                self.days
            );
        }

        if self.branch.is_empty() {
            anyhow::bail!("branch cannot be empty");
        }

        if self.min_prefix_depth == 0 {
            anyhow::bail!("minPrefixDepth must be positive, got 0");
        }

        self.storage_root_prefix()?;
        Ok(())
    }

    /// The storage root as a prefix.
    pub fn storage_root_prefix(&self) -> Result<StoragePrefix> {
        StoragePrefix::parse(&self.storage_root)
            .with_context(|| format!("Invalid s3RootPath '{}'", self.storage_root))
    }

    pub fn mode(&self) -> DeletionMode {
        DeletionMode::from_dry_run(self.dry_run)
    }

    /// Start of the lookback window.
    pub fn since(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        chrono::Duration::try_days(i64::from(self.days))
            .and_then(|window| now.checked_sub_signed(window))
            .with_context(|| format!("Lookback of {} days is out of range", self.days))
    }
}

/// `S3_ROOT_PATH` -> `s3RootPath`, `CATALOG_ENDPOINT` -> `catalogEndpoint`.
fn env_key_to_field(key: &str) -> String {
    let mut field = String::with_capacity(key.len());
    for (i, part) in key.split('_').filter(|p| !p.is_empty()).enumerate() {
        let part = part.to_ascii_lowercase();
        if i == 0 {
            field.push_str(&part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                field.push(first.to_ascii_uppercase());
                field.push_str(chars.as_str());
            }
        }
    }
    field
}
