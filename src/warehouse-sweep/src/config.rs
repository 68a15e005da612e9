//! Warehouse sweep configuration.
//!
//! Loaded from a TOML file (default `warehouse-sweep.toml`), then overridden
//! by `WAREHOUSE_SWEEP__SECTION__KEY` environment variables, then by
//! command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use common::DeletionMode;
use common::config::{StorageConfig, require_file};
use common::prefix::PathMapping;
use common::purge::DEFAULT_MIN_PREFIX_DEPTH;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "warehouse-sweep.toml";

/// Default audit CSV written after every successful query.
pub const DEFAULT_OUTPUT_CSV: &str = "warehouse_sweep_results.csv";

/// Environment variable prefix, e.g. `WAREHOUSE_SWEEP__CONNECTION__TOKEN`.
pub const ENV_PREFIX: &str = "WAREHOUSE_SWEEP__";

const GUIDANCE: &str = r#"Create a TOML configuration file such as:

[connection]
host = "data.dremio.cloud"
port = 443
tls = true
token = "<personal access token>"
project_id = "<project id>"
query = "SELECT path FROM sys.project.history.events WHERE event_type = 'DROP'"

[paths]
column = "path"

or point to an existing one with --config <path>."#;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WarehouseSweepConfig {
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Bucket the derived prefixes are purged from
    #[serde(default)]
    pub bucket: String,

    /// Only rows whose extracted path starts with this are kept
    #[serde(default)]
    pub filter_prefix: Option<String>,

    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    #[serde(default = "default_output_csv")]
    pub output_csv: PathBuf,
}

/// Warehouse endpoint and the query to run there.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub token: String,

    #[serde(default = "default_tls")]
    pub tls: bool,

    /// Sent as the `project_id` header when set
    #[serde(default)]
    pub project_id: Option<String>,

    /// Operator-supplied SQL, executed verbatim
    pub query: String,

    /// Per-request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// `https://host:port` or `http://host:port` depending on `tls`.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// How logical paths are read from the result set and mapped to prefixes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Result column holding the logical path
    pub column: String,
    /// Optional regex applied to the column text; capture group 1 is the path
    pub pattern: Option<String>,
    pub delimiter: char,
    /// Leading path segments to discard (the source name)
    pub skip_segments: usize,
    pub min_prefix_depth: usize,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let mapping = PathMapping::default();
        Self {
            column: "path".to_string(),
            pattern: None,
            delimiter: mapping.delimiter,
            skip_segments: mapping.skip_segments,
            min_prefix_depth: DEFAULT_MIN_PREFIX_DEPTH,
        }
    }
}

impl PathsConfig {
    pub fn mapping(&self) -> PathMapping {
        PathMapping {
            delimiter: self.delimiter,
            skip_segments: self.skip_segments,
        }
    }

    /// Compile `pattern`, which must have at least one capture group.
    pub fn compiled_pattern(&self) -> Result<Option<Regex>> {
        let Some(pattern) = &self.pattern else {
            return Ok(None);
        };

        let regex = Regex::new(pattern)
            .with_context(|| format!("Invalid paths.pattern '{pattern}'"))?;
        if regex.captures_len() < 2 {
            anyhow::bail!("paths.pattern '{pattern}' needs a capture group for the path");
        }
        Ok(Some(regex))
    }
}

fn default_port() -> u16 {
    443
}

fn default_tls() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_dry_run() -> bool {
    true
}

fn default_output_csv() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_CSV)
}

/// Top-level values set from the command line.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_csv: Option<PathBuf>,
}

impl WarehouseSweepConfig {
    /// Layered providers: file, then environment.
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate the configuration.
    pub fn load(path: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        require_file(path, GUIDANCE)?;

        let config: Self = Self::figment(path)
            .merge(Serialized::defaults(overrides))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let connection = &self.connection;
        if connection.host.trim().is_empty() {
            anyhow::bail!("connection.host cannot be empty");
        }
        if connection.port == 0 {
            anyhow::bail!("connection.port must be positive");
        }
        if connection.token.trim().is_empty() {
            anyhow::bail!("connection.token cannot be empty");
        }
        if connection.query.trim().is_empty() {
            anyhow::bail!("connection.query cannot be empty");
        }

        if self.bucket.trim().is_empty() {
            anyhow::bail!("bucket is required (--bucket <name>)");
        }
        if self.bucket.contains('/') {
            anyhow::bail!("bucket must be a bare bucket name, got '{}'", self.bucket);
        }

        if self.paths.column.is_empty() {
            anyhow::bail!("paths.column cannot be empty");
        }
        if self.paths.delimiter == '/' {
            anyhow::bail!("paths.delimiter cannot be '/'");
        }
        if self.paths.min_prefix_depth == 0 {
            anyhow::bail!("paths.min_prefix_depth must be positive, got 0");
        }
        self.paths.compiled_pattern()?;

        Ok(())
    }

    pub fn mode(&self) -> DeletionMode {
        DeletionMode::from_dry_run(self.dry_run)
    }
}
