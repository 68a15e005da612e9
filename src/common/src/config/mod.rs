use std::path::Path;

use serde::{Deserialize, Serialize};

/// Object storage connection settings.
///
/// Credentials are never read from here. They come from the standard
/// `AWS_*` environment variables picked up by the S3 client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Custom endpoint for S3-compatible stores (MinIO, Ceph, ...)
    pub endpoint: Option<String>,
    /// Region override; falls back to `AWS_REGION`/`AWS_DEFAULT_REGION`
    pub region: Option<String>,
    /// Permit plain-HTTP endpoints
    #[serde(alias = "allow_http")]
    pub allow_http: bool,
}

/// Fail with operator guidance when a required configuration file is absent.
pub fn require_file(path: &Path, guidance: &str) -> anyhow::Result<()> {
    if path.is_file() {
        return Ok(());
    }

    anyhow::bail!(
        "Configuration file not found: {}\n\n{}",
        path.display(),
        guidance.trim_end()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::{
        Figment, Jail,
        providers::{Format, Json, Toml},
    };

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert!(config.endpoint.is_none());
        assert!(config.region.is_none());
        assert!(!config.allow_http);
    }

    #[test]
    fn test_storage_config_accepts_both_key_styles() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "storage.json",
                r#"{ "endpoint": "http://localhost:9000", "allowHttp": true }"#,
            )?;
            jail.create_file(
                "storage.toml",
                r#"
                endpoint = "http://minio:9000"
                region = "eu-west-1"
                allow_http = true
                "#,
            )?;

            let json: StorageConfig = Figment::from(Json::file("storage.json")).extract()?;
            assert_eq!(json.endpoint.as_deref(), Some("http://localhost:9000"));
            assert!(json.allow_http);

            let toml: StorageConfig = Figment::from(Toml::file("storage.toml")).extract()?;
            assert_eq!(toml.endpoint.as_deref(), Some("http://minio:9000"));
            assert_eq!(toml.region.as_deref(), Some("eu-west-1"));
            assert!(toml.allow_http);

            Ok(())
        });
    }

    #[test]
    fn test_require_file_reports_guidance() {
        let err = require_file(Path::new("/definitely/not/here.toml"), "Create it first.\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("Configuration file not found"));
        assert!(err.contains("/definitely/not/here.toml"));
        assert!(err.ends_with("Create it first."));
    }
}
