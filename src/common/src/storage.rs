use anyhow::Result;
use object_store::{ObjectStore, aws::AmazonS3Builder, memory::InMemory};
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::prefix::StoragePrefix;

/// Create the object store that serves every object under `root`.
///
/// Supported roots:
/// - `s3://bucket[/path]` (also `s3a://`), backed by Amazon S3 or an S3-compatible endpoint
/// - `memory://bucket[/path]`, an in-memory store for local experiments
///
/// The store is rooted at the bucket, so object keys are bucket-relative.
pub fn create_object_store(root: &str, config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let location = StoragePrefix::parse(root)
        .map_err(|e| anyhow::anyhow!("Invalid storage root '{}': {}", root, e))?;

    match location.scheme.as_str() {
        "memory" => Ok(Arc::new(InMemory::new())),
        "s3" | "s3a" => {
            let builder = create_s3_builder(&location.bucket, config);
            Ok(Arc::new(builder.build()?))
        }
        scheme => Err(anyhow::anyhow!(
            "Unsupported storage scheme: {}. Supported: s3, s3a, memory",
            scheme
        )),
    }
}

/// Create an S3 builder for `bucket`.
///
/// Credentials and region are taken from the `AWS_*` environment first;
/// explicit settings in `config` override them.
pub fn create_s3_builder(bucket: &str, config: &StorageConfig) -> AmazonS3Builder {
    let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

    if let Some(region) = &config.region {
        builder = builder.with_region(region);
    }

    if let Some(endpoint) = &config.endpoint {
        // S3-compatible stores such as MinIO need path-style URLs
        builder = builder
            .with_endpoint(endpoint)
            .with_virtual_hosted_style_request(false);
    }

    if config.allow_http {
        builder = builder.with_allow_http(true);
    }

    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_memory_object_store() {
        let object_store =
            create_object_store("memory://warehouse", &StorageConfig::default()).unwrap();
        assert!(Arc::strong_count(&object_store) == 1);
    }

    #[test]
    fn test_create_s3_object_store_with_endpoint() {
        let config = StorageConfig {
            endpoint: Some("http://localhost:9000".to_string()),
            region: Some("us-east-1".to_string()),
            allow_http: true,
        };

        let object_store = create_object_store("s3://lake/warehouse", &config);
        assert!(object_store.is_ok());
    }

    #[test]
    fn test_invalid_root() {
        let result = create_object_store("not-a-url", &StorageConfig::default());
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid storage root")
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let result = create_object_store("gcs://bucket/prefix", &StorageConfig::default());
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unsupported storage scheme")
        );
    }
}
