//! Storage test context for integration testing
//!
//! In-memory object storage seeded with table files.

use anyhow::Result;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use std::sync::Arc;

/// Test context for object storage operations
pub struct StorageTestContext {
    pub object_store: Arc<dyn ObjectStore>,
}

impl StorageTestContext {
    /// Creates in-memory storage holding `keys`
    pub async fn seeded(keys: &[&str]) -> Result<Self> {
        let object_store = Arc::new(InMemory::new()) as Arc<dyn ObjectStore>;

        for key in keys {
            object_store
                .put(&ObjectPath::from(*key), Bytes::from("data").into())
                .await?;
        }

        Ok(Self { object_store })
    }

    /// Lists all objects in storage, sorted
    pub async fn list_all_objects(&self) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self
            .object_store
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        paths.sort();
        Ok(paths)
    }

    /// Gets object count for a specific prefix
    pub async fn count_objects(&self, prefix: &str) -> Result<usize> {
        let prefix_path = ObjectPath::from(prefix);
        let objects: Vec<_> = self
            .object_store
            .list(Some(&prefix_path))
            .try_collect()
            .await?;
        Ok(objects.len())
    }
}
