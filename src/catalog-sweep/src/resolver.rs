//! Pre-drop metadata lookup.

use common::prefix::{PrefixError, data_root_from_metadata_location};

use crate::client::{CatalogError, NessieClient};
use crate::drops::DropEvent;

/// Content type the catalog reports for Iceberg tables.
pub const ICEBERG_TABLE: &str = "ICEBERG_TABLE";

/// A dropped table's last known metadata pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    pub table_identifier: String,
    pub metadata_location: String,
}

impl TableSnapshot {
    /// The table's data root: the metadata location truncated at `/metadata/`.
    pub fn data_root(&self) -> Result<&str, PrefixError> {
        data_root_from_metadata_location(&self.metadata_location)
    }
}

/// Percent-encode a table identifier for use as a single path segment.
///
/// Every character outside `A-Z a-z 0-9 - _ . ~` is escaped, so quoted
/// identifiers keep their structure: `"my_folder".subfolder.mytable`
/// becomes `%22my_folder%22.subfolder.mytable`.
pub fn encode_table_path(identifier: &str) -> String {
    urlencoding::encode(identifier).into_owned()
}

/// Looks up each dropped table at the commit right before its drop.
pub struct MetadataResolver<'a> {
    client: &'a NessieClient,
}

impl<'a> MetadataResolver<'a> {
    pub fn new(client: &'a NessieClient) -> Self {
        Self { client }
    }

    /// Resolve the table's content at `@<parent-commit>`.
    ///
    /// # Errors
    ///
    /// Fails when the drop has no parent commit, the lookup does not succeed,
    /// or the content there is not an Iceberg table with a metadata location.
    pub async fn resolve(&self, event: &DropEvent) -> Result<TableSnapshot, CatalogError> {
        if event.parent_commit_id.is_empty() {
            return Err(CatalogError::MissingParentCommit(
                event.table_identifier.clone(),
            ));
        }

        let reference = format!("@{}", event.parent_commit_id);
        let key = encode_table_path(&event.table_identifier);

        tracing::debug!(
            table = %event.table_identifier,
            reference = %reference,
            "Fetching pre-drop table content"
        );

        let response = self.client.content(&reference, &key).await?;

        let unsupported = |content_type: String| CatalogError::UnsupportedContent {
            table: event.table_identifier.clone(),
            content_type,
        };

        let content = response
            .content
            .ok_or_else(|| unsupported("no content".to_string()))?;
        if !content.content_type.contains(ICEBERG_TABLE) {
            return Err(unsupported(content.content_type));
        }

        let metadata_location = content
            .metadata_location
            .filter(|location| !location.is_empty())
            .ok_or_else(|| unsupported(format!("{} without metadataLocation", content.content_type)))?;

        Ok(TableSnapshot {
            table_identifier: event.table_identifier.clone(),
            metadata_location,
        })
    }
}
