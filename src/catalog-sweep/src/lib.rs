//! Catalog-driven cleanup of dropped Iceberg tables.
//!
//! Finds `DROP TABLE` commits in a Nessie-compatible catalog's history,
//! resolves each dropped table's metadata location as of the commit before
//! the drop, and purges the table's data root from object storage.

pub mod client;
pub mod config;
pub mod drops;
pub mod history;
pub mod resolver;
pub mod sweep;

pub use client::{CatalogError, NessieClient};
pub use config::{CatalogSweepConfig, ConfigOverrides};
pub use drops::{DropEvent, parse_drop_message, parse_drops};
pub use resolver::{MetadataResolver, TableSnapshot, encode_table_path};
pub use sweep::{CatalogSweeper, SweepReport, TableOutcome};
