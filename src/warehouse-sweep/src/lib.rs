//! Warehouse-driven cleanup of dropped tables.
//!
//! Runs an operator-supplied query against a Flight SQL warehouse, keeps
//! the rows whose table path matches an optional prefix, records them in an
//! audit CSV, and purges the object-storage prefix derived from each path.

pub mod config;
pub mod events;
pub mod report;
pub mod sweep;
pub mod warehouse;

pub use config::{ConfigOverrides, ConnectionConfig, PathsConfig, WarehouseSweepConfig};
pub use events::{FilteredEvents, PathExtractor, PathFilter};
pub use report::write_csv;
pub use sweep::{PrefixOutcome, WarehouseSweepReport, WarehouseSweeper};
pub use warehouse::{EventSource, FlightSqlSession, WarehouseError};
