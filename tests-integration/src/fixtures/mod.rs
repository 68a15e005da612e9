//! Test fixtures for integration testing
//!
//! A mock catalog server, in-memory object storage, and a scripted
//! warehouse standing in for the external systems of both sweeps.

mod catalog_context;
mod storage_context;
mod warehouse_context;

pub use catalog_context::{CatalogTestContext, ScriptedCommit, RecordedRequest, RunningCatalog};
pub use storage_context::StorageTestContext;
pub use warehouse_context::ScriptedWarehouse;
