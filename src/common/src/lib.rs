//! Shared building blocks for the lakesweep cleanup tools.
//!
//! Both sweepers end the same way: derive an object-storage prefix from
//! catalog or warehouse metadata, then purge (or preview) everything under
//! it. The pieces for that terminal stage live here.

pub mod cli;
pub mod config;
pub mod prefix;
pub mod purge;
pub mod storage;

pub use prefix::{PrefixError, StoragePrefix};
pub use purge::{DeletionMode, DeletionResult, RunSummary, StoragePurger};
