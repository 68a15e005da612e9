//! Scripted warehouse for integration testing

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use warehouse_sweep::{EventSource, WarehouseError};

/// Answers every query with a fixed result set, or a fixed failure.
pub struct ScriptedWarehouse {
    result: Result<Vec<RecordBatch>, String>,
    pub queries: Vec<String>,
    pub close_calls: usize,
}

impl ScriptedWarehouse {
    pub fn returning(batches: Vec<RecordBatch>) -> Self {
        Self {
            result: Ok(batches),
            queries: Vec::new(),
            close_calls: 0,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            queries: Vec::new(),
            close_calls: 0,
        }
    }
}

#[async_trait]
impl EventSource for ScriptedWarehouse {
    async fn fetch(&mut self, query: &str) -> Result<Vec<RecordBatch>, WarehouseError> {
        self.queries.push(query.to_string());
        self.result.clone().map_err(WarehouseError::Query)
    }

    async fn close(&mut self) -> Result<(), WarehouseError> {
        self.close_calls += 1;
        Ok(())
    }
}
