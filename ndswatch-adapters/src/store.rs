//! Time-series store seams.

use async_trait::async_trait;
use ndswatch_types::MetricBatch;

use crate::AdapterError;

/// A live handle to the time-series store.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Write a whole batch in one call.
    async fn write(&self, batch: &MetricBatch) -> Result<(), AdapterError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), AdapterError>;

    /// Release the handle. Errors are ignored.
    async fn close(&mut self) {}
}

/// Factory for store handles.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Store handle produced by this connector.
    type Store: MetricStore;

    /// Open a new store handle.
    async fn connect(&self) -> Result<Self::Store, AdapterError>;
}
