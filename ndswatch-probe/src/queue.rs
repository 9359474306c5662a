//! Bounded handoff between probe cycles and the persistence worker.

use ndswatch_types::MetricBatch;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

/// Create a queue holding at most `capacity` batches.
///
/// A capacity of zero is treated as one.
pub fn ingest_queue(capacity: usize) -> (IngestSender, IngestReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IngestSender { tx }, IngestReceiver { rx })
}

/// Producer side, cloned into every probe cycle.
#[derive(Debug, Clone)]
pub struct IngestSender {
    tx: mpsc::Sender<MetricBatch>,
}

impl IngestSender {
    /// Hand a batch to the worker without waiting.
    ///
    /// Returns `false` when the batch was dropped because the queue is full
    /// or the worker has gone away.
    pub fn enqueue(&self, batch: MetricBatch) -> bool {
        match self.tx.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(batch)) => {
                warn!(points = batch.len(), "Ingestion queue full, not recording sample");
                false
            }
            Err(TrySendError::Closed(batch)) => {
                warn!(points = batch.len(), "Ingestion queue closed, not recording sample");
                false
            }
        }
    }

    /// Batches currently waiting.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer side, owned by the persistence worker.
#[derive(Debug)]
pub struct IngestReceiver {
    rx: mpsc::Receiver<MetricBatch>,
}

impl IngestReceiver {
    /// Wait for the next batch.
    ///
    /// Returns `None` once every sender is dropped and the queue is drained.
    pub async fn dequeue(&mut self) -> Option<MetricBatch> {
        self.rx.recv().await
    }
}
