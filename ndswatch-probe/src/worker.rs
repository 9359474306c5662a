//! Persistence worker.
//!
//! A single task drains the ingestion queue and writes each batch to the
//! store. Store health is tracked by an explicit state machine: a failed
//! write is followed by a ping; a failed ping counts as an outage, which
//! closes the connection and sleeps `30 s × errorCount` before reconnecting.
//! Delivery is at-most-once: a batch whose write fails is never retried.

use std::time::Duration;

use ndswatch_adapters::{AdapterError, MetricStore, StoreConnector};
use ndswatch_types::MetricBatch;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::queue::IngestReceiver;

/// Backoff added per consecutive outage.
pub const BACKOFF_STEP: Duration = Duration::from_secs(30);

/// Errors that stop the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The store was unreachable when the worker started.
    #[error("Unable to connect to the store at startup: {0}")]
    InitialConnect(#[source] AdapterError),
}

/// Where the worker is in its recovery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for or writing the next batch.
    Ready { error_count: u32 },
    /// A write failed; pinging to see whether the store is still there.
    Verifying { error_count: u32 },
    /// The store is down; sleeping before a reconnect.
    Backoff { error_count: u32 },
}

impl WorkerState {
    /// Consecutive confirmed outages.
    pub fn error_count(self) -> u32 {
        match self {
            WorkerState::Ready { error_count }
            | WorkerState::Verifying { error_count }
            | WorkerState::Backoff { error_count } => error_count,
        }
    }
}

impl Default for WorkerState {
    fn default() -> Self {
        WorkerState::Ready { error_count: 0 }
    }
}

/// Outcome of one store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    WriteOk,
    WriteFailed,
    PingOk,
    PingFailed,
    /// The backoff sleep finished and a reconnect was attempted, whatever
    /// its result.
    ReconnectAttempted,
}

/// Pure transition function of the worker state machine.
///
/// Events that make no sense in the current state leave it unchanged.
pub fn transition(state: WorkerState, event: WorkerEvent) -> WorkerState {
    use WorkerEvent::*;
    use WorkerState::*;

    match (state, event) {
        (Ready { .. }, WriteOk) => Ready { error_count: 0 },
        (Ready { error_count }, WriteFailed) => Verifying { error_count },
        (Verifying { error_count }, PingOk) => Ready { error_count },
        (Verifying { error_count }, PingFailed) => Backoff {
            error_count: error_count.saturating_add(1),
        },
        (Backoff { error_count }, ReconnectAttempted) => Ready { error_count },
        (state, _) => state,
    }
}

/// Sleep before reconnecting after `error_count` consecutive outages.
pub fn backoff_delay(error_count: u32) -> Duration {
    BACKOFF_STEP.saturating_mul(error_count)
}

/// Drains the ingestion queue into the store.
pub struct PersistenceWorker<C: StoreConnector> {
    connector: C,
    store: Option<C::Store>,
    state: WorkerState,
}

impl<C> PersistenceWorker<C>
where
    C: StoreConnector + 'static,
    C::Store: 'static,
{
    /// Connect to the store and ping it.
    ///
    /// Startup requires a reachable store: if the server is down at boot,
    /// even briefly, this fails and the caller exits. Outages after startup
    /// are retried by the run loop instead.
    pub async fn start(connector: C) -> Result<Self, WorkerError> {
        let store = connector
            .connect()
            .await
            .map_err(WorkerError::InitialConnect)?;
        store.ping().await.map_err(WorkerError::InitialConnect)?;
        info!("Connected to the store");

        Ok(Self {
            connector,
            store: Some(store),
            state: WorkerState::default(),
        })
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run until the queue closes.
    pub async fn run(mut self, mut queue: IngestReceiver) {
        while let Some(batch) = queue.dequeue().await {
            self.handle(&batch).await;
        }
        if let Some(mut store) = self.store.take() {
            store.close().await;
        }
        info!("Ingestion queue closed, persistence worker stopping");
    }

    /// Run on a background task.
    pub fn spawn(self, queue: IngestReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(queue))
    }

    /// Write one batch, recovering the connection if needed.
    pub async fn handle(&mut self, batch: &MetricBatch) {
        let written = match &self.store {
            Some(store) => store.write(batch).await,
            None => Err(AdapterError::Connection("no store connection".to_string())),
        };

        match written {
            Ok(()) => {
                self.apply(WorkerEvent::WriteOk);
                debug!(points = batch.len(), "Batch persisted");
                return;
            }
            Err(e) => {
                warn!(error = %e, points = batch.len(), "Failed to write batch, dropping it");
                self.apply(WorkerEvent::WriteFailed);
            }
        }

        let reachable = match &self.store {
            Some(store) => store.ping().await,
            None => Err(AdapterError::Connection("no store connection".to_string())),
        };
        if let Err(e) = reachable {
            warn!(error = %e, "Store ping failed");
            self.apply(WorkerEvent::PingFailed);
        } else {
            self.apply(WorkerEvent::PingOk);
            return;
        }

        if let Some(mut store) = self.store.take() {
            store.close().await;
        }
        let delay = backoff_delay(self.state.error_count());
        warn!(
            seconds = delay.as_secs(),
            error_count = self.state.error_count(),
            "Sleeping before trying to reconnect"
        );
        tokio::time::sleep(delay).await;

        match self.connector.connect().await {
            Ok(store) => {
                info!("Reconnected to the store");
                self.store = Some(store);
            }
            Err(e) => error!(error = %e, "Unable to reconnect to the store"),
        }
        self.apply(WorkerEvent::ReconnectAttempted);
    }

    fn apply(&mut self, event: WorkerEvent) {
        self.state = transition(self.state, event);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::queue::ingest_queue;

    #[derive(Debug, Default)]
    struct Script {
        writes: VecDeque<bool>,
        pings: VecDeque<bool>,
        connects: VecDeque<bool>,
        written: Vec<MetricBatch>,
        connected_at: Vec<Instant>,
        closed: usize,
    }

    #[derive(Debug, Clone, Default)]
    struct FakeConnector(Arc<Mutex<Script>>);

    struct FakeStore(Arc<Mutex<Script>>);

    fn failure() -> AdapterError {
        AdapterError::Connection("refused".to_string())
    }

    #[async_trait]
    impl StoreConnector for FakeConnector {
        type Store = FakeStore;

        async fn connect(&self) -> Result<FakeStore, AdapterError> {
            let mut script = self.0.lock().unwrap();
            script.connected_at.push(Instant::now());
            if script.connects.pop_front().unwrap_or(true) {
                Ok(FakeStore(self.0.clone()))
            } else {
                Err(failure())
            }
        }
    }

    #[async_trait]
    impl MetricStore for FakeStore {
        async fn write(&self, batch: &MetricBatch) -> Result<(), AdapterError> {
            let mut script = self.0.lock().unwrap();
            if script.writes.pop_front().unwrap_or(true) {
                script.written.push(batch.clone());
                Ok(())
            } else {
                Err(failure())
            }
        }

        async fn ping(&self) -> Result<(), AdapterError> {
            let ok = self.0.lock().unwrap().pings.pop_front().unwrap_or(true);
            if ok {
                Ok(())
            } else {
                Err(failure())
            }
        }

        async fn close(&mut self) {
            self.0.lock().unwrap().closed += 1;
        }
    }

    fn batch(ts: u64) -> MetricBatch {
        MetricBatch::builder("nds")
            .timestamp_secs(ts)
            .point("NdsError", Default::default(), 0)
            .build()
    }

    #[test]
    fn test_transition_table() {
        let ready = WorkerState::Ready { error_count: 2 };
        assert_eq!(
            transition(ready, WorkerEvent::WriteOk),
            WorkerState::Ready { error_count: 0 }
        );
        assert_eq!(
            transition(ready, WorkerEvent::WriteFailed),
            WorkerState::Verifying { error_count: 2 }
        );
        assert_eq!(
            transition(WorkerState::Verifying { error_count: 2 }, WorkerEvent::PingOk),
            WorkerState::Ready { error_count: 2 }
        );
        assert_eq!(
            transition(WorkerState::Verifying { error_count: 2 }, WorkerEvent::PingFailed),
            WorkerState::Backoff { error_count: 3 }
        );
        assert_eq!(
            transition(WorkerState::Backoff { error_count: 3 }, WorkerEvent::ReconnectAttempted),
            WorkerState::Ready { error_count: 3 }
        );
        // out-of-place events are ignored
        assert_eq!(transition(ready, WorkerEvent::PingFailed), ready);
    }

    #[test]
    fn test_backoff_is_linear() {
        assert_eq!(backoff_delay(1), Duration::from_secs(30));
        assert_eq!(backoff_delay(2), Duration::from_secs(60));
        assert_eq!(backoff_delay(5), Duration::from_secs(150));
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_fatal() {
        let connector = FakeConnector::default();
        connector.0.lock().unwrap().connects.push_back(false);
        let result = PersistenceWorker::start(connector).await;
        assert!(matches!(result, Err(WorkerError::InitialConnect(_))));
    }

    #[tokio::test]
    async fn test_unreachable_store_at_startup_is_fatal() {
        let connector = FakeConnector::default();
        connector.0.lock().unwrap().pings.push_back(false);
        let result = PersistenceWorker::start(connector).await;
        assert!(matches!(result, Err(WorkerError::InitialConnect(_))));
    }

    #[tokio::test]
    async fn test_writes_in_order_and_stops_when_queue_closes() {
        let connector = FakeConnector::default();
        let script = connector.0.clone();
        let worker = PersistenceWorker::start(connector).await.unwrap();

        let (tx, rx) = ingest_queue(10);
        for ts in 1..=3 {
            tx.enqueue(batch(ts));
        }
        drop(tx);
        worker.run(rx).await;

        let script = script.lock().unwrap();
        let stamps: Vec<u64> = script.written.iter().map(|b| b.points[0].timestamp_secs).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
        assert_eq!(script.closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_does_not_sleep() {
        let connector = FakeConnector::default();
        let script = connector.0.clone();
        let mut worker = PersistenceWorker::start(connector).await.unwrap();
        script.lock().unwrap().writes.push_back(false);

        let before = Instant::now();
        worker.handle(&batch(1)).await;
        assert_eq!(Instant::now(), before);
        assert_eq!(worker.state(), WorkerState::Ready { error_count: 0 });
        assert!(script.lock().unwrap().written.is_empty());
        assert_eq!(script.lock().unwrap().connected_at.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_then_resets() {
        let connector = FakeConnector::default();
        let script = connector.0.clone();
        let mut worker = PersistenceWorker::start(connector).await.unwrap();
        {
            let mut s = script.lock().unwrap();
            s.writes.extend([false, false, false, true, false]);
            s.pings.extend([false, false, false, false]);
        }

        for ts in 1..=3 {
            worker.handle(&batch(ts)).await;
        }
        assert_eq!(worker.state().error_count(), 3);

        worker.handle(&batch(4)).await;
        assert_eq!(worker.state(), WorkerState::Ready { error_count: 0 });

        worker.handle(&batch(5)).await;
        assert_eq!(worker.state().error_count(), 1);

        let s = script.lock().unwrap();
        let gaps: Vec<u64> = s
            .connected_at
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![30, 60, 90, 30]);
        assert_eq!(s.closed, 4);
        assert_eq!(s.written.len(), 1);
        assert_eq!(s.written[0].points[0].timestamp_secs, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reconnect_keeps_worker_alive() {
        let connector = FakeConnector::default();
        let script = connector.0.clone();
        let mut worker = PersistenceWorker::start(connector).await.unwrap();
        {
            let mut s = script.lock().unwrap();
            s.writes.push_back(false);
            s.pings.push_back(false);
            s.connects.push_back(false);
        }

        worker.handle(&batch(1)).await;
        assert_eq!(worker.state().error_count(), 1);

        // No connection: the next batch counts as another outage.
        let before = Instant::now();
        worker.handle(&batch(2)).await;
        assert_eq!(worker.state().error_count(), 2);
        assert_eq!((Instant::now() - before).as_secs(), 60);

        // Reconnected now; writes go through again.
        worker.handle(&batch(3)).await;
        assert_eq!(worker.state().error_count(), 0);
        assert_eq!(script.lock().unwrap().written.len(), 1);
    }
}
