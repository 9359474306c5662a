//! Fixed-interval probe scheduler.
//!
//! Each tick makes sure a remote connection exists and can hand out a
//! command channel, then launches one probe cycle on its own task. A tick
//! that has to reconnect does not probe; the new connection is used from the
//! following tick on. There is no retry limit and no backoff at this layer.

use std::sync::Arc;
use std::time::Duration;

use ndswatch_adapters::{AdapterError, RemoteConnection, RemoteConnector};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::cycle::ProbeCycle;
use crate::queue::IngestSender;

/// A liveness line is logged every this many ticks.
pub const LIVENESS_TICKS: u64 = 30;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A probe cycle was started.
    Launched,
    /// The connection was re-established; probing resumes next tick.
    Reconnected,
    /// Reconnecting failed; the tick was skipped.
    ReconnectFailed,
    /// Too many cycles were still running; the tick was skipped.
    Saturated,
}

/// Drives probe cycles against one remote host.
pub struct ProbeScheduler<R: RemoteConnector> {
    connector: R,
    connection: Option<R::Connection>,
    cycle: Arc<ProbeCycle>,
    queue: IngestSender,
    interval: Duration,
    permits: Arc<Semaphore>,
    ticks: u64,
}

impl<R> ProbeScheduler<R>
where
    R: RemoteConnector + 'static,
    R::Connection: 'static,
{
    pub fn new(connector: R, config: &MonitorConfig, queue: IngestSender) -> Self {
        Self {
            connector,
            connection: None,
            cycle: Arc::new(ProbeCycle::new(&config.probe, config.store.database.clone())),
            queue,
            interval: config.probe.poll_interval,
            permits: Arc::new(Semaphore::new(config.probe.max_in_flight.max(1))),
            ticks: 0,
        }
    }

    /// Establish the first connection before ticking starts.
    pub async fn connect(&mut self) -> Result<(), AdapterError> {
        let connection = self.connector.connect().await?;
        info!(destination = self.connector.destination(), "Connected to remote host");
        self.connection = Some(connection);
        Ok(())
    }

    /// Whether a remote connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Perform one tick.
    pub async fn tick(&mut self) -> TickOutcome {
        self.ticks += 1;
        if self.ticks % LIVENESS_TICKS == 0 {
            info!(ticks = self.ticks, "Still active");
        }

        let opened = match &self.connection {
            Some(connection) => connection.open_channel().await.map_err(Some),
            None => Err(None),
        };

        let channel = match opened {
            Ok(channel) => channel,
            Err(cause) => {
                if let Some(e) = cause {
                    warn!(error = %e, "Unable to open a command channel");
                }
                return self.reconnect().await;
            }
        };

        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Previous probe still running, skipping this tick");
                return TickOutcome::Saturated;
            }
        };

        let cycle = self.cycle.clone();
        let queue = self.queue.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match cycle.run(&channel).await {
                Ok(batch) => {
                    queue.enqueue(batch);
                }
                Err(e) => warn!(error = %e, "Probe cycle abandoned"),
            }
        });
        TickOutcome::Launched
    }

    async fn reconnect(&mut self) -> TickOutcome {
        if let Some(mut stale) = self.connection.take() {
            stale.close().await;
        }
        info!(destination = self.connector.destination(), "Attempting to reconnect");

        match self.connector.connect().await {
            Ok(connection) => {
                debug!("Remote connection re-established");
                self.connection = Some(connection);
                TickOutcome::Reconnected
            }
            Err(e) => {
                error!(error = %e, "Reconnect failed");
                TickOutcome::ReconnectFailed
            }
        }
    }

    /// Tick forever at the configured interval.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// Run on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
