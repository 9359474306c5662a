//! # ndswatch-probe
//!
//! Polling and ingestion pipeline for nodogsplash status metrics.
//!
//! A [`ProbeScheduler`] ticks at a fixed interval, keeps one remote
//! connection alive and launches a [`ProbeCycle`] per tick. Each cycle turns
//! the output of `ndsctl json` into a [`MetricBatch`](ndswatch_types::MetricBatch)
//! and hands it to the ingestion queue, which a single [`PersistenceWorker`]
//! drains into the store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ndswatch_adapters::influxdb::InfluxConnector;
//! use ndswatch_adapters::ssh::SshConnector;
//! use ndswatch_probe::{ingest_queue, MonitorConfig, PersistenceWorker, ProbeScheduler};
//!
//! async fn monitor(config: MonitorConfig) -> Result<(), Box<dyn std::error::Error>> {
//!     let ssh = SshConnector::builder()
//!         .host(config.remote.host.clone())
//!         .username(config.remote.username.clone())
//!         .key_file("/etc/NDSmonitor/id_rsa")
//!         .build()?;
//!     let influx = InfluxConnector::builder()
//!         .endpoint(config.store.address.clone())
//!         .build();
//!
//!     let (tx, rx) = ingest_queue(config.probe.queue_capacity);
//!     let worker = PersistenceWorker::start(influx).await?.spawn(rx);
//!
//!     let mut scheduler = ProbeScheduler::new(ssh, &config, tx);
//!     scheduler.connect().await?;
//!     scheduler.run().await;
//!
//!     worker.await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Bounded concurrency**: at most `max_in_flight` cycles run at once
//! - **Non-blocking handoff**: a full queue drops the newest batch
//! - **Outage recovery**: linear `30 s × errorCount` backoff in the worker

mod config;
mod cycle;
mod extract;
mod queue;
mod scheduler;
mod worker;

pub use config::{
    Credential, MonitorConfig, ProbeConfig, RemoteConfig, StoreConfig, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY,
};
pub use cycle::{
    fetch_status, is_service_down, ProbeCycle, ProbeError, RESTART_COMMAND, SERVICE_DOWN_MARKER,
    SLOW_PROBE_THRESHOLD, STATUS_COMMAND,
};
pub use extract::{
    Extractor, AUTHENTICATED, DOWNLOAD_BYTES, NDS_ERROR, PORTAL_TAG, PRE_AUTH, PROBE_TIME,
    UPLOAD_BYTES,
};
pub use queue::{ingest_queue, IngestReceiver, IngestSender};
pub use scheduler::{ProbeScheduler, TickOutcome, LIVENESS_TICKS};
pub use worker::{
    backoff_delay, transition, PersistenceWorker, WorkerError, WorkerEvent, WorkerState,
    BACKOFF_STEP,
};
