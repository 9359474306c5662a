//! # ndswatch
//!
//! Polls a nodogsplash captive portal over SSH and records client metrics
//! in InfluxDB.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  tick  ┌───────────┐  ndsctl json  ┌─────────┐
//! │ scheduler │───────▶│   cycle   │──────────────▶│ gateway │
//! └───────────┘        └─────┬─────┘               └─────────┘
//!                            │ MetricBatch
//!                            ▼
//!                      ┌───────────┐  /write  ┌──────────┐
//!                      │  queue →  │─────────▶│ InfluxDB │
//!                      │  worker   │          └──────────┘
//!                      └───────────┘
//! ```
//!
//! - **[`settings`]**: file + environment settings, validated into a
//!   [`MonitorConfig`](ndswatch_probe::MonitorConfig)
//! - **[`connect`]**: the concrete SSH and InfluxDB connectors
//! - **`ndswatch-probe`**: scheduler, probe cycle, queue and worker
//! - **`ndswatch-adapters`**: transports and line protocol
//!
//! ## Usage
//!
//! ```bash
//! # Use /etc/NDSmonitor/config.yml
//! ndswatch
//!
//! # Explicit settings file, verbose logs
//! ndswatch --config ./config.yml --log-level debug
//!
//! # Probe once and print the batch as line protocol
//! ndswatch --once
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use ndswatch::{influx_connector, Settings};
//! use ndswatch_adapters::{MetricStore, StoreConnector};
//!
//! # tokio_test::block_on(async {
//! let config = Settings::load(None).unwrap().into_config().unwrap();
//! let store = influx_connector(&config.store).connect().await.unwrap();
//! store.ping().await.unwrap();
//! # });
//! ```

pub mod connect;
pub mod settings;

pub use connect::{influx_connector, ssh_connector};
pub use settings::Settings;
