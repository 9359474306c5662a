//! # ndswatch-adapters
//!
//! Transport adapters used by the nodogsplash status poller.
//!
//! Two concerns live here, each behind a small trait seam so the probe
//! loop and persistence worker can be tested against fakes:
//!
//! - **Remote command execution** (`ssh` feature) - [`RemoteConnector`],
//!   [`RemoteConnection`] and [`CommandChannel`], implemented on top of an
//!   OpenSSH control master
//! - **Time-series store** (`influxdb` feature) - [`StoreConnector`] and
//!   [`MetricStore`], implemented against the InfluxDB 1.x HTTP API
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ndswatch_adapters::ssh::SshConnector;
//! use ndswatch_adapters::{CommandChannel, RemoteConnection, RemoteConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = SshConnector::builder()
//!         .host("192.168.1.1")
//!         .username("root")
//!         .password("secret")
//!         .build()?;
//!
//!     let connection = connector.connect().await?;
//!     let channel = connection.open_channel().await?;
//!     let out = channel.combined_output("ndsctl json").await?;
//!
//!     println!("{}", out.text());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod line_protocol;
mod remote;
mod store;

#[cfg(feature = "ssh")]
pub mod ssh;

#[cfg(feature = "influxdb")]
pub mod influxdb;

pub use error::AdapterError;
pub use remote::{CommandChannel, CommandOutput, RemoteConnection, RemoteConnector};
pub use store::{MetricStore, StoreConnector};

// Re-export types for convenience
pub use ndswatch_types::{MetricBatch, MetricPoint, Tags};
