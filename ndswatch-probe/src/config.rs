//! Monitor configuration records.
//!
//! Built once at startup by the binary's settings loader and passed by value
//! into the scheduler and worker. Nothing here is mutated afterwards.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Default ingestion queue capacity, in batches.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default number of probe cycles allowed in flight at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1;

/// How the remote host is authenticated against.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Password login.
    Password(String),
    /// Private key login.
    KeyFile(PathBuf),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(..)"),
            Credential::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
        }
    }
}

/// The gateway running nodogsplash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
}

/// The InfluxDB server metrics are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub address: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Probe loop behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Value of the `Captive Portal` tag.
    pub portal_name: String,

    /// Time between scheduler ticks.
    pub poll_interval: Duration,

    /// Emit a `ProbeTime` point with every batch.
    pub self_monitor: bool,

    /// Restart nodogsplash when it is found down.
    pub allow_restart: bool,

    /// Ingestion queue capacity, in batches.
    pub queue_capacity: usize,

    /// Probe cycles allowed to run concurrently.
    pub max_in_flight: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            portal_name: String::new(),
            poll_interval: Duration::from_secs(60),
            self_monitor: false,
            allow_restart: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Everything the monitor needs, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub remote: RemoteConfig,
    pub store: StoreConfig,
    pub probe: ProbeConfig,
}
