//! Settings loading.
//!
//! Settings come from an optional YAML (or TOML) file layered under
//! `NDSWATCH_*` environment variables. Key names follow the file; the older
//! NDSmonitor spellings (`ndshostname`, `refresh`, `influxdbserver`, ...) are
//! accepted as aliases so existing config files keep working. A legacy
//! `host:port` value in `host` is split, and its port replaces `port`.
//!
//! ```yaml
//! host: 192.168.1.1
//! username: root
//! name: Main Lobby
//! poll_interval: 60
//! influxdb_server: http://localhost:8086
//! influxdb_database: nds
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::debug;

use ndswatch_probe::{
    Credential, MonitorConfig, ProbeConfig, RemoteConfig, StoreConfig, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY,
};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/NDSmonitor/config.yml";

/// Private key used when no password is configured.
pub const DEFAULT_KEY_FILE: &str = "/etc/NDSmonitor/id_rsa";

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "NDSWATCH";

/// Raw settings as read from the file and environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "ndshostname")]
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_file: PathBuf,

    /// Portal name used for the `Captive Portal` tag.
    pub name: String,

    /// Seconds between probes.
    #[serde(alias = "refresh", alias = "polltime")]
    pub poll_interval: u64,

    #[serde(alias = "selfmonitor")]
    pub self_monitor: bool,
    #[serde(alias = "allowrestart")]
    pub allow_restart: bool,

    #[serde(alias = "influxdbserver")]
    pub influxdb_server: String,
    #[serde(alias = "influxdb")]
    pub influxdb_database: String,
    #[serde(alias = "influxusername")]
    pub influxdb_username: Option<String>,
    #[serde(alias = "influxpassword")]
    pub influxdb_password: Option<String>,

    pub queue_capacity: usize,
    pub max_in_flight: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: None,
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
            name: String::new(),
            poll_interval: 0,
            self_monitor: false,
            allow_restart: false,
            influxdb_server: String::new(),
            influxdb_database: String::new(),
            influxdb_username: None,
            influxdb_password: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl Settings {
    /// Load settings from `path` (or the default file) and the process
    /// environment.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, Environment::with_prefix(ENV_PREFIX))
    }

    /// Load settings with a caller-supplied environment source.
    pub fn load_with(path: Option<&Path>, env: Environment) -> Result<Self> {
        let (file, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        debug!(file = %file.display(), required, "Loading settings");

        let config = Config::builder()
            .add_source(File::from(file.as_path()).required(required))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read settings from {}", file.display()))?;

        config
            .try_deserialize()
            .context("Invalid settings")
    }

    /// Validate and turn into the record the monitor runs on.
    pub fn into_config(self) -> Result<MonitorConfig> {
        if self.host.trim().is_empty() {
            bail!("No NDS host specified");
        }
        if self.username.trim().is_empty() {
            bail!("No SSH username specified");
        }
        if self.poll_interval == 0 {
            bail!("No poll interval specified");
        }
        if self.influxdb_server.trim().is_empty() {
            bail!("No InfluxDB address set");
        }
        if self.influxdb_database.trim().is_empty() {
            bail!("No InfluxDB database set");
        }

        let (host, port) = match split_host_port(self.host.trim())? {
            (host, Some(port)) => (host, port),
            (host, None) => (host, self.port),
        };

        let credential = match self.password.filter(|p| !p.is_empty()) {
            Some(password) => Credential::Password(password),
            None if self.key_file.is_file() => Credential::KeyFile(self.key_file),
            None => bail!(
                "No password set and no SSH key present at {}",
                self.key_file.display()
            ),
        };

        Ok(MonitorConfig {
            remote: RemoteConfig {
                host,
                port,
                username: self.username,
                credential,
            },
            store: StoreConfig {
                address: self.influxdb_server,
                database: self.influxdb_database,
                username: self.influxdb_username.filter(|u| !u.is_empty()),
                password: self.influxdb_password,
            },
            probe: ProbeConfig {
                portal_name: self.name,
                poll_interval: Duration::from_secs(self.poll_interval),
                self_monitor: self.self_monitor,
                allow_restart: self.allow_restart,
                queue_capacity: self.queue_capacity.max(1),
                max_in_flight: self.max_in_flight.max(1),
            },
        })
    }
}

/// Split an optional trailing `:port` off a host.
///
/// Bracketed IPv6 (`[::1]:22`) is supported; a bare IPv6 address is left
/// untouched.
fn split_host_port(host: &str) -> Result<(String, Option<u16>)> {
    let (name, port) = if let Some(rest) = host.strip_prefix('[') {
        match rest.split_once(']') {
            Some((addr, "")) => return Ok((addr.to_string(), None)),
            Some((addr, tail)) => match tail.strip_prefix(':') {
                Some(port) => (addr, port),
                None => bail!("Bad NDS host {host}"),
            },
            None => bail!("Bad NDS host {host}"),
        }
    } else {
        match host.split_once(':') {
            Some((name, port)) if !port.contains(':') => (name, port),
            _ => return Ok((host.to_string(), None)),
        }
    };

    if name.is_empty() {
        bail!("No NDS host specified");
    }
    let port = port
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .with_context(|| format!("Bad port in NDS host {host}"))?;
    Ok((name.to_string(), Some(port)))
}
