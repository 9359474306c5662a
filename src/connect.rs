//! Construction of the concrete SSH and InfluxDB connectors.

use anyhow::{Context, Result};
use ndswatch_adapters::influxdb::InfluxConnector;
use ndswatch_adapters::ssh::{SshAuth, SshConnector};
use ndswatch_probe::{Credential, RemoteConfig, StoreConfig};

/// SSH connector for the configured gateway.
pub fn ssh_connector(remote: &RemoteConfig) -> Result<SshConnector> {
    let auth = match &remote.credential {
        Credential::Password(password) => SshAuth::Password(password.clone()),
        Credential::KeyFile(path) => SshAuth::KeyFile(path.clone()),
    };

    SshConnector::builder()
        .host(remote.host.clone())
        .port(remote.port)
        .username(remote.username.clone())
        .auth(auth)
        .build()
        .context("Invalid SSH settings")
}

/// InfluxDB connector for the configured store.
pub fn influx_connector(store: &StoreConfig) -> InfluxConnector {
    let builder = InfluxConnector::builder().endpoint(store.address.clone());
    match &store.username {
        Some(username) => builder
            .credentials(username.clone(), store.password.clone().unwrap_or_default())
            .build(),
        None => builder.build(),
    }
}
