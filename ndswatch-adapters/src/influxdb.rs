//! InfluxDB 1.x adapter using the HTTP API.
//!
//! Batches are written with `POST /write?db=<db>&precision=s` as line
//! protocol; liveness is checked with `GET /ping`, which answers
//! `204 No Content` when the server is up.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ndswatch_adapters::influxdb::InfluxConnector;
//! use ndswatch_adapters::{MetricStore, StoreConnector};
//! use ndswatch_types::{MetricBatch, Tags};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = InfluxConnector::builder()
//!         .endpoint("http://localhost:8086")
//!         .credentials("writer", "secret")
//!         .build();
//!
//!     let store = connector.connect().await?;
//!     store.ping().await?;
//!
//!     let batch = MetricBatch::builder("nds").point("NdsError", Tags::new(), 0).build();
//!     store.write(&batch).await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use ndswatch_types::MetricBatch;

use crate::line_protocol::encode_batch;
use crate::{AdapterError, MetricStore, StoreConnector};

/// Connector that opens InfluxDB HTTP clients.
#[derive(Debug, Clone)]
pub struct InfluxConnector {
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
    ping_timeout: Duration,
}

impl InfluxConnector {
    /// Create a new builder for configuring the connector.
    pub fn builder() -> InfluxConnectorBuilder {
        InfluxConnectorBuilder::default()
    }

    /// The configured server address.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StoreConnector for InfluxConnector {
    type Store = InfluxClient;

    async fn connect(&self) -> Result<InfluxClient, AdapterError> {
        if self.endpoint.is_empty() {
            return Err(AdapterError::Config("No InfluxDB address set".to_string()));
        }
        let parsed = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| AdapterError::Config(format!("Bad InfluxDB address {}: {e}", self.endpoint)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AdapterError::Config(format!(
                "InfluxDB address must be http or https: {}",
                self.endpoint
            )));
        }

        let client = Client::builder().timeout(self.timeout).build()?;
        debug!(endpoint = %self.endpoint, "InfluxDB client created");

        Ok(InfluxClient {
            client,
            endpoint: self.endpoint.trim_end_matches('/').to_string(),
            username: self.username.clone(),
            password: self.password.clone(),
            ping_timeout: self.ping_timeout,
        })
    }
}

/// Builder for `InfluxConnector`.
#[derive(Debug, Default)]
pub struct InfluxConnectorBuilder {
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
    ping_timeout: Option<Duration>,
}

impl InfluxConnectorBuilder {
    /// Set the server address (e.g., "http://localhost:8086").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the username and password for authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into()).filter(|u: &String| !u.is_empty());
        self.password = Some(password.into());
        self
    }

    /// Set the request timeout (default: 180 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the ping timeout (default: 10 seconds).
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = Some(timeout);
        self
    }

    /// Build the connector.
    pub fn build(self) -> InfluxConnector {
        InfluxConnector {
            endpoint: self
                .endpoint
                .unwrap_or_else(|| "http://localhost:8086".to_string()),
            username: self.username,
            password: self.password,
            timeout: self.timeout.unwrap_or(Duration::from_secs(180)),
            ping_timeout: self.ping_timeout.unwrap_or(Duration::from_secs(10)),
        }
    }
}

/// An open InfluxDB HTTP client.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    client: Client,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
    ping_timeout: Duration,
}

impl InfluxClient {
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_ref()),
            None => request,
        }
    }
}

#[async_trait]
impl MetricStore for InfluxClient {
    async fn write(&self, batch: &MetricBatch) -> Result<(), AdapterError> {
        if batch.is_empty() {
            return Ok(());
        }

        let url = format!("{}/write", self.endpoint);
        let request = self
            .client
            .post(&url)
            .query(&[("db", batch.database.as_str()), ("precision", "s")])
            .body(encode_batch(batch));

        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AdapterError::Auth("Invalid credentials".to_string()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Http(format!(
                "write returned status {}: {}",
                status,
                body.trim()
            )));
        }

        debug!(points = batch.len(), database = %batch.database, "Batch written");
        Ok(())
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        let url = format!("{}/ping", self.endpoint);
        let request = self.client.get(&url).timeout(self.ping_timeout);
        let response = self.authorize(request).send().await?;

        if !response.status().is_success() {
            return Err(AdapterError::Http(format!(
                "ping returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}
