//! Error types for adapters.

use thiserror::Error;

/// Errors that can occur when talking to the remote host or the store.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Connection failed or was lost.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for a response.
    #[error("Request timed out")]
    Timeout,

    /// A local helper process could not be started.
    #[error("Failed to run {program}: {reason}")]
    Spawn {
        /// Program that failed to start.
        program: &'static str,
        /// Underlying error.
        reason: String,
    },

    /// The adapter was configured with unusable settings.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[cfg(feature = "influxdb")]
impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() {
            AdapterError::Connection(err.to_string())
        } else {
            AdapterError::Http(err.to_string())
        }
    }
}
