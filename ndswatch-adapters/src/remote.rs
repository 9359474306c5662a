//! Remote command execution seams.
//!
//! The probe scheduler owns one [`RemoteConnection`] at a time and asks it
//! for a fresh [`CommandChannel`] on every tick. Implementations decide what
//! a connection and a channel are; the SSH adapter maps them onto an OpenSSH
//! control master and multiplexed client invocations.

use std::borrow::Cow;

use async_trait::async_trait;

use crate::AdapterError;

/// Combined output of one remote command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// stdout followed by stderr.
    pub output: Vec<u8>,

    /// Exit code, `None` when the command was killed by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Create output for a command that exited with `exit_code`.
    pub fn new(output: impl Into<Vec<u8>>, exit_code: i32) -> Self {
        Self {
            output: output.into(),
            exit_code: Some(exit_code),
        }
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Output decoded as UTF-8, lossily.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }
}

/// A channel able to run commands on the remote host.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Run `command` and collect its combined output.
    ///
    /// A non-zero exit status is not an error; transport failures are.
    async fn combined_output(&self, command: &str) -> Result<CommandOutput, AdapterError>;
}

/// An established connection to the remote host.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Channel type handed to probe cycles.
    type Channel: CommandChannel + 'static;

    /// Open a new command channel over this connection.
    async fn open_channel(&self) -> Result<Self::Channel, AdapterError>;

    /// Tear the connection down. Errors are ignored.
    async fn close(&mut self);
}

/// Factory for remote connections, holding the stored credential.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Connection type produced by this connector.
    type Connection: RemoteConnection;

    /// Establish a new connection.
    async fn connect(&self) -> Result<Self::Connection, AdapterError>;

    /// Human-readable destination, used in log lines.
    fn destination(&self) -> &str;
}
