//! SSH adapter built on the OpenSSH client binary.
//!
//! A connection is an OpenSSH control master (`ssh -M -N -S <socket>`); each
//! command channel is a client invocation multiplexed over that socket, so
//! authentication happens once per connection rather than once per probe.
//! Password authentication goes through `sshpass -e` (the password is passed
//! in the `SSHPASS` environment variable, never on the command line).
//!
//! ## Example
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
//!         .key_file("/etc/NDSmonitor/id_rsa")
//!         .build()?;
//!
//!     let mut connection = connector.connect().await?;
//!     let channel = connection.open_channel().await?;
//!     let output = channel.combined_output("ndsctl json").await?;
//!     println!("{}", output.text());
//!     connection.close().await;
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{AdapterError, CommandChannel, CommandOutput, RemoteConnection, RemoteConnector};

/// Exit status the OpenSSH client uses for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

/// How often the control socket is probed while the master is starting.
const MASTER_POLL_INTERVAL: Duration = Duration::from_millis(200);

static SOCKET_SEQ: AtomicU64 = AtomicU64::new(0);

/// How the master connection authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum SshAuth {
    /// Password authentication via `sshpass`.
    Password(String),
    /// Private key authentication.
    KeyFile(PathBuf),
}

impl std::fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SshAuth::Password(_) => f.write_str("Password(..)"),
            SshAuth::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
        }
    }
}

/// Connector that establishes OpenSSH control-master connections.
#[derive(Debug)]
pub struct SshConnector {
    port: u16,
    auth: SshAuth,
    control_dir: PathBuf,
    connect_timeout: Duration,
    command_timeout: Duration,
    destination: String,
}

impl SshConnector {
    /// Create a new builder for configuring the connector.
    pub fn builder() -> SshConnectorBuilder {
        SshConnectorBuilder::default()
    }

    fn next_socket_path(&self) -> PathBuf {
        let seq = SOCKET_SEQ.fetch_add(1, Ordering::Relaxed);
        self.control_dir
            .join(format!("ndswatch-{}-{}.sock", std::process::id(), seq))
    }

    /// Program and arguments that start the control master.
    fn master_command_line(&self, socket: &Path) -> (&'static str, Vec<String>) {
        let mut args = Vec::new();
        let program = match &self.auth {
            SshAuth::Password(_) => {
                args.extend(["-e".to_string(), "ssh".to_string()]);
                "sshpass"
            }
            SshAuth::KeyFile(key) => {
                args.extend([
                    "-o".to_string(),
                    "BatchMode=yes".to_string(),
                    "-i".to_string(),
                    key.display().to_string(),
                ]);
                "ssh"
            }
        };

        args.extend([
            "-M".to_string(),
            "-N".to_string(),
            "-S".to_string(),
            socket.display().to_string(),
            "-o".to_string(),
            "ControlPersist=no".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-p".to_string(),
            self.port.to_string(),
            self.destination.clone(),
        ]);

        (program, args)
    }

    fn spawn_master(&self, socket: &Path) -> Result<Child, AdapterError> {
        let (program, args) = self.master_command_line(socket);
        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let SshAuth::Password(password) = &self.auth {
            cmd.env("SSHPASS", password);
        }

        cmd.spawn().map_err(|e| AdapterError::Spawn {
            program,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    type Connection = SshConnection;

    async fn connect(&self) -> Result<SshConnection, AdapterError> {
        let socket = self.next_socket_path();
        let _ = tokio::fs::remove_file(&socket).await;

        let mut master = self.spawn_master(&socket)?;
        let deadline = Instant::now() + self.connect_timeout;

        loop {
            let exited = master.try_wait().map_err(|e| {
                AdapterError::Connection(format!("Failed to poll ssh master: {e}"))
            })?;
            if let Some(status) = exited {
                let mut stderr = String::new();
                if let Some(mut pipe) = master.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                return Err(AdapterError::Connection(format!(
                    "ssh master for {} exited ({status}): {}",
                    self.destination,
                    stderr.trim()
                )));
            }

            if control_check(&socket, &self.destination).await {
                debug!(destination = %self.destination, socket = %socket.display(), "SSH control master ready");
                return Ok(SshConnection {
                    master,
                    socket,
                    destination: self.destination.clone(),
                    command_timeout: self.command_timeout,
                });
            }

            if Instant::now() >= deadline {
                let _ = master.kill().await;
                let _ = tokio::fs::remove_file(&socket).await;
                return Err(AdapterError::Timeout);
            }

            tokio::time::sleep(MASTER_POLL_INTERVAL).await;
        }
    }

    fn destination(&self) -> &str {
        &self.destination
    }
}

/// Builder for `SshConnector`.
#[derive(Debug, Default)]
pub struct SshConnectorBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    auth: Option<SshAuth>,
    control_dir: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
}

impl SshConnectorBuilder {
    /// Set the remote host name or address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the login user.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Authenticate with a password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = Some(SshAuth::Password(password.into()));
        self
    }

    /// Authenticate with a private key file.
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.auth = Some(SshAuth::KeyFile(path.into()));
        self
    }

    /// Set the authentication method directly.
    pub fn auth(mut self, auth: SshAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Directory for control sockets (default: the system temp dir).
    pub fn control_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.control_dir = Some(dir.into());
        self
    }

    /// Time allowed for the master to come up (default: 10 seconds).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Time allowed for a single remote command (default: 60 seconds).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Build the connector.
    pub fn build(self) -> Result<SshConnector, AdapterError> {
        let host = self
            .host
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AdapterError::Config("SSH host is required".to_string()))?;
        let username = self
            .username
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AdapterError::Config("SSH username is required".to_string()))?;
        let auth = self.auth.ok_or_else(|| {
            AdapterError::Config("SSH password or key file is required".to_string())
        })?;

        Ok(SshConnector {
            destination: format!("{username}@{host}"),
            port: self.port.unwrap_or(22),
            auth,
            control_dir: self.control_dir.unwrap_or_else(std::env::temp_dir),
            connect_timeout: self.connect_timeout.unwrap_or(Duration::from_secs(10)),
            command_timeout: self.command_timeout.unwrap_or(Duration::from_secs(60)),
        })
    }
}

/// A running control master.
#[derive(Debug)]
pub struct SshConnection {
    master: Child,
    socket: PathBuf,
    destination: String,
    command_timeout: Duration,
}

#[async_trait]
impl RemoteConnection for SshConnection {
    type Channel = SshChannel;

    async fn open_channel(&self) -> Result<SshChannel, AdapterError> {
        if !control_check(&self.socket, &self.destination).await {
            return Err(AdapterError::Connection(format!(
                "control master for {} is not responding",
                self.destination
            )));
        }
        Ok(SshChannel {
            socket: self.socket.clone(),
            destination: self.destination.clone(),
            timeout: self.command_timeout,
        })
    }

    async fn close(&mut self) {
        let _ = Command::new("ssh")
            .arg("-S")
            .arg(&self.socket)
            .args(["-O", "exit"])
            .arg(&self.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = self.master.kill().await {
            debug!(error = %e, "ssh master already gone");
        }
        let _ = tokio::fs::remove_file(&self.socket).await;
    }
}

/// A command channel multiplexed over a control master.
#[derive(Debug, Clone)]
pub struct SshChannel {
    socket: PathBuf,
    destination: String,
    timeout: Duration,
}

impl SshChannel {
    fn command_line(&self, command: &str) -> Vec<String> {
        vec![
            "-S".to_string(),
            self.socket.display().to_string(),
            "-o".to_string(),
            "ControlMaster=no".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            self.destination.clone(),
            command.to_string(),
        ]
    }
}

#[async_trait]
impl CommandChannel for SshChannel {
    async fn combined_output(&self, command: &str) -> Result<CommandOutput, AdapterError> {
        let mut cmd = Command::new("ssh");
        cmd.args(self.command_line(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AdapterError::Spawn {
                    program: "ssh",
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(command, timeout_secs = self.timeout.as_secs(), "Remote command timed out");
                return Err(AdapterError::Timeout);
            }
        };

        if output.status.code() == Some(SSH_CLIENT_FAILURE) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::Connection(format!(
                "ssh to {} failed: {}",
                self.destination,
                stderr.trim()
            )));
        }

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Ok(CommandOutput {
            output: combined,
            exit_code: output.status.code(),
        })
    }
}

/// Ask the control master whether it is alive.
async fn control_check(socket: &Path, destination: &str) -> bool {
    Command::new("ssh")
        .arg("-S")
        .arg(socket)
        .args(["-O", "check"])
        .arg(destination)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}
