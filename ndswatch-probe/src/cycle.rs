//! One probe of the remote gateway.
//!
//! A cycle runs `ndsctl json` over a fresh command channel, decides whether
//! nodogsplash is up, optionally restarts it, decodes the status document and
//! turns it into a [`MetricBatch`].

use std::time::Duration;

use ndswatch_adapters::{AdapterError, CommandChannel, CommandOutput};
use ndswatch_types::{current_timestamp_secs, MetricBatch, StatusError, StatusSnapshot};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::extract::Extractor;

/// Command that dumps nodogsplash's client table.
pub const STATUS_COMMAND: &str = "ndsctl json";

/// Init script used to bring nodogsplash back up.
pub const RESTART_COMMAND: &str = "/etc/init.d/nodogsplash restart";

/// Output ndsctl prints when the daemon is not reachable.
pub const SERVICE_DOWN_MARKER: &str = "ndsctl: nodogsplash probably not started";

/// Cycles slower than this are logged.
pub const SLOW_PROBE_THRESHOLD: Duration = Duration::from_secs(180);

/// Reasons a cycle is abandoned without producing a batch.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The status command could not be run.
    #[error("Failed to fetch status: {0}")]
    Fetch(#[from] AdapterError),

    /// The status document was not decodable.
    #[error(transparent)]
    Decode(#[from] StatusError),
}

/// Whether the status output says nodogsplash is down.
pub fn is_service_down(output: &CommandOutput) -> bool {
    !output.success() || output.text().contains(SERVICE_DOWN_MARKER)
}

/// Run the status command once.
pub async fn fetch_status<C>(channel: &C) -> Result<CommandOutput, AdapterError>
where
    C: CommandChannel + ?Sized,
{
    channel.combined_output(STATUS_COMMAND).await
}

/// A reusable probe, shared by every cycle the scheduler launches.
#[derive(Debug, Clone)]
pub struct ProbeCycle {
    extractor: Extractor,
    self_monitor: bool,
    allow_restart: bool,
}

impl ProbeCycle {
    pub fn new(config: &ProbeConfig, database: impl Into<String>) -> Self {
        Self {
            extractor: Extractor::new(config.portal_name.clone(), database),
            self_monitor: config.self_monitor,
            allow_restart: config.allow_restart,
        }
    }

    /// Probe once and build the batch to enqueue.
    pub async fn run<C>(&self, channel: &C) -> Result<MetricBatch, ProbeError>
    where
        C: CommandChannel + ?Sized,
    {
        let started = Instant::now();
        let timestamp = current_timestamp_secs();

        let output = fetch_status(channel).await?;
        let service_down = is_service_down(&output);

        let snapshot = if service_down {
            warn!(
                exit_code = ?output.exit_code,
                output = %output.text().trim(),
                "nodogsplash is not running on remote system"
            );
            if self.allow_restart {
                self.restart(channel).await;
            }
            StatusSnapshot::default()
        } else {
            StatusSnapshot::parse(&output.output)?
        };

        let mut batch = self.extractor.extract(&snapshot, service_down, timestamp);

        let elapsed = started.elapsed();
        if self.self_monitor {
            let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            batch.push(self.extractor.probe_time(millis, timestamp));
        }
        if elapsed >= SLOW_PROBE_THRESHOLD {
            warn!(duration_secs = elapsed.as_secs(), "Probe took a long time");
        }

        debug!(
            sessions = snapshot.len(),
            reported = %snapshot.client_count,
            points = batch.len(),
            "Probe complete"
        );
        Ok(batch)
    }

    async fn restart<C>(&self, channel: &C)
    where
        C: CommandChannel + ?Sized,
    {
        match channel.combined_output(RESTART_COMMAND).await {
            Ok(out) if out.success() => {
                info!(output = %out.text().trim(), "Restarted nodogsplash");
            }
            Ok(out) => {
                warn!(
                    exit_code = ?out.exit_code,
                    output = %out.text().trim(),
                    "nodogsplash restart failed"
                );
            }
            Err(e) => warn!(error = %e, "Unable to run nodogsplash restart"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::extract::{AUTHENTICATED, NDS_ERROR, PRE_AUTH, PROBE_TIME};

    /// Channel answering each command from a script, recording what ran.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedChannel {
        pub status: Option<CommandOutput>,
        pub restart: Option<CommandOutput>,
        pub delay: Duration,
        pub ran: Mutex<Vec<String>>,
    }

    impl ScriptedChannel {
        pub(crate) fn answering(json: &str) -> Self {
            Self {
                status: Some(CommandOutput::new(json, 0)),
                ..Default::default()
            }
        }

        fn commands(&self) -> Vec<String> {
            self.ran.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandChannel for ScriptedChannel {
        async fn combined_output(&self, command: &str) -> Result<CommandOutput, AdapterError> {
            self.ran.lock().unwrap().push(command.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let scripted = if command == STATUS_COMMAND {
                &self.status
            } else {
                &self.restart
            };
            scripted.clone().ok_or(AdapterError::Timeout)
        }
    }

    fn probe(self_monitor: bool, allow_restart: bool) -> ProbeCycle {
        let config = ProbeConfig {
            portal_name: "Lobby".to_string(),
            self_monitor,
            allow_restart,
            ..Default::default()
        };
        ProbeCycle::new(&config, "nds")
    }

    const TWO_CLIENTS: &str = r#"{"client_list_length":"2","clients":{
        "a":{"id":1,"state":"Authenticated","downloaded":1,"uploaded":2},
        "b":{"id":2,"state":"Preauthenticated","downloaded":0,"uploaded":0}}}"#;

    #[test]
    fn test_service_down_detection() {
        assert!(is_service_down(&CommandOutput::new(
            "ndsctl: nodogsplash probably not started (Error: Connection refused)",
            0
        )));
        assert!(is_service_down(&CommandOutput::new("", 1)));
        assert!(!is_service_down(&CommandOutput::new("{}", 0)));
    }

    #[tokio::test]
    async fn test_healthy_cycle() {
        let channel = ScriptedChannel::answering(TWO_CLIENTS);
        let batch = probe(false, true).run(&channel).await.unwrap();

        assert_eq!(batch.value_of(AUTHENTICATED), Some(1));
        assert_eq!(batch.value_of(PRE_AUTH), Some(1));
        assert_eq!(batch.value_of(NDS_ERROR), Some(0));
        assert_eq!(batch.value_of(PROBE_TIME), None);
        assert_eq!(channel.commands(), vec![STATUS_COMMAND]);
    }

    #[tokio::test]
    async fn test_service_down_restarts_when_allowed() {
        let channel = ScriptedChannel {
            status: Some(CommandOutput::new(
                "ndsctl: nodogsplash probably not started (Error: Connection refused)",
                1,
            )),
            restart: Some(CommandOutput::new("", 0)),
            ..Default::default()
        };
        let batch = probe(false, true).run(&channel).await.unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.value_of(NDS_ERROR), Some(1));
        assert_eq!(channel.commands(), vec![STATUS_COMMAND, RESTART_COMMAND]);
    }

    #[tokio::test]
    async fn test_service_down_without_restart() {
        let channel = ScriptedChannel {
            status: Some(CommandOutput::new("", 1)),
            ..Default::default()
        };
        let batch = probe(false, false).run(&channel).await.unwrap();
        assert_eq!(batch.value_of(NDS_ERROR), Some(1));
        assert_eq!(channel.commands(), vec![STATUS_COMMAND]);
    }

    #[tokio::test]
    async fn test_failed_restart_is_not_fatal() {
        // restart is unscripted, so the channel reports a timeout
        let channel = ScriptedChannel {
            status: Some(CommandOutput::new("", 1)),
            ..Default::default()
        };
        let batch = probe(false, true).run(&channel).await.unwrap();
        assert_eq!(batch.value_of(NDS_ERROR), Some(1));
    }

    #[tokio::test]
    async fn test_transport_failure_abandons_cycle() {
        let channel = ScriptedChannel::default();
        let err = probe(false, false).run(&channel).await.unwrap_err();
        assert!(matches!(err, ProbeError::Fetch(AdapterError::Timeout)));
    }

    #[tokio::test]
    async fn test_undecodable_document_abandons_cycle() {
        let channel = ScriptedChannel::answering("not json");
        let err = probe(false, false).run(&channel).await.unwrap_err();
        assert!(matches!(err, ProbeError::Decode(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_time_in_millis() {
        let channel = ScriptedChannel {
            delay: Duration::from_millis(1500),
            ..ScriptedChannel::answering(TWO_CLIENTS)
        };
        let batch = probe(true, false).run(&channel).await.unwrap();

        let probe_time = batch.value_of(PROBE_TIME).unwrap();
        assert!((1500..1600).contains(&probe_time), "got {probe_time}");
        assert_eq!(batch.iter().last().unwrap().measurement, PROBE_TIME);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_time_accompanies_service_down() {
        let channel = ScriptedChannel {
            status: Some(CommandOutput::new("", 1)),
            ..Default::default()
        };
        let batch = probe(true, false).run(&channel).await.unwrap();
        let names: Vec<&str> = batch.iter().map(|p| p.measurement.as_str()).collect();
        assert_eq!(names, vec![NDS_ERROR, PROBE_TIME]);
    }
}
