use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ndswatch::{influx_connector, ssh_connector, Settings};
use ndswatch_adapters::line_protocol::encode_batch;
use ndswatch_adapters::{RemoteConnection, RemoteConnector};
use ndswatch_probe::{
    ingest_queue, MonitorConfig, PersistenceWorker, ProbeCycle, ProbeScheduler,
};

/// Time allowed for queued batches to be written on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "ndswatch", version)]
#[command(about = "Polls nodogsplash client status over SSH and records it in InfluxDB")]
struct Args {
    /// Settings file (YAML or TOML). Defaults to /etc/NDSmonitor/config.yml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "ndswatch_probe=trace". Overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Probe once, print the batch as line protocol and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;

    info!(version = env!("CARGO_PKG_VERSION"), "ndswatch starting up");

    let config = Settings::load(args.config.as_deref())?.into_config()?;

    if args.once {
        return probe_once(&config).await;
    }
    run(config).await
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Run the monitor until interrupted.
async fn run(config: MonitorConfig) -> Result<()> {
    let ssh = ssh_connector(&config.remote)?;
    let influx = influx_connector(&config.store);

    let (tx, rx) = ingest_queue(config.probe.queue_capacity);
    let worker = PersistenceWorker::start(influx)
        .await
        .context("Unable to connect to DB at startup")?
        .spawn(rx);

    let mut scheduler = ProbeScheduler::new(ssh, &config, tx);
    if let Err(e) = scheduler.connect().await {
        // the first tick retries
        warn!(error = %e, "Initial connection to remote host failed");
    }

    info!(
        interval_secs = config.probe.poll_interval.as_secs(),
        portal = %config.probe.portal_name,
        "Startup successful, beginning monitoring loop"
    );

    tokio::select! {
        _ = scheduler.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
        }
    }

    // scheduler dropped: the queue closes once in-flight cycles finish
    match tokio::time::timeout(SHUTDOWN_GRACE, worker).await {
        Ok(Err(e)) => error!(error = %e, "Persistence worker panicked"),
        Ok(Ok(())) => {}
        Err(_) => warn!("Persistence worker still busy, exiting without draining the queue"),
    }
    Ok(())
}

/// Run one probe cycle and print its batch.
async fn probe_once(config: &MonitorConfig) -> Result<()> {
    let connector = ssh_connector(&config.remote)?;
    let mut connection = connector
        .connect()
        .await
        .with_context(|| format!("Unable to connect to {}", connector.destination()))?;

    let cycle = ProbeCycle::new(&config.probe, config.store.database.clone());
    let result = match connection.open_channel().await {
        Ok(channel) => cycle.run(&channel).await.map_err(anyhow::Error::from),
        Err(e) => Err(anyhow::Error::from(e).context("Unable to open a command channel")),
    };
    connection.close().await;

    println!("{}", encode_batch(&result?));
    Ok(())
}
