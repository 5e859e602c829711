//! Entry point for `sensor-ingest`.
//!
//! Parses CLI arguments into an [`IngestConfig`], starts the pipeline, and
//! shuts it down when a line (or EOF) arrives on stdin or on Ctrl-C.  All
//! protocol work is delegated to library modules; `main.rs` owns only process
//! setup (logging, signal handling, argument parsing).

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::oneshot;

use sensor_ingest::config::{self, IngestConfig, SessionTiming};
use sensor_ingest::ShutdownCoordinator;

/// Poll two sensor endpoints and append their readings to a log file.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Sensor host serving both endpoints.
    #[arg(long, default_value = config::DEFAULT_HOST)]
    host: String,

    /// Port of the climate (temperature / pressure) endpoint.
    #[arg(long, default_value_t = config::CLIMATE_PORT)]
    climate_port: u16,

    /// Port of the motion (X / Y / Z) endpoint.
    #[arg(long, default_value_t = config::MOTION_PORT)]
    motion_port: u16,

    /// Append-only destination file.
    #[arg(short, long, default_value = config::OUTPUT_FILE)]
    output: PathBuf,

    /// Token written right after connecting.
    #[arg(long, default_value = config::AUTH_TOKEN)]
    auth_token: String,

    /// Command that requests one frame.
    #[arg(long, default_value = config::POLL_COMMAND)]
    poll_command: String,

    /// Records buffered before supervisors block.
    #[arg(long, default_value_t = config::BUS_CAPACITY)]
    bus_capacity: usize,

    /// Connect / read / write timeout in milliseconds.
    #[arg(long, default_value_t = 5000)]
    socket_timeout_ms: u64,

    /// Delay after authenticating, in milliseconds.
    #[arg(long, default_value_t = 200)]
    settle_ms: u64,

    /// Delay before reconnecting after a failure, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    backoff_ms: u64,
}

impl Cli {
    fn into_config(self) -> IngestConfig {
        let mut cfg = IngestConfig::for_host(&self.host);
        cfg.endpoints[0].port = self.climate_port;
        cfg.endpoints[0].tag = self.climate_port.to_string();
        cfg.endpoints[1].port = self.motion_port;
        cfg.endpoints[1].tag = self.motion_port.to_string();
        cfg.protocol.auth_token = self.auth_token;
        cfg.protocol.poll_command = self.poll_command;
        cfg.output = self.output;
        cfg.bus_capacity = self.bus_capacity;
        cfg.timing = SessionTiming {
            connect_timeout: Duration::from_millis(self.socket_timeout_ms),
            io_timeout: Duration::from_millis(self.socket_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_ms),
            backoff: Duration::from_millis(self.backoff_ms),
        };
        cfg
    }
}

/// Resolves on the first line from stdin, EOF on stdin, or Ctrl-C.
///
/// Stdin is read on a detached OS thread: a blocking read parked inside the
/// runtime would keep it from shutting down after Ctrl-C.
async fn shutdown_signal() {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let outcome = std::io::stdin().read_line(&mut line);
        let _ = tx.send(outcome);
    });

    tokio::select! {
        res = rx => match res {
            Ok(Ok(0)) => log::info!("stdin closed; shutting down"),
            Ok(Ok(_)) => log::info!("input received; shutting down"),
            Ok(Err(e)) => log::warn!("stdin unreadable ({e}); shutting down"),
            Err(_) => log::warn!("stdin reader vanished; shutting down"),
        },
        () = on_interrupt(tokio::signal::ctrl_c()) => log::info!("interrupted; shutting down"),
    }
}

/// Resolves when `signal` fires.  If the handler could not be installed it
/// never resolves, leaving stdin as the only trigger.
async fn on_interrupt<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        log::warn!("cannot listen for Ctrl-C ({e}); stop with Enter instead");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Default to `info`; RUST_LOG overrides.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config();
    log::info!(
        "ingesting from {} endpoint(s) into {}; press Enter to stop",
        config.endpoints.len(),
        config.output.display()
    );

    let report = ShutdownCoordinator::new(config)
        .run_until(shutdown_signal())
        .await
        .context("ingestion pipeline failed")?;

    for (tag, stats) in &report.supervisors {
        log::info!(
            "endpoint {tag}: {} record(s), {} session(s), {} failure(s)",
            stats.records_forwarded,
            stats.sessions_opened,
            stats.sessions_failed
        );
    }
    Ok(())
}
