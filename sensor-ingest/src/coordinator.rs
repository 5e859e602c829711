//! Pipeline wiring and orderly shutdown.
//!
//! [`ShutdownCoordinator`] owns the stop token.  It starts the writer and one
//! supervisor per endpoint, waits for a shutdown trigger, and then tears the
//! pipeline down in a fixed order:
//!
//! 1. cancel the stop token,
//! 2. join every supervisor,
//! 3. close the bus,
//! 4. join the writer once it has drained the bus.
//!
//! Supervisor failures never surface here; they are handled by reconnecting.
//! A writer failure is fatal and is returned as [`PipelineError::Writer`]
//! after the supervisors have been stopped.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::bus;
use crate::config::IngestConfig;
use crate::supervisor::{Supervisor, SupervisorStats};
use crate::writer::{DurableWriter, WriterError};

/// Errors that end the whole pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no endpoints configured")]
    NoEndpoints,
    #[error("bus capacity must be at least 1")]
    ZeroCapacity,
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error("{task} task failed: {source}")]
    Task {
        task: String,
        #[source]
        source: JoinError,
    },
}

/// What a finished pipeline did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// `(endpoint tag, counters)` in configuration order.
    pub supervisors: Vec<(String, SupervisorStats)>,
    /// Records persisted by the writer during this run.
    pub records_written: u64,
}

/// Starts and stops the ingestion pipeline.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    config: IngestConfig,
    stop: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            stop: CancellationToken::new(),
        }
    }

    /// Handle that triggers the same orderly shutdown as the `trigger` future
    /// passed to [`run_until`](Self::run_until).
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Run the pipeline until `trigger` completes or the stop token is
    /// cancelled, then shut down in order.
    pub async fn run_until<F>(self, trigger: F) -> Result<PipelineReport, PipelineError>
    where
        F: Future<Output = ()>,
    {
        if self.config.endpoints.is_empty() {
            return Err(PipelineError::NoEndpoints);
        }
        if self.config.bus_capacity == 0 {
            return Err(PipelineError::ZeroCapacity);
        }

        // Opening the sink first means a bad output path fails before any
        // connection is attempted.
        let writer = DurableWriter::open(&self.config.output).await?;
        let (tx, rx) = bus::bounded(self.config.bus_capacity);
        let mut writer_task = tokio::spawn(writer.run(rx));

        let protocol = Arc::new(self.config.protocol.clone());
        let supervisors: Vec<(String, JoinHandle<SupervisorStats>)> = self
            .config
            .endpoints
            .iter()
            .map(|endpoint| {
                let sup = Supervisor::new(
                    Arc::new(endpoint.clone()),
                    Arc::clone(&protocol),
                    self.config.timing,
                    tx.clone(),
                    self.stop.clone(),
                );
                (endpoint.tag.clone(), tokio::spawn(sup.run()))
            })
            .collect();
        log::info!(
            "[coordinator] {} supervisor(s) running, bus capacity {}",
            supervisors.len(),
            self.config.bus_capacity
        );

        // Wait for a shutdown request, or for the writer to die early.
        let early_exit = tokio::select! {
            _ = trigger => {
                log::info!("[coordinator] shutdown requested");
                None
            }
            _ = self.stop.cancelled() => {
                log::info!("[coordinator] stop token cancelled");
                None
            }
            res = &mut writer_task => Some(res),
        };

        self.stop.cancel();
        let mut report = PipelineReport::default();
        let mut first_err = None;
        for (tag, handle) in supervisors {
            match handle.await {
                Ok(stats) => report.supervisors.push((tag, stats)),
                Err(source) => {
                    log::error!("[coordinator] supervisor {tag} panicked: {source}");
                    first_err.get_or_insert(PipelineError::Task {
                        task: format!("supervisor {tag}"),
                        source,
                    });
                }
            }
        }
        tx.close();
        drop(tx);

        let writer_result = match early_exit {
            Some(res) => res,
            None => writer_task.await,
        };
        match writer_result {
            Ok(Ok(written)) => report.records_written = written,
            Ok(Err(e)) => {
                log::error!("[coordinator] writer failed: {e}");
                return Err(e.into());
            }
            Err(source) => {
                return Err(PipelineError::Task {
                    task: "writer".to_owned(),
                    source,
                })
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                log::info!(
                    "[coordinator] shutdown complete; {} record(s) written",
                    report.records_written
                );
                Ok(report)
            }
        }
    }
}
