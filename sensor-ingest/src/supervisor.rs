//! Per-endpoint connection supervisor.
//!
//! A [`Supervisor`] keeps one session with one endpoint alive for the life of
//! the process.  Its responsibilities are:
//! - Driving the FSM in [`crate::state`] and performing each [`Action`].
//! - Opening, authenticating, and draining a [`Session`].
//! - Polling frames, decoding them, and forwarding valid records to the bus.
//! - Tearing the whole session down on any failure and backing off.
//!
//! A single bad frame means byte alignment can no longer be trusted, so the
//! policy is "reconnect on any decode failure" rather than resynchronising
//! inside the stream.
//!
//! Shutdown is cooperative: the stop token is checked before each action and
//! raced against every blocking step, so a supervisor exits within one I/O
//! timeout of the stop request.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bus::BusSender;
use crate::config::{EndpointConfig, ProtocolConfig, SessionTiming};
use crate::session::{is_transient, Session, SessionError};
use crate::state::{Action, ConnectionState, Event};

/// Counters reported when a supervisor exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    /// TCP connections successfully opened.
    pub sessions_opened: u64,
    /// Sessions (or connect attempts) that ended in failure.
    pub sessions_failed: u64,
    /// Frames that arrived complete but did not validate.
    pub frames_rejected: u64,
    /// Records handed to the bus.
    pub records_forwarded: u64,
}

/// Supervisor for one endpoint.
pub struct Supervisor {
    endpoint: Arc<EndpointConfig>,
    protocol: Arc<ProtocolConfig>,
    timing: SessionTiming,
    bus: BusSender,
    stop: CancellationToken,

    state: ConnectionState,
    session: Option<Session>,
    frame: Vec<u8>,
    stats: SupervisorStats,
}

impl Supervisor {
    /// Create a supervisor in [`ConnectionState::Connecting`].
    pub fn new(
        endpoint: Arc<EndpointConfig>,
        protocol: Arc<ProtocolConfig>,
        timing: SessionTiming,
        bus: BusSender,
        stop: CancellationToken,
    ) -> Self {
        let frame = vec![0u8; endpoint.packet_size()];
        Self {
            endpoint,
            protocol,
            timing,
            bus,
            stop,
            state: ConnectionState::default(),
            session: None,
            frame,
            stats: SupervisorStats::default(),
        }
    }

    /// Run until the stop token fires (or the bus is closed underneath us).
    pub async fn run(mut self) -> SupervisorStats {
        let stop = self.stop.clone();
        let mut action = self.state.entry_action();
        log::info!(
            "[supervisor:{}] starting ({} frames of {} bytes from {})",
            self.endpoint.tag,
            self.endpoint.decoder,
            self.endpoint.packet_size(),
            self.endpoint.addr()
        );

        while action != Action::Exit {
            let event = if stop.is_cancelled() {
                Event::StopRequested
            } else {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => Event::StopRequested,
                    event = self.perform(action) => event,
                }
            };

            let next = self.state.on(event);
            log::debug!(
                "[supervisor:{}] {} --{:?}--> {}",
                self.endpoint.tag,
                self.state,
                event,
                next.state
            );
            self.state = next.state;
            action = next.action;
        }

        self.session = None;
        log::info!(
            "[supervisor:{}] stopped: {} session(s), {} failure(s), \
             {} rejected frame(s), {} record(s)",
            self.endpoint.tag,
            self.stats.sessions_opened,
            self.stats.sessions_failed,
            self.stats.frames_rejected,
            self.stats.records_forwarded
        );
        self.stats
    }

    /// Carry out one action and report what happened.
    async fn perform(&mut self, action: Action) -> Event {
        let outcome = match action {
            Action::Connect => self.connect().await.map(|()| Event::Connected),
            Action::Authenticate => self.authenticate().await.map(|()| Event::Authenticated),
            Action::Drain => self.drain().map(|()| Event::Drained),
            Action::Poll => self.poll_once().await,
            Action::Backoff => {
                self.session = None;
                tokio::time::sleep(self.timing.backoff).await;
                Ok(Event::BackoffElapsed)
            }
            Action::Exit => Ok(Event::StopRequested),
        };

        outcome.unwrap_or_else(|err| {
            self.on_failure(&err);
            Event::Failed
        })
    }

    async fn connect(&mut self) -> Result<(), SessionError> {
        let session = Session::connect(&self.endpoint.addr(), &self.timing).await?;
        log::info!("[supervisor:{}] connected to {}", self.endpoint.tag, session.peer);
        self.stats.sessions_opened += 1;
        self.session = Some(session);
        Ok(())
    }

    /// Write the auth token; the endpoint never replies, so just wait out
    /// the settle delay.
    async fn authenticate(&mut self) -> Result<(), SessionError> {
        let token = self.protocol.auth_token.as_bytes();
        live(&mut self.session)?.send(token).await?;
        tokio::time::sleep(self.timing.settle_delay).await;
        Ok(())
    }

    /// Throw away whatever was queued before the first poll so the next read
    /// starts on a frame boundary.
    fn drain(&mut self) -> Result<(), SessionError> {
        let discarded = live(&mut self.session)?.drain_backlog()?;
        if discarded > 0 {
            log::debug!(
                "[supervisor:{}] discarded {discarded} stale byte(s)",
                self.endpoint.tag
            );
        }
        Ok(())
    }

    /// Poll one frame, decode it, and hand it to the bus.
    async fn poll_once(&mut self) -> Result<Event, SessionError> {
        let command = self.protocol.poll_command.as_bytes();
        live(&mut self.session)?
            .poll(command, &mut self.frame)
            .await?;

        let record = match self.endpoint.decoder.decode(&self.frame, &self.endpoint.tag) {
            Ok(record) => record,
            Err(e) => {
                self.stats.frames_rejected += 1;
                return Err(e.into());
            }
        };

        if self.bus.send(record).await.is_err() {
            log::info!("[supervisor:{}] bus closed; stopping", self.endpoint.tag);
            return Ok(Event::StopRequested);
        }
        self.stats.records_forwarded += 1;
        Ok(Event::FrameForwarded)
    }

    fn on_failure(&mut self, err: &SessionError) {
        self.stats.sessions_failed += 1;
        self.session = None;
        if is_transient(err) {
            log::warn!(
                "[supervisor:{}] {} failed: {err}; reconnecting in {:?}",
                self.endpoint.tag,
                self.state,
                self.timing.backoff
            );
        } else {
            log::warn!(
                "[supervisor:{}] protocol error in {}: {err}; \
                 dropping session, reconnecting in {:?}",
                self.endpoint.tag,
                self.state,
                self.timing.backoff
            );
        }
    }
}

/// The session an action expects to exist.
fn live(session: &mut Option<Session>) -> Result<&mut Session, SessionError> {
    session.as_mut().ok_or_else(|| {
        SessionError::Io(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "no live session",
        ))
    })
}
