//! Supervisor finite-state machine (FSM) types.
//!
//! This module defines every state a [`crate::supervisor::Supervisor`] can
//! occupy and the pure transition function between them.  Nothing here does
//! I/O: the supervisor performs the [`Action`] it is handed, reports the
//! outcome as an [`Event`], and asks for the next [`Transition`].
//!
//! ```text
//!  CONNECTING ──connected──▶ AUTHENTICATING ──authenticated──▶ DRAINING
//!      ▲                                                          │
//!      │ backoff elapsed                                  drained │
//!      │                                                          ▼
//!   BACKOFF ◀──────────────── failed (any state) ─────────── POLLING ◀─┐
//!                                                               │      │
//!                                                               └──────┘
//!                                                            frame forwarded
//!
//!  any state ──stop requested──▶ STOPPED
//! ```

/// All possible states of one endpoint supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Opening the TCP connection.
    #[default]
    Connecting,
    /// Auth token written; waiting out the settle delay.
    Authenticating,
    /// Discarding bytes the endpoint queued before we were ready.
    Draining,
    /// Steady state: poll, read one frame, forward it.
    Polling,
    /// Session torn down; waiting before the next connect attempt.
    Backoff,
    /// Stop observed; the supervisor has exited.
    Stopped,
}

/// Outcome of the last action, fed back into the FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Connected,
    Authenticated,
    Drained,
    /// A valid frame was decoded and handed to the bus.
    FrameForwarded,
    /// I/O error, timeout, end-of-stream, or rejected frame.
    Failed,
    BackoffElapsed,
    StopRequested,
}

/// What the supervisor must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    Authenticate,
    Drain,
    Poll,
    /// Drop the session and wait out the backoff delay.
    Backoff,
    Exit,
}

/// Result of feeding one [`Event`] into the FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: ConnectionState,
    pub action: Action,
}

impl Transition {
    const fn to(state: ConnectionState, action: Action) -> Self {
        Self { state, action }
    }
}

impl ConnectionState {
    /// Apply `event` to this state.
    ///
    /// `StopRequested` wins from every state.  An event that makes no sense
    /// for the current state is handled like a failure: the session is
    /// discarded and the supervisor backs off.
    pub fn on(self, event: Event) -> Transition {
        use Action as A;
        use ConnectionState as S;

        match (self, event) {
            (S::Stopped, _) | (_, Event::StopRequested) => Transition::to(S::Stopped, A::Exit),
            (S::Connecting, Event::Connected) => Transition::to(S::Authenticating, A::Authenticate),
            (S::Authenticating, Event::Authenticated) => Transition::to(S::Draining, A::Drain),
            (S::Draining, Event::Drained) => Transition::to(S::Polling, A::Poll),
            (S::Polling, Event::FrameForwarded) => Transition::to(S::Polling, A::Poll),
            (S::Backoff, Event::BackoffElapsed) => Transition::to(S::Connecting, A::Connect),
            _ => Transition::to(S::Backoff, A::Backoff),
        }
    }

    /// Action that enters this state from scratch.
    pub fn entry_action(self) -> Action {
        match self {
            ConnectionState::Connecting => Action::Connect,
            ConnectionState::Authenticating => Action::Authenticate,
            ConnectionState::Draining => Action::Drain,
            ConnectionState::Polling => Action::Poll,
            ConnectionState::Backoff => Action::Backoff,
            ConnectionState::Stopped => Action::Exit,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
