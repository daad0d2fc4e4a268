//! Session state machine.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a WebSocket session.
///
/// States are ordered; a session only ever moves forward through them.
/// `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SessionState {
    /// Transport connect and upgrade handshake in progress.
    #[default]
    Connecting = 0,
    /// Handshake complete, data flows both ways.
    Open = 1,
    /// Close requested; queued messages are flushed, then the close handshake runs.
    Closing = 2,
    /// Cleanly closed, or force-closed by the host.
    Closed = 3,
    /// Terminated by an unrecoverable error.
    Failed = 4,
}

impl SessionState {
    /// Returns `true` for `Closed` and `Failed`.
    #[must_use]
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Check if the host may queue messages in this state.
    ///
    /// Returns `true` only for `Open`.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, SessionState::Open)
    }

    /// Check if the background loop still moves frames in this state.
    ///
    /// Returns `true` for `Open` or `Closing`.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, SessionState::Open | SessionState::Closing)
    }

    /// Check whether moving to `next` respects the monotonic ordering.
    #[must_use]
    pub const fn can_transition_to(&self, next: SessionState) -> bool {
        !self.is_terminal() && (next as u8) > (*self as u8)
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            3 => SessionState::Closed,
            _ => SessionState::Failed,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Open => write!(f, "Open"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
            SessionState::Failed => write!(f, "Failed"),
        }
    }
}

/// Lock-free cell shared between the host thread and a session loop.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` if the ordering allows it.
    ///
    /// Returns the state that was replaced, or `None` if the transition was
    /// refused (the cell is left untouched).
    pub fn advance(&self, next: SessionState) -> Option<SessionState> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let from = SessionState::from_u8(current);
            if !from.can_transition_to(next) {
                return None;
            }
            match self.0.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(from),
                Err(actual) => current = actual,
            }
        }
    }
}
