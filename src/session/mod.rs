//! One WebSocket connection driven by a background task.
//!
//! A [`SessionHandle`] is the host-side view: it queues outgoing messages,
//! requests closes, and exposes the state. The loop in `worker` owns the
//! transport and reports back through a sealed [`SessionEvent`] queue.

mod event;
mod outbound;
mod worker;

pub use event::SessionEvent;

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::connection::{SessionState, StateCell};
use crate::error::{ConnectError, SendError};
use crate::message::Message;
use crate::transport::Target;

use event::EventQueue;
use outbound::OutboundQueue;

/// Identifier of a session; a random UUID v4.
pub type SessionId = Uuid;

/// Disconnect reason reported after [`SessionHandle::close_now`].
pub const CLOSED_BY_USER: &str = "closed by user";

pub(crate) struct Shared {
    id: SessionId,
    name: String,
    url: String,
    state: StateCell,
    events: EventQueue,
    outbound: OutboundQueue,
    kill: Notify,
}

impl Shared {
    /// Move to a terminal state and queue the final events.
    ///
    /// Only the caller that wins the transition reports, so a session emits
    /// exactly one `Disconnected`.
    pub(crate) fn terminate(&self, state: SessionState, error: Option<String>, reason: String) -> bool {
        if self.outbound.transition(&self.state, state).is_none() {
            return false;
        }
        self.outbound.clear();
        self.events.push_terminal(error, reason)
    }
}

/// Host-side handle to a session. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Validate `url` and start the session loop on `runtime`.
    ///
    /// Returns immediately with the session in `Connecting`.
    pub(crate) fn spawn(runtime: &Handle, url: &str, config: &Config) -> Result<Self, ConnectError> {
        let target = Target::parse(url)?;
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            name: config.name.clone(),
            url: url.to_string(),
            state: StateCell::new(SessionState::Connecting),
            events: EventQueue::default(),
            outbound: OutboundQueue::new(config.outbound_capacity),
            kill: Notify::new(),
        });

        let span = tracing::info_span!("session", id = %shared.id);
        let task = runtime.spawn(
            worker::run(shared.clone(), target, config.clone()).instrument(span.clone()),
        );
        runtime.spawn(worker::supervise(shared.clone(), task).instrument(span));

        Ok(Self { shared })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The URL the session was created with.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Messages accepted by `send` and not yet written.
    #[must_use]
    pub fn pending_sends(&self) -> usize {
        self.shared.outbound.len()
    }

    /// Events waiting for the next poll.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.shared.events.len()
    }

    /// Queue a text message. Never blocks.
    ///
    /// # Errors
    ///
    /// - `SendError::NotOpen` unless the session is `Open`
    /// - `SendError::QueueFull` if a bounded outbound queue is full
    pub fn send(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.shared
            .outbound
            .push(&self.shared.state, Message::Text(text.into()))
    }

    /// Alias of [`send`](Self::send).
    pub fn write(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.send(text)
    }

    /// Queue a binary message. Same rules as [`send`](Self::send).
    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<(), SendError> {
        self.shared
            .outbound
            .push(&self.shared.state, Message::Binary(data.into()))
    }

    /// Close gracefully: stop accepting sends, flush what is queued, then
    /// run the close handshake. A no-op once closing or terminal.
    pub fn close(&self) {
        let state = &self.shared.state;
        if self
            .shared
            .outbound
            .transition(state, SessionState::Closing)
            .is_some()
        {
            tracing::debug!(session = %self, "close requested");
            self.shared.outbound.wake();
        }
    }

    /// Drop the connection now. Queued messages and undelivered events are
    /// discarded and a single `Disconnected("closed by user")` is queued.
    /// Idempotent.
    pub fn close_now(&self) {
        let shared = &self.shared;
        if shared
            .outbound
            .transition(&shared.state, SessionState::Closed)
            .is_none()
        {
            return;
        }
        shared.outbound.clear();
        shared.events.replace_with_terminal(CLOSED_BY_USER.to_string());
        shared.kill.notify_one();
        tracing::debug!(session = %self, "closed immediately");
    }

    /// Oldest undelivered event. Popped one at a time so a `close_now`
    /// issued from a handler discards what is still queued.
    pub(crate) fn next_event(&self) -> Option<SessionEvent> {
        self.shared.events.pop()
    }

    #[cfg(test)]
    pub(crate) fn drain_events(&self) -> Vec<SessionEvent> {
        self.shared.events.drain()
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, event: SessionEvent) {
        self.shared.events.push(event);
    }

    /// Terminal and every event delivered.
    pub(crate) fn is_finished(&self) -> bool {
        self.shared.events.is_finished()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.shared.name, self.shared.id)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("url", &self.shared.url)
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for SessionHandle {}
