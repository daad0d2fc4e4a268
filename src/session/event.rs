//! Events flowing from a session loop to the host thread.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Something that happened on a session, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The upgrade handshake completed.
    Connected,
    /// A complete text message arrived.
    Message(String),
    /// A complete binary message arrived.
    Binary(Vec<u8>),
    /// Something went wrong; a `Disconnected` follows.
    Error(String),
    /// The session is over. Always the last event of a session.
    Disconnected(String),
}

impl SessionEvent {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Disconnected(_))
    }
}

#[derive(Default)]
struct Inner {
    events: VecDeque<SessionEvent>,
    sealed: bool,
}

/// FIFO of session events. Sealed by the terminal event; later pushes are dropped.
#[derive(Default)]
pub(crate) struct EventQueue {
    inner: Mutex<Inner>,
}

impl EventQueue {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a non-terminal event. Returns `false` once sealed.
    pub(crate) fn push(&self, event: SessionEvent) -> bool {
        let mut inner = self.lock();
        if inner.sealed {
            return false;
        }
        inner.events.push_back(event);
        true
    }

    /// Queue an optional error followed by the terminal `Disconnected`, then seal.
    pub(crate) fn push_terminal(&self, error: Option<String>, reason: String) -> bool {
        let mut inner = self.lock();
        if inner.sealed {
            return false;
        }
        if let Some(error) = error {
            inner.events.push_back(SessionEvent::Error(error));
        }
        inner.events.push_back(SessionEvent::Disconnected(reason));
        inner.sealed = true;
        true
    }

    /// Drop everything buffered and leave only the terminal event.
    pub(crate) fn replace_with_terminal(&self, reason: String) -> bool {
        let mut inner = self.lock();
        if inner.sealed {
            return false;
        }
        inner.events.clear();
        inner.events.push_back(SessionEvent::Disconnected(reason));
        inner.sealed = true;
        true
    }

    pub(crate) fn pop(&self) -> Option<SessionEvent> {
        self.lock().events.pop_front()
    }

    #[cfg(test)]
    pub(crate) fn drain(&self) -> Vec<SessionEvent> {
        self.lock().events.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Sealed and fully drained: nothing will ever be delivered again.
    pub(crate) fn is_finished(&self) -> bool {
        let inner = self.lock();
        inner.sealed && inner.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = EventQueue::default();
        queue.push(SessionEvent::Connected);
        queue.push(SessionEvent::Message("a".into()));
        queue.push(SessionEvent::Binary(vec![1]));
        assert_eq!(queue.len(), 3);
        assert_eq!(
            queue.drain(),
            vec![
                SessionEvent::Connected,
                SessionEvent::Message("a".into()),
                SessionEvent::Binary(vec![1]),
            ]
        );
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_terminal_seals_queue() {
        let queue = EventQueue::default();
        queue.push(SessionEvent::Connected);
        assert!(queue.push_terminal(Some("boom".into()), "gone".into()));
        assert!(!queue.push(SessionEvent::Message("late".into())));
        assert!(!queue.push_terminal(None, "again".into()));
        assert!(!queue.is_finished());

        assert_eq!(
            queue.drain(),
            vec![
                SessionEvent::Connected,
                SessionEvent::Error("boom".into()),
                SessionEvent::Disconnected("gone".into()),
            ]
        );
        assert!(queue.is_finished());
    }

    #[test]
    fn test_replace_with_terminal_discards_buffered() {
        let queue = EventQueue::default();
        queue.push(SessionEvent::Message("pending".into()));
        assert!(queue.replace_with_terminal("closed by user".into()));
        assert!(!queue.replace_with_terminal("twice".into()));
        assert_eq!(
            queue.drain(),
            vec![SessionEvent::Disconnected("closed by user".into())]
        );
    }
}
