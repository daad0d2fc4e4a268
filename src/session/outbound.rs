//! Messages waiting to be written by a session loop.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::sync::futures::Notified;

use crate::connection::{SessionState, StateCell};
use crate::error::SendError;
use crate::message::Message;

pub(crate) struct OutboundQueue {
    items: Mutex<VecDeque<Message>>,
    capacity: Option<usize>,
    wake: Notify,
}

impl OutboundQueue {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
            wake: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `message` if `state` permits sending, and wake the loop.
    ///
    /// The state is read under the queue lock, so a message accepted here
    /// is always visible to the drain that follows a transition to `Closing`.
    pub(crate) fn push(&self, state: &StateCell, message: Message) -> Result<(), SendError> {
        {
            let mut items = self.lock();
            let current = state.get();
            if !current.can_send() {
                return Err(SendError::NotOpen(current));
            }
            if let Some(capacity) = self.capacity {
                if items.len() >= capacity {
                    return Err(SendError::QueueFull { capacity });
                }
            }
            items.push_back(message);
        }
        self.wake.notify_one();
        Ok(())
    }

    /// Move `state` forward while holding the queue lock.
    pub(crate) fn transition(&self, state: &StateCell, next: SessionState) -> Option<SessionState> {
        let _items = self.lock();
        state.advance(next)
    }

    pub(crate) fn drain(&self) -> Vec<Message> {
        self.lock().drain(..).collect()
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Wake the loop without queueing anything.
    pub(crate) fn wake(&self) {
        self.wake.notify_one();
    }

    pub(crate) fn notified(&self) -> Notified<'_> {
        self.wake.notified()
    }
}
