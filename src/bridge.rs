//! Host-side callbacks and the dispatch of session events to them.
//!
//! Handlers run on whatever thread calls
//! [`SessionRegistry::poll`](crate::SessionRegistry::poll), never on a
//! session loop, so they need not be `Send`.

use std::fmt;

use crate::session::{SessionEvent, SessionHandle};

type ConnectFn = Box<dyn FnMut(&SessionHandle)>;
type TextFn = Box<dyn FnMut(&SessionHandle, &str)>;
type BinaryFn = Box<dyn FnMut(&SessionHandle, &[u8])>;

/// Optional callbacks for one session. Unset slots are skipped.
///
/// ```
/// use rsws_bridge::Handlers;
///
/// let handlers = Handlers::new()
///     .on_connect(|session| {
///         let _ = session.send("hello");
///     })
///     .on_message(|_, text| println!("got {text}"))
///     .on_disconnect(|session, reason| println!("{session} gone: {reason}"));
/// assert!(handlers.is_set());
/// ```
#[derive(Default)]
pub struct Handlers {
    connect: Option<ConnectFn>,
    message: Option<TextFn>,
    binary: Option<BinaryFn>,
    error: Option<TextFn>,
    disconnect: Option<TextFn>,
}

impl Handlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the upgrade handshake has completed.
    #[must_use]
    pub fn on_connect(mut self, f: impl FnMut(&SessionHandle) + 'static) -> Self {
        self.set_on_connect(f);
        self
    }

    /// Called for every complete text message, in arrival order.
    #[must_use]
    pub fn on_message(mut self, f: impl FnMut(&SessionHandle, &str) + 'static) -> Self {
        self.set_on_message(f);
        self
    }

    #[must_use]
    pub fn on_binary(mut self, f: impl FnMut(&SessionHandle, &[u8]) + 'static) -> Self {
        self.set_on_binary(f);
        self
    }

    /// Called on protocol or transport failures. A disconnect follows.
    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(&SessionHandle, &str) + 'static) -> Self {
        self.set_on_error(f);
        self
    }

    /// Called exactly once, as the last callback of the session.
    #[must_use]
    pub fn on_disconnect(mut self, f: impl FnMut(&SessionHandle, &str) + 'static) -> Self {
        self.set_on_disconnect(f);
        self
    }

    pub fn set_on_connect(&mut self, f: impl FnMut(&SessionHandle) + 'static) {
        self.connect = Some(Box::new(f));
    }

    pub fn set_on_message(&mut self, f: impl FnMut(&SessionHandle, &str) + 'static) {
        self.message = Some(Box::new(f));
    }

    pub fn set_on_binary(&mut self, f: impl FnMut(&SessionHandle, &[u8]) + 'static) {
        self.binary = Some(Box::new(f));
    }

    pub fn set_on_error(&mut self, f: impl FnMut(&SessionHandle, &str) + 'static) {
        self.error = Some(Box::new(f));
    }

    pub fn set_on_disconnect(&mut self, f: impl FnMut(&SessionHandle, &str) + 'static) {
        self.disconnect = Some(Box::new(f));
    }

    /// `true` if at least one slot is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.connect.is_some()
            || self.message.is_some()
            || self.binary.is_some()
            || self.error.is_some()
            || self.disconnect.is_some()
    }

    /// Invoke the handler matching `event`, if any.
    pub fn dispatch(&mut self, session: &SessionHandle, event: &SessionEvent) {
        match event {
            SessionEvent::Connected => {
                if let Some(f) = self.connect.as_mut() {
                    f(session);
                }
            }
            SessionEvent::Message(text) => {
                if let Some(f) = self.message.as_mut() {
                    f(session, text);
                }
            }
            SessionEvent::Binary(data) => {
                if let Some(f) = self.binary.as_mut() {
                    f(session, data);
                }
            }
            SessionEvent::Error(message) => {
                if let Some(f) = self.error.as_mut() {
                    f(session, message);
                }
            }
            SessionEvent::Disconnected(reason) => {
                if let Some(f) = self.disconnect.as_mut() {
                    f(session, reason);
                }
            }
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("on_connect", &self.connect.is_some())
            .field("on_message", &self.message.is_some())
            .field("on_binary", &self.binary.is_some())
            .field("on_error", &self.error.is_some())
            .field("on_disconnect", &self.disconnect.is_some())
            .finish()
    }
}
