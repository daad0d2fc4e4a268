//! The table of live sessions owned by the host thread.

use std::cell::RefCell;
use std::io;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

use crate::bridge::Handlers;
use crate::config::Config;
use crate::connection::SessionState;
use crate::error::{ConnectError, SendError};
use crate::session::{SessionHandle, SessionId};

/// Handlers taken out of an entry for one dispatch pass. They go back in on
/// drop, so an unwinding handler does not leave the entry checked out.
struct CheckedOut<'r> {
    registry: &'r SessionRegistry,
    session: SessionHandle,
    handlers: Option<Handlers>,
}

impl Drop for CheckedOut<'_> {
    fn drop(&mut self) {
        self.registry
            .check_in(self.session.id(), self.handlers.take());
    }
}

struct Entry {
    session: SessionHandle,
    handlers: Option<Handlers>,
    /// Set while this entry's handlers are checked out by `poll`.
    dispatching: bool,
}

/// Owns every session created through it and delivers their events.
///
/// The registry lives on the host thread (it is `!Send`): handlers are only
/// ever called from [`poll`](Self::poll). Session loops run on a tokio
/// runtime, either one the registry builds or one the host already has.
///
/// ```no_run
/// use rsws_bridge::{Config, Handlers, SessionRegistry};
///
/// let registry = SessionRegistry::new(Config::default())?;
/// let id = registry
///     .connect_with("ws://127.0.0.1:9001/", Handlers::new().on_message(|_, text| println!("{text}")))?
///     .id();
/// loop {
///     registry.poll();
///     if registry.state(id).is_none() {
///         break;
///     }
///     std::thread::sleep(std::time::Duration::from_millis(16));
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SessionRegistry {
    runtime: Option<Runtime>,
    handle: Handle,
    config: Config,
    entries: RefCell<Vec<Entry>>,
}

impl SessionRegistry {
    /// Build a registry with its own multi-threaded runtime.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the runtime cannot be started.
    pub fn new(config: Config) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(format!("{}-io", config.name))
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
            config,
            entries: RefCell::new(Vec::new()),
        })
    }

    /// Build a registry that spawns session loops on an existing runtime.
    ///
    /// The runtime must have I/O and time drivers enabled.
    #[must_use]
    pub fn with_handle(handle: Handle, config: Config) -> Self {
        Self {
            runtime: None,
            handle,
            config,
            entries: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start a session. Returns at once with the session `Connecting`.
    ///
    /// # Errors
    ///
    /// URL problems are reported here; network failures arrive later as
    /// `on_error` and `on_disconnect`.
    pub fn connect(&self, url: &str) -> Result<SessionHandle, ConnectError> {
        self.insert(url, None)
    }

    /// [`connect`](Self::connect) with handlers installed before any event
    /// can be delivered.
    pub fn connect_with(&self, url: &str, handlers: Handlers) -> Result<SessionHandle, ConnectError> {
        self.insert(url, Some(handlers))
    }

    fn insert(&self, url: &str, handlers: Option<Handlers>) -> Result<SessionHandle, ConnectError> {
        let session = SessionHandle::spawn(&self.handle, url, &self.config)?;
        info!(%session, url, "session created");
        self.entries.borrow_mut().push(Entry {
            session: session.clone(),
            handlers,
            dispatching: false,
        });
        Ok(session)
    }

    /// Look a session up. Sessions disappear once terminal and drained.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.entries
            .borrow()
            .iter()
            .find(|e| e.session.id() == id)
            .map(|e| e.session.clone())
    }

    fn require(&self, id: SessionId) -> Result<SessionHandle, SendError> {
        self.get(id).ok_or(SendError::UnknownSession)
    }

    /// Replace the handlers of a session. Takes effect from the next event,
    /// also when called from inside one of that session's handlers.
    ///
    /// # Errors
    ///
    /// `SendError::UnknownSession` if no such session is registered.
    pub fn set_handlers(&self, id: SessionId, handlers: Handlers) -> Result<(), SendError> {
        let mut entries = self.entries.borrow_mut();
        let entry = entries
            .iter_mut()
            .find(|e| e.session.id() == id)
            .ok_or(SendError::UnknownSession)?;
        entry.handlers = Some(handlers);
        Ok(())
    }

    /// Queue a text message on a session.
    ///
    /// # Errors
    ///
    /// `SendError::UnknownSession`, or whatever [`SessionHandle::send`] reports.
    pub fn send(&self, id: SessionId, text: impl Into<String>) -> Result<(), SendError> {
        self.require(id)?.send(text)
    }

    /// Alias of [`send`](Self::send).
    pub fn write(&self, id: SessionId, text: impl Into<String>) -> Result<(), SendError> {
        self.send(id, text)
    }

    pub fn send_binary(&self, id: SessionId, data: impl Into<Vec<u8>>) -> Result<(), SendError> {
        self.require(id)?.send_binary(data)
    }

    /// Graceful close; see [`SessionHandle::close`].
    pub fn close(&self, id: SessionId) -> Result<(), SendError> {
        self.require(id)?.close();
        Ok(())
    }

    /// Immediate close; see [`SessionHandle::close_now`].
    pub fn close_now(&self, id: SessionId) -> Result<(), SendError> {
        self.require(id)?.close_now();
        Ok(())
    }

    /// State of a registered session, `None` once it has been removed.
    #[must_use]
    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.get(id).map(|s| s.state())
    }

    /// Deliver every queued event to the handlers, session by session in
    /// creation order, then drop sessions that are over.
    ///
    /// Returns the number of events delivered. Handlers may call back into
    /// the registry; a session whose handlers are already running further up
    /// the stack is skipped.
    pub fn poll(&self) -> usize {
        let ids: Vec<SessionId> = self
            .entries
            .borrow()
            .iter()
            .filter(|e| !e.dispatching)
            .map(|e| e.session.id())
            .collect();

        let mut delivered = 0;
        for id in ids {
            let Some(mut out) = self.check_out(id) else {
                continue;
            };
            while let Some(event) = out.session.next_event() {
                if let Some(handlers) = out.handlers.as_mut() {
                    handlers.dispatch(&out.session, &event);
                }
                delivered += 1;
            }
        }

        self.entries.borrow_mut().retain(|e| {
            let keep = e.dispatching || !e.session.is_finished();
            if !keep {
                debug!(session = %e.session, "session removed");
            }
            keep
        });
        delivered
    }

    fn check_out(&self, id: SessionId) -> Option<CheckedOut<'_>> {
        let mut entries = self.entries.borrow_mut();
        let entry = entries
            .iter_mut()
            .find(|e| e.session.id() == id && !e.dispatching)?;
        entry.dispatching = true;
        Some(CheckedOut {
            registry: self,
            session: entry.session.clone(),
            handlers: entry.handlers.take(),
        })
    }

    fn check_in(&self, id: SessionId, handlers: Option<Handlers>) {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.iter_mut().find(|e| e.session.id() == id) {
            entry.dispatching = false;
            // Handlers installed during dispatch win.
            if entry.handlers.is_none() {
                entry.handlers = handlers;
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Identifiers of the registered sessions, in creation order.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.entries.borrow().iter().map(|e| e.session.id()).collect()
    }

    /// Force-close every session and stop the owned runtime.
    ///
    /// Undelivered events are dropped; no handler runs.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let entries = std::mem::take(self.entries.get_mut());
        if !entries.is_empty() {
            info!(count = entries.len(), "closing remaining sessions");
        }
        for entry in &entries {
            entry.session.close_now();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(self.config.timeouts.close);
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("owns_runtime", &self.runtime.is_some())
            .finish()
    }
}
