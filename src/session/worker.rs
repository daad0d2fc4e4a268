//! The background loop behind a [`SessionHandle`](super::SessionHandle).
//!
//! The loop owns the transport exclusively. It talks to the host only
//! through the shared state cell and the two queues in [`Shared`].

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, error, info, trace, warn};

use super::{SessionEvent, Shared};
use crate::config::Config;
use crate::connection::{Connection, SessionState};
use crate::error::{ConnectError, Error, Result};
use crate::message::{CloseCode, Message};
use crate::protocol::Frame;
use crate::transport::{self, Target};

/// Disconnect reason after a close we started was acknowledged.
const CLOSED_GRACEFULLY: &str = "connection closed";
/// Disconnect reason when the peer never answered our close frame.
const CLOSE_TIMED_OUT: &str = "close handshake timed out";

/// How the read/write loop ended without an error.
enum Exit {
    /// `close_now` already reported; just drop the transport.
    Killed,
    /// Closing handshake done (or given up on); report with this reason.
    Closed(String),
}

enum Wake {
    Frame(Result<Frame>),
    Outbound,
    Killed,
}

/// Connect, upgrade, and serve the session until it reaches a terminal state.
pub(crate) async fn run(shared: Arc<Shared>, target: Target, config: Config) {
    debug!(url = %shared.url, "connecting");

    let limit = config.timeouts.handshake;
    let opened = tokio::select! {
        biased;
        _ = shared.kill.notified() => {
            debug!("closed before the handshake completed");
            return;
        }
        result = timeout(limit, transport::open(&target, &config)) => {
            result.unwrap_or(Err(ConnectError::Timeout(limit)))
        }
    };

    let conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            warn!(error = %err, "connect failed");
            let message = err.to_string();
            shared.terminate(SessionState::Failed, Some(message.clone()), message);
            return;
        }
    };

    if shared
        .outbound
        .transition(&shared.state, SessionState::Open)
        .is_none()
        && shared.state.get().is_terminal()
    {
        return;
    }
    // A `close()` issued while connecting leaves us in `Closing`; the host
    // still sees `Connected` before the graceful close runs.
    shared.events.push(SessionEvent::Connected);
    info!(url = %shared.url, "connected");

    serve(shared, conn, config).await;
}

/// Drive an upgraded connection to the end of the session.
pub(crate) async fn serve<T>(shared: Arc<Shared>, mut conn: Connection<T>, config: Config)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match drive(&shared, &mut conn, &config).await {
        Ok(Exit::Killed) => debug!("transport dropped"),
        Ok(Exit::Closed(reason)) => {
            if shared.terminate(SessionState::Closed, None, reason.clone()) {
                info!(%reason, "disconnected");
            }
            let _ = timeout(config.timeouts.close, conn.shutdown()).await;
        }
        Err(err) => fail(&shared, &mut conn, &config, err).await,
    }
}

/// Wait for the session loop and turn a panic into a failed session.
pub(crate) async fn supervise(shared: Arc<Shared>, task: JoinHandle<()>) {
    let Err(err) = task.await else {
        return;
    };
    if err.is_panic() {
        error!("session loop panicked");
        shared.terminate(
            SessionState::Failed,
            Some("session loop panicked".to_string()),
            "internal error".to_string(),
        );
    } else {
        shared.terminate(
            SessionState::Failed,
            Some("session loop cancelled".to_string()),
            "runtime shut down".to_string(),
        );
    }
}

/// Outcome of a step raced by a [`Guard`].
enum Guarded<R> {
    Done(R),
    Killed,
    TimedOut,
}

/// Races the loop's writes against `close_now` and, once a graceful close
/// has begun, against the close grace period.
///
/// A peer that stops reading blocks writes indefinitely, so no write is
/// awaited outside a guard.
struct Guard<'a> {
    shared: &'a Shared,
    grace: Duration,
    close_by: Option<Instant>,
}

impl<'a> Guard<'a> {
    fn new(shared: &'a Shared, grace: Duration) -> Self {
        Self {
            shared,
            grace,
            close_by: None,
        }
    }

    /// Start the grace period if the session is closing. The deadline is
    /// fixed at the first call that sees `Closing`.
    fn observe_state(&mut self) {
        if self.close_by.is_none() && self.shared.state.get() == SessionState::Closing {
            self.close_by = Some(Instant::now() + self.grace);
        }
    }

    async fn run<F: Future>(&mut self, step: F) -> Guarded<F::Output> {
        tokio::pin!(step);
        let mut rewake = false;
        loop {
            if self.shared.state.get().is_terminal() {
                return Guarded::Killed;
            }
            self.observe_state();
            let close_by = self.close_by;
            let expired = async move {
                match close_by {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = self.shared.kill.notified() => return Guarded::Killed,
                out = &mut step => {
                    // Hand back a wake-up taken from a send, so the message
                    // it announced is flushed on the next pass.
                    if rewake {
                        self.shared.outbound.wake();
                    }
                    return Guarded::Done(out);
                }
                _ = expired => return Guarded::TimedOut,
                // `close()` wakes the loop; re-check the state so a stuck
                // write becomes bounded by the grace period.
                _ = self.shared.outbound.notified(), if close_by.is_none() => rewake = true,
            }
        }
    }
}

/// Await a step through a guard, leaving the enclosing loop function when
/// `close_now` fires or the close grace period runs out.
macro_rules! guarded {
    ($guard:expr, $step:expr) => {
        match $guard.run($step).await {
            Guarded::Done(out) => out,
            Guarded::Killed => return Ok(Exit::Killed),
            Guarded::TimedOut => {
                warn!("close grace period expired");
                return Ok(Exit::Closed(CLOSE_TIMED_OUT.to_string()));
            }
        }
    };
}

async fn drive<T>(shared: &Shared, conn: &mut Connection<T>, config: &Config) -> Result<Exit>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut guard = Guard::new(shared, config.timeouts.close);
    loop {
        match shared.state.get() {
            state if state.is_terminal() => return Ok(Exit::Killed),
            SessionState::Closing => return close_gracefully(shared, conn, &mut guard).await,
            _ => {}
        }

        guarded!(guard, flush_outbound(shared, conn))?;

        let wake = tokio::select! {
            biased;
            _ = shared.kill.notified() => Wake::Killed,
            frame = conn.read_frame() => Wake::Frame(frame),
            _ = shared.outbound.notified() => Wake::Outbound,
        };

        match wake {
            Wake::Killed => return Ok(Exit::Killed),
            Wake::Outbound => {}
            Wake::Frame(frame) => {
                let frame = frame?;
                if let Some(reason) = guarded!(guard, deliver(shared, conn, frame))? {
                    return Ok(Exit::Closed(reason));
                }
            }
        }
    }
}

/// Write everything queued so far, in order, as one batch.
async fn flush_outbound<T>(shared: &Shared, conn: &mut Connection<T>) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let pending = shared.outbound.drain();
    if pending.is_empty() {
        return Ok(());
    }
    trace!(count = pending.len(), "writing queued messages");
    conn.send_batch(pending).await
}

/// Handle one inbound frame. Returns the disconnect reason once the peer's
/// close frame has been seen.
async fn deliver<T>(shared: &Shared, conn: &mut Connection<T>, frame: Frame) -> Result<Option<String>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match conn.handle_frame(frame).await? {
        Some(Message::Text(text)) => {
            shared.events.push(SessionEvent::Message(text));
        }
        Some(Message::Binary(data)) => {
            shared.events.push(SessionEvent::Binary(data));
        }
        Some(Message::Close(close)) => {
            let reason = close.map_or_else(|| "closed by peer".to_string(), |cf| cf.describe());
            debug!(%reason, "peer sent close");
            return Ok(Some(reason));
        }
        Some(Message::Ping(_)) => trace!("answered ping"),
        Some(Message::Pong(_)) | None => {}
    }
    Ok(None)
}

/// Flush, send our close frame, and wait for the peer's answer. All of it
/// shares one grace period, counted from when the close was requested.
async fn close_gracefully<T>(
    shared: &Shared,
    conn: &mut Connection<T>,
    guard: &mut Guard<'_>,
) -> Result<Exit>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    guard.observe_state();

    guarded!(guard, flush_outbound(shared, conn))?;
    guarded!(guard, conn.close(CloseCode::Normal, ""))?;
    debug!(grace = ?guard.grace, "close frame sent");

    loop {
        match guarded!(guard, conn.read_frame()) {
            Ok(frame) => {
                if guarded!(guard, deliver(shared, conn, frame))?.is_some() {
                    return Ok(Exit::Closed(CLOSED_GRACEFULLY.to_string()));
                }
            }
            // EOF is an acceptable answer to our close.
            Err(Error::ConnectionClosed(_)) => {
                return Ok(Exit::Closed(CLOSED_GRACEFULLY.to_string()));
            }
            Err(err) => return Err(err),
        }
    }
}

/// Tell the peer why (when the error is theirs) and report the failure.
async fn fail<T>(shared: &Shared, conn: &mut Connection<T>, config: &Config, err: Error)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(code) = err.close_code() {
        let _ = timeout(config.timeouts.close, conn.close(code, &err.to_string())).await;
    }

    let (message, reason) = match err {
        Error::ConnectionClosed(_) => (
            "connection closed without a close frame".to_string(),
            "connection lost",
        ),
        ref other if other.is_transport() => (other.to_string(), "connection lost"),
        other => (other.to_string(), "protocol error"),
    };

    warn!(error = %message, "session failed");
    shared.terminate(SessionState::Failed, Some(message), reason.to_string());
}
