//! # rsws-bridge - WebSocket sessions for single-threaded hosts
//!
//! `rsws-bridge` runs RFC 6455 client connections on background tokio tasks
//! and hands their events to a host thread that must never block on the
//! network, such as the main loop of an embedded scripting engine.
//!
//! ## Features
//!
//! - **Non-blocking host API**: `connect`, `send`, `close` and `close_now`
//!   return immediately
//! - **Ordered events**: connect, message, error and disconnect are delivered
//!   in arrival order by [`SessionRegistry::poll`]
//! - **Graceful close**: queued messages are flushed before the close frame
//! - **Strict framing**: masking, fragmentation, UTF-8 and size limits
//! - **TLS** for `wss://` via rustls (feature `tls-rustls`, on by default)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rsws_bridge::{Config, Handlers, SessionRegistry};
//!
//! let registry = SessionRegistry::new(Config::default())?;
//! registry.connect_with(
//!     "wss://echo.example/",
//!     Handlers::new()
//!         .on_connect(|session| {
//!             let _ = session.send("ping");
//!         })
//!         .on_message(|session, text| {
//!             println!("{session}: {text}");
//!             session.close();
//!         }),
//! )?;
//!
//! // Once per host tick:
//! registry.poll();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bridge;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

pub use bridge::Handlers;
pub use codec::WebSocketCodec;
pub use config::{Config, Limits, Timeouts};
pub use connection::{Connection, Role, SessionState};
pub use error::{ConnectError, Error, Result, SendError};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{HandshakeRequest, HandshakeResponse, OpCode, WS_GUID, compute_accept_key};
pub use registry::SessionRegistry;
pub use session::{CLOSED_BY_USER, SessionEvent, SessionHandle, SessionId};
pub use transport::Target;

#[cfg(feature = "tls-rustls")]
pub use transport::tls;
