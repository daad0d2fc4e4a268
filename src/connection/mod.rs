//! Message-level connection and the session state machine.
//!
//! [`Connection`] layers message semantics (fragmentation, reassembly,
//! ping replies, the close handshake) over a [`WebSocketCodec`]. The
//! session loop drives it; [`SessionState`] and [`StateCell`] track where a
//! session is in its lifecycle:
//!
//! 1. **Connecting** - transport and upgrade handshake in progress
//! 2. **Open** - messages flow both ways
//! 3. **Closing** - close requested, outbound queue draining
//! 4. **Closed** / **Failed** - terminal
//!
//! ## Example
//!
//! ```rust,ignore
//! use rsws_bridge::{Config, Connection, Message, Role};
//!
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:9001").await?;
//! // ... perform the HTTP upgrade ...
//! let mut conn = Connection::from_io(stream, Role::Client, Config::default());
//! conn.send(Message::text("Hello")).await?;
//! while let Some(msg) = conn.recv().await? {
//!     println!("Received: {:?}", msg);
//! }
//! ```
//!
//! [`WebSocketCodec`]: crate::codec::WebSocketCodec

mod fragmenter;
mod role;
mod state;

pub use fragmenter::MessageFragmenter;
pub use role::Role;
pub use state::{SessionState, StateCell};

#[allow(clippy::module_inception)]
mod connection;

pub use connection::Connection;
