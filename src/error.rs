//! Error types for WebSocket sessions.
//!
//! Three families of errors exist:
//!
//! - [`Error`]: protocol and transport failures raised by the codec inside a
//!   session's background loop. These never reach the caller of `send`; they
//!   are surfaced as `Error` events.
//! - [`ConnectError`]: returned synchronously by `connect` for bad URLs, and
//!   rendered into events when the background handshake fails.
//! - [`SendError`]: returned synchronously by `send`/`write`.

use thiserror::Error;

use crate::connection::SessionState;
use crate::message::CloseCode;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol and transport errors raised while framing or moving bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in text frame.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Payload length does not fit in this platform's `usize`.
    #[error("Payload too large for platform: {size} bytes (max: {max})")]
    PayloadTooLargeForPlatform {
        /// Declared payload length.
        size: u64,
        /// Largest representable length.
        max: u64,
    },

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake data exceeds configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Actual handshake size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Header value would corrupt the HTTP message.
    #[error("Invalid value for header {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Unmasked client frame (security violation).
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),
}

impl Error {
    /// Returns `true` if the error came from the transport rather than from
    /// the peer violating the protocol.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_) | Error::ConnectionClosed(_))
    }

    /// Close code to send when failing the connection because of this error.
    ///
    /// Transport errors return `None`: there is nobody left to tell.
    #[must_use]
    pub const fn close_code(&self) -> Option<CloseCode> {
        match self {
            Error::Io(_) | Error::ConnectionClosed(_) => None,
            Error::InvalidUtf8 => Some(CloseCode::InvalidPayload),
            Error::FrameTooLarge { .. }
            | Error::MessageTooLarge { .. }
            | Error::TooManyFragments { .. }
            | Error::PayloadTooLargeForPlatform { .. } => Some(CloseCode::MessageTooBig),
            _ => Some(CloseCode::ProtocolError),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

/// Failure to establish a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectError {
    /// The URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Only `ws` and `wss` are accepted.
    #[error("unsupported scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),

    /// The URL has no host component.
    #[error("url has no host")]
    MissingHost,

    /// `wss://` requested but the crate was built without TLS support.
    #[error("wss requires the tls-rustls feature")]
    TlsUnavailable,

    /// TCP connect or DNS resolution failed.
    #[error("connection failed: {0}")]
    Io(String),

    /// TLS negotiation failed.
    #[error("tls handshake failed: {0}")]
    Tls(String),

    /// The HTTP upgrade was rejected or malformed.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// The handshake did not complete in time.
    #[error("handshake timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<std::io::Error> for ConnectError {
    fn from(err: std::io::Error) -> Self {
        ConnectError::Io(err.to_string())
    }
}

impl From<Error> for ConnectError {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(msg) => ConnectError::Io(msg),
            other => ConnectError::Handshake(other.to_string()),
        }
    }
}

/// Failure to queue an outgoing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SendError {
    /// The session is not accepting sends in its current state.
    #[error("session is not open (state: {0})")]
    NotOpen(SessionState),

    /// The bounded outbound queue is full.
    #[error("outbound queue full (capacity: {capacity})")]
    QueueFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// No session with that identifier is registered.
    #[error("unknown session")]
    UnknownSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FrameTooLarge {
            size: 20_000_000,
            max: 16_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Frame too large: 20000000 bytes (max: 16000000)"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let ws_err: Error = io_err.into();
        assert!(matches!(ws_err, Error::Io(_)));
        assert!(ws_err.is_transport());
    }

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(Error::InvalidUtf8.close_code(), Some(CloseCode::InvalidPayload));
        assert_eq!(
            Error::MessageTooLarge { size: 2, max: 1 }.close_code(),
            Some(CloseCode::MessageTooBig)
        );
        assert_eq!(
            Error::ReservedOpcode(0x3).close_code(),
            Some(CloseCode::ProtocolError)
        );
        assert_eq!(Error::Io("reset".into()).close_code(), None);
    }

    #[test]
    fn test_connect_error_from_codec_error() {
        let err: ConnectError = Error::InvalidHandshake("bad accept".into()).into();
        assert!(matches!(err, ConnectError::Handshake(_)));

        let err: ConnectError = Error::Io("refused".into()).into();
        assert_eq!(err, ConnectError::Io("refused".into()));
    }

    #[test]
    fn test_send_error_display() {
        let err = SendError::NotOpen(SessionState::Closing);
        assert_eq!(err.to_string(), "session is not open (state: Closing)");

        let err = SendError::QueueFull { capacity: 4 };
        assert_eq!(err.to_string(), "outbound queue full (capacity: 4)");
    }
}
