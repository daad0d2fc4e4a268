//! Byte transport under the codec: plain TCP or rustls over TCP.
//!
//! [`open`] performs the whole opening sequence for a session: TCP connect,
//! optional TLS negotiation, and the HTTP upgrade.

mod target;
#[cfg(feature = "tls-rustls")]
pub mod tls;

pub use target::Target;

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::codec::WebSocketCodec;
use crate::config::Config;
use crate::connection::{Connection, Role};
use crate::error::ConnectError;
use crate::protocol::{ClientRequest, HandshakeResponse};

/// A client stream, with or without TLS.
pub enum MaybeTlsStream {
    Plain(TcpStream),
    #[cfg(feature = "tls-rustls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(feature = "tls-rustls")]
async fn wrap_tls(
    target: &Target,
    config: &Config,
    tcp: TcpStream,
) -> Result<MaybeTlsStream, ConnectError> {
    let client_config = match config.tls {
        Some(ref custom) => custom.clone(),
        None => tls::client_config_with_webpki_roots()
            .map_err(|e| ConnectError::Tls(e.to_string()))?,
    };
    let stream = tls::TlsConnector::new(client_config)
        .connect(&target.host, tcp)
        .await
        .map_err(|e| ConnectError::Tls(e.to_string()))?;
    Ok(MaybeTlsStream::Tls(Box::new(stream)))
}

#[cfg(not(feature = "tls-rustls"))]
async fn wrap_tls(
    _target: &Target,
    _config: &Config,
    _tcp: TcpStream,
) -> Result<MaybeTlsStream, ConnectError> {
    Err(ConnectError::TlsUnavailable)
}

/// Resolve, connect with `TCP_NODELAY`, and negotiate TLS for `wss`.
pub async fn connect(target: &Target, config: &Config) -> Result<MaybeTlsStream, ConnectError> {
    let tcp = TcpStream::connect((target.host.as_str(), target.port)).await?;
    tcp.set_nodelay(true)?;

    if target.tls {
        wrap_tls(target, config, tcp).await
    } else {
        Ok(MaybeTlsStream::Plain(tcp))
    }
}

/// Run the client side of the HTTP upgrade on a connected stream.
///
/// Any frame bytes the server sent right behind its response stay buffered
/// in the returned connection.
pub async fn upgrade<T>(
    io: T,
    target: &Target,
    config: &Config,
) -> Result<Connection<T>, ConnectError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = WebSocketCodec::new(io, Role::Client, config.clone());

    let request = ClientRequest::new(target.resource.clone(), target.host_header.clone())?;
    let mut buf = Vec::with_capacity(256);
    request.write(&mut buf)?;
    codec.write_raw(&buf).await?;

    let head = codec.read_http_head().await?;
    HandshakeResponse::parse(&head)?.verify(&request)?;

    Ok(Connection::new(codec))
}

/// Connect and upgrade: everything between `connect(url)` and `Open`.
pub async fn open(
    target: &Target,
    config: &Config,
) -> Result<Connection<MaybeTlsStream>, ConnectError> {
    let stream = connect(target, config).await?;
    upgrade(stream, target, config).await
}
