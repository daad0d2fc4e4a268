//! WebSocket test peer.
//!
//! Accepts any number of connections on a random loopback port and runs the
//! configured [`Behavior`] on each. Everything the client sends is recorded
//! in arrival order, close frames included.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rsws_bridge::protocol::Frame;
use rsws_bridge::{
    CloseCode, CloseFrame, Config, Connection, Error, HandshakeRequest, HandshakeResponse,
    Message, OpCode, Role, WebSocketCodec,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

/// What the peer does after the upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Echo data messages and answer close frames.
    Echo,
    /// Record everything, reply to nothing, never answer a close.
    Silent,
    /// Send a ping first, then echo.
    Pinging,
    /// Start the closing handshake right away.
    Closing(u16, &'static str),
    /// Send a frame with RSV1 set, then record what comes back.
    Malformed,
    /// Send "fragmented" split over three frames, then echo.
    Fragmented,
    /// Complete the upgrade, then never read again.
    Stalled,
}

impl Behavior {
    fn echoes(self) -> bool {
        matches!(self, Behavior::Echo | Behavior::Pinging | Behavior::Fragmented)
    }
}

#[derive(Default)]
struct PeerLog {
    received: Mutex<Vec<Message>>,
    pongs: AtomicUsize,
    connections: AtomicUsize,
}

impl PeerLog {
    fn push(&self, message: Message) {
        self.received
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message);
    }
}

pub struct TestServer {
    addr: SocketAddr,
    scheme: &'static str,
    cert_pem: Option<String>,
    log: Arc<PeerLog>,
    runtime: Runtime,
}

impl TestServer {
    /// Start a plain `ws://` peer.
    pub fn start(behavior: Behavior) -> Self {
        let runtime = peer_runtime();
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("bind test listener");
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(PeerLog::default());

        let accept_log = log.clone();
        runtime.spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                stream.set_nodelay(true).ok();
                accept_log.connections.fetch_add(1, Ordering::SeqCst);
                let log = accept_log.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, behavior, log).await;
                });
            }
        });

        Self {
            addr,
            scheme: "ws",
            cert_pem: None,
            log,
            runtime,
        }
    }

    /// Start a `wss://` peer with a fresh self-signed certificate for
    /// `localhost`. Returns the client configuration that trusts it.
    #[cfg(feature = "tls-rustls")]
    pub fn start_tls(behavior: Behavior) -> (Self, Arc<rustls::ClientConfig>) {
        use rcgen::{CertifiedKey, generate_simple_self_signed};
        use rustls::pki_types::{CertificateDer, PrivateKeyDer};

        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_pem = cert.pem();
        let cert_der = CertificateDer::from(cert.der().to_vec());
        let key_der = PrivateKeyDer::Pkcs8(key_pair.serialize_der().into());

        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der.clone()], key_der)
            .unwrap();
        let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(server_config));
        let client_config = rsws_bridge::tls::client_config_with_roots([cert_der]).unwrap();

        let runtime = peer_runtime();
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("bind test listener");
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(PeerLog::default());

        let accept_log = log.clone();
        runtime.spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_log.connections.fetch_add(1, Ordering::SeqCst);
                let log = accept_log.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Ok(tls) = acceptor.accept(stream).await {
                        let _ = serve(tls, behavior, log).await;
                    }
                });
            }
        });

        let server = Self {
            addr,
            scheme: "wss",
            cert_pem: Some(cert_pem),
            log,
            runtime,
        };
        (server, client_config)
    }

    /// URL for this peer. TLS peers are addressed as `localhost` so the
    /// certificate name matches.
    pub fn url(&self) -> String {
        match self.scheme {
            "wss" => format!("wss://localhost:{}/", self.addr.port()),
            _ => format!("ws://{}/", self.addr),
        }
    }

    /// PEM of the certificate a TLS peer presents.
    pub fn cert_pem(&self) -> Option<&str> {
        self.cert_pem.as_deref()
    }

    pub fn received(&self) -> Vec<Message> {
        self.log
            .received
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn pongs(&self) -> usize {
        self.log.pongs.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.log.connections.load(Ordering::SeqCst)
    }

    /// Wait until `done` holds for the recorded messages.
    pub fn wait_for(&self, done: impl Fn(&[Message]) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if done(&self.received()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

fn peer_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("test-peer")
        .enable_all()
        .build()
        .expect("test peer runtime")
}

async fn serve<S>(stream: S, behavior: Behavior, log: Arc<PeerLog>) -> rsws_bridge::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = WebSocketCodec::new(stream, Role::Server, Config::default());
    let head = codec.read_http_head().await?;
    let request = HandshakeRequest::parse(&head)?;
    request.validate()?;
    let mut response = Vec::new();
    HandshakeResponse::from_request(&request).write(&mut response)?;
    codec.write_raw(&response).await?;

    match behavior {
        Behavior::Malformed => codec.write_raw(&[0xC1, 0x00]).await?,
        Behavior::Pinging => {
            codec.write_frame(&Frame::ping(b"hb".to_vec())).await?;
            codec.flush().await?;
        }
        Behavior::Fragmented => {
            codec
                .write_frames(&[
                    Frame::new(false, OpCode::Text, b"frag".to_vec()),
                    Frame::new(false, OpCode::Continuation, b"ment".to_vec()),
                    Frame::new(true, OpCode::Continuation, b"ed".to_vec()),
                ])
                .await?;
            codec.flush().await?;
        }
        // The codec stays alive, so the socket stays open with full buffers.
        Behavior::Stalled => std::future::pending::<()>().await,
        _ => {}
    }

    let mut conn = Connection::new(codec);
    if let Behavior::Closing(code, reason) = behavior {
        conn.close(CloseCode::from_u16(code), reason).await?;
    }

    loop {
        let frame = match conn.read_frame().await {
            Ok(frame) => frame,
            Err(Error::ConnectionClosed(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        match frame.opcode {
            OpCode::Close => {
                log.push(Message::Close(CloseFrame::from_payload(frame.payload())));
                if behavior == Behavior::Silent {
                    continue;
                }
                conn.handle_frame(frame).await?;
                return Ok(());
            }
            OpCode::Pong => {
                log.pongs.fetch_add(1, Ordering::SeqCst);
                continue;
            }
            _ => {}
        }

        if let Some(message) = conn.handle_frame(frame).await? {
            if matches!(message, Message::Text(_) | Message::Binary(_)) {
                log.push(message.clone());
                if behavior.echoes() {
                    conn.send(message).await?;
                }
            }
        }
    }
}
