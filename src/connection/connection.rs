use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::WebSocketCodec;
use crate::config::Config;
use crate::connection::Role;
use crate::connection::fragmenter::MessageFragmenter;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::assembler::{AssembledMessage, MessageAssembler};
use crate::protocol::{Frame, OpCode};

/// Longest close reason that fits a control frame next to the status code.
const MAX_CLOSE_REASON: usize = 123;

/// Status codes a peer may legitimately put on the wire (RFC 6455 Section 7.4).
fn is_valid_wire_code(code: u16) -> bool {
    matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// Message-level view of a WebSocket stream.
///
/// Reading is split in two so a caller can race reads against other events:
/// [`read_frame`](Self::read_frame) is cancel-safe and only buffers, while
/// [`handle_frame`](Self::handle_frame) may write (pong, close reply) and
/// must run to completion.
pub struct Connection<T> {
    codec: WebSocketCodec<T>,
    assembler: MessageAssembler,
    close_sent: bool,
    close_received: bool,
}

impl<T> Connection<T> {
    /// Wrap a codec whose opening handshake has already completed.
    pub fn new(codec: WebSocketCodec<T>) -> Self {
        let assembler = MessageAssembler::new(codec.config().limits.clone());
        Self {
            codec,
            assembler,
            close_sent: false,
            close_received: false,
        }
    }

    /// Wrap a raw stream that is already past the HTTP upgrade.
    pub fn from_io(io: T, role: Role, config: Config) -> Self {
        Self::new(WebSocketCodec::new(io, role, config))
    }

    /// `true` once our close frame has been written.
    pub fn close_sent(&self) -> bool {
        self.close_sent
    }

    /// `true` once the peer's close frame has been read.
    pub fn close_received(&self) -> bool {
        self.close_received
    }

    pub fn into_inner(self) -> T {
        self.codec.into_inner()
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Read the next validated frame. Cancel-safe.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        self.codec.read_frame().await
    }

    /// Apply protocol handling to a frame returned by [`read_frame`](Self::read_frame).
    ///
    /// - Ping: a pong is written, and the ping is returned
    /// - Close: the peer's close is echoed unless we already sent one
    /// - Data: fed to the assembler; `None` until a message completes
    ///
    /// ## Errors
    ///
    /// Protocol violations (bad fragment sequence, invalid UTF-8, invalid
    /// close code, limits) and I/O errors from the reply writes.
    pub async fn handle_frame(&mut self, frame: Frame) -> Result<Option<Message>> {
        match frame.opcode {
            OpCode::Ping => {
                let payload = frame.into_payload();
                if !self.close_sent {
                    self.codec.write_frame(&Frame::pong(payload.clone())).await?;
                    self.codec.flush().await?;
                }
                Ok(Some(Message::Ping(payload)))
            }
            OpCode::Pong => Ok(Some(Message::Pong(frame.into_payload()))),
            OpCode::Close => {
                let close_frame = CloseFrame::from_payload(frame.payload());
                if let Some(ref cf) = close_frame {
                    let code = cf.code.as_u16();
                    if frame.payload().len() >= 2 && !is_valid_wire_code(code) {
                        return Err(Error::InvalidCloseCode(code));
                    }
                }
                self.close_received = true;

                if !self.close_sent {
                    let reply = match close_frame {
                        Some(ref cf) => Frame::close(Some(cf.code.as_u16()), ""),
                        None => Frame::close(None, ""),
                    };
                    self.close_sent = true;
                    self.codec.write_frame(&reply).await?;
                    self.codec.flush().await?;
                }
                Ok(Some(Message::Close(close_frame)))
            }
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                Ok(self.assembler.push(frame)?.map(|assembled| match assembled {
                    AssembledMessage::Text(text) => Message::Text(text),
                    AssembledMessage::Binary(data) => Message::Binary(data),
                }))
            }
        }
    }

    /// Receive the next message, answering pings along the way.
    ///
    /// Returns `Ok(None)` at end of stream or after the peer's close frame.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if self.close_received {
            return Ok(None);
        }
        loop {
            let frame = match self.read_frame().await {
                Ok(frame) => frame,
                Err(Error::ConnectionClosed(_)) => return Ok(None),
                Err(e) => return Err(e),
            };
            if let Some(message) = self.handle_frame(frame).await? {
                return Ok(Some(message));
            }
        }
    }

    fn encode(&self, message: Message, frames: &mut Vec<Frame>) -> Result<()> {
        let fragment_size = self.codec.config().fragment_size;
        let (opcode, payload) = match message {
            Message::Text(text) => (OpCode::Text, text.into_bytes()),
            Message::Binary(data) => (OpCode::Binary, data),
            Message::Ping(data) => {
                frames.push(Frame::ping(data));
                return Ok(());
            }
            Message::Pong(data) => {
                frames.push(Frame::pong(data));
                return Ok(());
            }
            Message::Close(close) => {
                frames.push(match close {
                    Some(cf) => Frame::close(Some(cf.code.as_u16()), truncate_reason(&cf.reason)),
                    None => Frame::close(None, ""),
                });
                return Ok(());
            }
        };

        self.codec.config().limits.check_message_size(payload.len())?;
        if payload.len() <= fragment_size {
            frames.push(Frame::new(true, opcode, payload));
        } else {
            frames.extend(MessageFragmenter::new(&payload, opcode, fragment_size));
        }
        Ok(())
    }

    /// Send a message, fragmenting data payloads above the configured size.
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed` once a close frame has been sent
    /// - `Error::MessageTooLarge` above `limits.max_message_size`
    /// - I/O errors from the underlying stream
    pub async fn send(&mut self, message: Message) -> Result<()> {
        self.send_batch(std::iter::once(message)).await
    }

    /// Send several messages in order with a single write and flush.
    pub async fn send_batch(&mut self, messages: impl IntoIterator<Item = Message>) -> Result<()> {
        if self.close_sent {
            return Err(Error::ConnectionClosed(None));
        }
        let mut frames = Vec::new();
        for message in messages {
            if matches!(message, Message::Close(_)) {
                return Err(Error::ProtocolViolation(
                    "close frames go through close()".into(),
                ));
            }
            self.encode(message, &mut frames)?;
        }
        if frames.is_empty() {
            return Ok(());
        }
        self.codec.write_frames(&frames).await?;
        self.codec.flush().await
    }

    /// Start the closing handshake. A no-op if a close frame was already sent.
    ///
    /// ## Errors
    ///
    /// `Error::InvalidCloseCode` for codes that must not appear on the wire.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if self.close_sent {
            return Ok(());
        }
        if code.is_reserved() {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }
        self.close_sent = true;
        self.codec
            .write_frame(&Frame::close(Some(code.as_u16()), truncate_reason(reason)))
            .await?;
        self.codec.flush().await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.codec.flush().await
    }

    /// Shut down the transport's write half.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.codec.shutdown().await
    }
}
