use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::handshake::find_header_end;
use crate::protocol::validation::FrameValidator;
use crate::protocol::{Frame, FrameHeader};

/// Seed for the mask sequence. Falls back to the clock if the OS source fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
            .unwrap_or(0x5bd1_e995)
    }
}

/// Frame-level reader/writer over an async byte stream.
///
/// Reads are cancel-safe: bytes received before a cancelled `read_frame`
/// stay buffered for the next call.
pub struct WebSocketCodec<T> {
    io: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    role: Role,
    config: Config,
    mask_counter: u32,
    validator: FrameValidator,
}

impl<T> WebSocketCodec<T> {
    #[must_use]
    pub fn new(io: T, role: Role, config: Config) -> Self {
        let validator = FrameValidator::new(role, config.limits.clone());
        Self {
            io,
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            write_buf: BytesMut::with_capacity(config.write_buffer_size),
            role,
            config,
            mask_counter: random_mask_seed(),
            validator,
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }

    fn generate_mask(&mut self) -> [u8; 4] {
        self.mask_counter = self.mask_counter.wrapping_add(0x9E37_79B9);
        let a = self.mask_counter;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        let d = c.wrapping_mul(0xC2B2_AE35);
        d.to_le_bytes()
    }

    fn encode_into_write_buf(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.role.must_mask().then(|| self.generate_mask());
        let start = self.write_buf.len();
        self.write_buf.resize(start + frame.wire_size(mask.is_some()), 0);
        frame.write(&mut self.write_buf[start..], mask)?;
        Ok(())
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> WebSocketCodec<T> {
    async fn fill_read_buf(&mut self) -> Result<()> {
        self.read_buf.reserve(self.config.read_buffer_size.max(1024));
        let n = self.io.read_buf(&mut self.read_buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed(None));
        }
        Ok(())
    }

    /// Read one HTTP head (request or response) terminated by an empty line.
    ///
    /// Bytes after the head stay buffered and are decoded as frames.
    ///
    /// # Errors
    ///
    /// - `Error::HandshakeTooLarge` if no terminator appears within the limit
    /// - `Error::ConnectionClosed` / `Error::Io` from the transport
    pub async fn read_http_head(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(end) = find_header_end(&self.read_buf) {
                self.config.limits.check_handshake_size(end)?;
                return Ok(self.read_buf.split_to(end).to_vec());
            }
            self.config.limits.check_handshake_size(self.read_buf.len())?;
            self.fill_read_buf().await?;
        }
    }

    /// Write raw bytes (the HTTP upgrade) and flush.
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.io.write_all(data).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Read and validate the next frame.
    ///
    /// Header checks (masking, RSV bits, size limit) run as soon as the
    /// header is buffered, before the payload is waited for.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match FrameHeader::parse(&self.read_buf) {
                Ok(header) => {
                    self.validator.validate_header(&header)?;
                    match Frame::parse_with_header(&self.read_buf, &header) {
                        Ok((frame, consumed)) => {
                            self.read_buf.advance(consumed);
                            frame.validate()?;
                            return Ok(frame);
                        }
                        Err(Error::IncompleteFrame { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => return Err(e),
            }

            self.fill_read_buf().await?;
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_buf.clear();
        self.encode_into_write_buf(frame)?;
        self.io.write_all(&self.write_buf).await?;
        Ok(())
    }

    /// Write several frames with a single transport write.
    pub async fn write_frames(&mut self, frames: &[Frame]) -> Result<()> {
        self.write_buf.clear();
        for frame in frames {
            self.encode_into_write_buf(frame)?;
        }
        self.io.write_all(&self.write_buf).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write half of the transport.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
