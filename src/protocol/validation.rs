//! Header checks applied before a frame's payload is buffered.
//!
//! - Masking rules per RFC 6455 Section 5.1
//! - RSV bits (no extensions are negotiated)
//! - Frame size limits

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::FrameHeader;

/// Frame validator for incoming WebSocket frames.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    role: Role,
    limits: Limits,
}

impl FrameValidator {
    pub fn new(role: Role, limits: Limits) -> Self {
        Self { role, limits }
    }

    /// Validate the header of an incoming frame.
    ///
    /// # Errors
    ///
    /// - `Error::UnmaskedClientFrame` - Server received unmasked frame from client
    /// - `Error::MaskedServerFrame` - Client received masked frame from server
    /// - `Error::ReservedBitsSet` - RSV bits set without negotiated extension
    /// - `Error::FrameTooLarge` - Frame exceeds size limit
    pub fn validate_header(&self, header: &FrameHeader) -> Result<()> {
        let masked = header.mask.is_some();
        if self.role.expects_masked() && !masked {
            return Err(Error::UnmaskedClientFrame);
        }
        if !self.role.expects_masked() && masked {
            return Err(Error::MaskedServerFrame);
        }

        if header.rsv1 || header.rsv2 || header.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        self.limits.check_frame_size(header.payload_len)
    }
}
