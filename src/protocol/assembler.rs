//! Reassembly of fragmented data messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};

/// Reassembles fragmented WebSocket messages.
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    ///
    /// Returns `Some` once the final fragment arrives. Control frames are
    /// ignored; the caller handles them between fragments.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation with nothing to
    ///   continue, or a new message started mid-fragment
    /// - size and fragment limits from [`Limits`]
    /// - `Error::InvalidUtf8` if a completed text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        if frame.opcode == OpCode::Continuation {
            if self.opcode.is_none() {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
        } else {
            if self.opcode.is_some() {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            self.opcode = Some(frame.opcode);
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().to_vec();
        self.fragment_count = 0;
        match self.opcode.take() {
            Some(OpCode::Text) => {
                let text = String::from_utf8(payload).map_err(|_| Error::InvalidUtf8)?;
                Ok(Some(AssembledMessage::Text(text)))
            }
            Some(OpCode::Binary) => Ok(Some(AssembledMessage::Binary(payload))),
            _ => Err(Error::ProtocolViolation("Unexpected opcode".into())),
        }
    }

    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
    }
}

/// A fully assembled data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembledMessage {
    Text(String),
    Binary(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_limits() -> Limits {
        Limits::new(1024, 100, 3, 4096)
    }

    #[test]
    fn test_single_frame_message() {
        let mut assembler = MessageAssembler::new(Limits::default());
        let msg = assembler.push(Frame::text(b"Hello".to_vec())).unwrap();
        assert_eq!(msg, Some(AssembledMessage::Text("Hello".into())));
        assert!(!assembler.is_assembling());
    }

    #[test]
    fn test_fragmented_with_interleaved_ping() {
        let mut assembler = MessageAssembler::new(Limits::default());

        let first = Frame::new(false, OpCode::Text, b"Hel".to_vec());
        assert!(assembler.push(first).unwrap().is_none());
        assert!(assembler.is_assembling());

        assert!(assembler.push(Frame::ping(b"ping".to_vec())).unwrap().is_none());
        assert!(assembler.is_assembling());

        let last = Frame::new(true, OpCode::Continuation, b"lo".to_vec());
        assert_eq!(
            assembler.push(last).unwrap(),
            Some(AssembledMessage::Text("Hello".into()))
        );
    }

    #[test]
    fn test_binary_fragments() {
        let mut assembler = MessageAssembler::new(Limits::default());
        assembler.push(Frame::new(false, OpCode::Binary, vec![1, 2])).unwrap();
        assembler.push(Frame::new(false, OpCode::Continuation, vec![3, 4])).unwrap();
        let msg = assembler
            .push(Frame::new(true, OpCode::Continuation, vec![5]))
            .unwrap();
        assert_eq!(msg, Some(AssembledMessage::Binary(vec![1, 2, 3, 4, 5])));
    }

    #[test]
    fn test_utf8_split_across_fragments() {
        let mut assembler = MessageAssembler::new(Limits::default());
        assembler.push(Frame::new(false, OpCode::Text, vec![0xf0, 0x9f])).unwrap();
        let msg = assembler
            .push(Frame::new(true, OpCode::Continuation, vec![0x8e, 0x89]))
            .unwrap();
        assert_eq!(msg, Some(AssembledMessage::Text("\u{1F389}".into())));
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let mut assembler = MessageAssembler::new(Limits::default());
        let result = assembler.push(Frame::new(true, OpCode::Text, vec![0x80, 0x81]));
        assert!(matches!(result, Err(Error::InvalidUtf8)));
    }

    #[test]
    fn test_limits_enforced() {
        let mut assembler = MessageAssembler::new(small_limits());
        assert!(matches!(
            assembler.push(Frame::text(vec![b'a'; 150])),
            Err(Error::MessageTooLarge { .. })
        ));

        let mut assembler = MessageAssembler::new(small_limits());
        assembler.push(Frame::new(false, OpCode::Binary, vec![1])).unwrap();
        assembler.push(Frame::new(false, OpCode::Continuation, vec![2])).unwrap();
        assembler.push(Frame::new(false, OpCode::Continuation, vec![3])).unwrap();
        assert!(matches!(
            assembler.push(Frame::new(true, OpCode::Continuation, vec![4])),
            Err(Error::TooManyFragments { .. })
        ));
    }

    #[test]
    fn test_sequence_violations() {
        let mut assembler = MessageAssembler::new(Limits::default());
        assert!(matches!(
            assembler.push(Frame::new(true, OpCode::Continuation, b"x".to_vec())),
            Err(Error::ProtocolViolation(_))
        ));

        assembler.push(Frame::new(false, OpCode::Text, b"first".to_vec())).unwrap();
        assert!(matches!(
            assembler.push(Frame::text(b"second".to_vec())),
            Err(Error::ProtocolViolation(_))
        ));

        assembler.reset();
        assert!(assembler.push(Frame::text(b"fresh".to_vec())).unwrap().is_some());
    }
}
