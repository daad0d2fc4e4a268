//! Splitting outgoing data messages into frames (RFC 6455 Section 5.4).

use std::iter::Peekable;
use std::slice::Chunks;

use crate::protocol::{Frame, OpCode};

/// Iterator over the frames of one data message.
///
/// The first frame carries the message opcode; the rest are continuations.
/// An empty payload still yields a single final frame.
pub struct MessageFragmenter<'a> {
    chunks: Peekable<Chunks<'a, u8>>,
    opcode: OpCode,
    started: bool,
}

impl<'a> MessageFragmenter<'a> {
    #[must_use]
    pub fn new(payload: &'a [u8], opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            chunks: payload.chunks(fragment_size.max(1)).peekable(),
            opcode,
            started: false,
        }
    }
}

impl Iterator for MessageFragmenter<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        let opcode = if self.started {
            OpCode::Continuation
        } else {
            self.opcode
        };

        match self.chunks.next() {
            Some(chunk) => {
                self.started = true;
                let fin = self.chunks.peek().is_none();
                Some(Frame::new(fin, opcode, chunk.to_vec()))
            }
            None if !self.started => {
                self.started = true;
                Some(Frame::new(true, opcode, Vec::new()))
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let frames: Vec<_> = MessageFragmenter::new(b"Hello", OpCode::Text, 1024).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Text);
        assert_eq!(frames[0].payload(), b"Hello");
    }

    #[test]
    fn test_uneven_split() {
        let payload = vec![0xCD; 25];
        let frames: Vec<_> = MessageFragmenter::new(&payload, OpCode::Binary, 10).collect();

        let sizes: Vec<_> = frames.iter().map(|f| f.payload().len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(frames[0].opcode, OpCode::Binary);
        assert!(frames[1..].iter().all(|f| f.opcode == OpCode::Continuation));
        assert_eq!(
            frames.iter().map(|f| f.fin).collect::<Vec<_>>(),
            vec![false, false, true]
        );
    }

    #[test]
    fn test_exact_multiple() {
        let payload = vec![0xEF; 100];
        let frames: Vec<_> = MessageFragmenter::new(&payload, OpCode::Binary, 50).collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].fin);
    }

    #[test]
    fn test_empty_payload() {
        let frames: Vec<_> = MessageFragmenter::new(b"", OpCode::Text, 1024).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Text);
        assert!(frames[0].payload().is_empty());
    }

    #[test]
    fn test_zero_fragment_size_clamped() {
        let frames: Vec<_> = MessageFragmenter::new(b"abc", OpCode::Binary, 0).collect();
        assert_eq!(frames.len(), 3);
    }
}
