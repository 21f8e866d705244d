//! Frame buffer for accumulating partial reads.
//!
//! Serial reads arrive in arbitrary chunks: a single read can hold several
//! frames, or a frame can be split over many reads. [`FrameBuffer`] keeps the
//! unconsumed tail between reads and resynchronises on garbage by dropping
//! one byte at a time.
//!
//! # Example
//!
//! ```
//! use zwave_controller::protocol::{Frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // ACK followed by the first two bytes of a data frame
//! let frames = buffer.push(&[0x06, 0x01, 0x03]);
//! assert_eq!(frames, vec![Frame::Ack]);
//! assert_eq!(buffer.len(), 2);
//!
//! let frames = buffer.push(&[0x00, 0x15, 0xE9]);
//! assert_eq!(frames.len(), 1);
//! assert!(buffer.is_empty());
//! ```

use bytes::{Buf, BytesMut};
use tracing::warn;

use super::frame::{hex, Frame};

/// Default capacity: a few maximum-size frames.
const DEFAULT_CAPACITY: usize = 1024;

/// Buffer for accumulating incoming bytes and extracting complete frames.
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: BytesMut,
}

impl FrameBuffer {
    /// Create a new frame buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new frame buffer with a custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial frames stay buffered for the next push. Bytes that cannot
    /// start a frame are dropped one at a time and logged.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            match Frame::decode(&self.buffer) {
                Ok(Some((frame, used))) => {
                    self.buffer.advance(used);
                    frames.push(frame);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(byte = %hex(&self.buffer[..1]), error = %e, "Discarding unframed byte");
                    self.buffer.advance(1);
                }
            }
        }
        frames
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a byte slice into the complete frames at its front and the
/// unconsumed remainder.
///
/// Stops at the first byte that is not a valid frame start; the remainder
/// then begins with that byte. Use [`FrameBuffer`] for streaming input with
/// resynchronisation.
pub fn extract_frames(mut buf: &[u8]) -> (Vec<Frame>, &[u8]) {
    let mut frames = Vec::new();
    while let Ok(Some((frame, used))) = Frame::decode(buf) {
        frames.push(frame);
        buf = &buf[used..];
    }
    (frames, buf)
}
