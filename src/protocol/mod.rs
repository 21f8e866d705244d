//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the serial API framing:
//! - control bytes and the SOF data frame layout
//! - checksum computation and validation
//! - frame buffer for accumulating partial reads

mod frame;
mod frame_buffer;
mod wire_format;

pub(crate) use frame::hex;
pub use frame::{DataFrame, Frame};
pub use frame_buffer::{extract_frames, FrameBuffer};
pub use wire_format::{
    FrameHeader, FrameType, FunctionId, ACK, CAN, CHECKSUM_SEED, DATA_FRAME_OVERHEAD,
    MAX_PAYLOAD_SIZE, MIN_LENGTH_BYTE, NAK, SOF,
};
