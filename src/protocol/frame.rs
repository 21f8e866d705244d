//! Frame types, encoding and decoding.
//!
//! A [`Frame`] is either a one-byte control frame or a [`DataFrame`].
//! Payloads use `bytes::Bytes` so frames can be cloned into the
//! pending-request response list and the notification channel cheaply.
//!
//! # Example
//!
//! ```
//! use zwave_controller::protocol::{DataFrame, Frame, FunctionId};
//!
//! let frame = Frame::Data(DataFrame::request(FunctionId::GET_VERSION, &[]).unwrap());
//! let bytes = frame.encode();
//! assert_eq!(bytes, vec![0x01, 0x03, 0x00, 0x15, 0xE9]);
//!
//! let (decoded, used) = Frame::decode(&bytes).unwrap().unwrap();
//! assert_eq!(used, 5);
//! assert_eq!(decoded, frame);
//! ```

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{
    FrameHeader, FrameType, FunctionId, CHECKSUM_SEED, DATA_FRAME_OVERHEAD, MAX_PAYLOAD_SIZE,
    MIN_LENGTH_BYTE,
};
use crate::error::{Result, ZWaveError};

/// A data-bearing (SOF) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    kind: FrameType,
    function: FunctionId,
    payload: Bytes,
    checksum: u8,
}

impl DataFrame {
    /// Create a frame and compute its checksum.
    ///
    /// Fails if the payload is longer than [`MAX_PAYLOAD_SIZE`].
    pub fn new(kind: FrameType, function: FunctionId, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ZWaveError::PayloadTooLarge(payload.len()));
        }
        let mut frame = Self {
            kind,
            function,
            payload,
            checksum: 0,
        };
        frame.checksum = frame.compute_checksum();
        Ok(frame)
    }

    /// Create a host → controller request.
    pub fn request(function: FunctionId, payload: &[u8]) -> Result<Self> {
        Self::new(FrameType::Request, function, Bytes::copy_from_slice(payload))
    }

    /// Create a controller → host response (mostly useful for fakes and tests).
    pub fn response(function: FunctionId, payload: &[u8]) -> Result<Self> {
        Self::new(FrameType::Response, function, Bytes::copy_from_slice(payload))
    }

    /// Rebuild a frame exactly as read from the wire, keeping its checksum.
    fn from_wire(kind: FrameType, function: FunctionId, payload: Bytes, checksum: u8) -> Self {
        Self {
            kind,
            function,
            payload,
            checksum,
        }
    }

    /// Frame kind.
    #[inline]
    pub fn kind(&self) -> FrameType {
        self.kind
    }

    /// Function code.
    #[inline]
    pub fn function(&self) -> FunctionId {
        self.function
    }

    /// Payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Cheap clone of the payload.
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Checksum carried by the frame (as received, or as computed on creation).
    #[inline]
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Value of the length byte: kind + function + payload + checksum.
    #[inline]
    pub fn length_byte(&self) -> u8 {
        // Bounded by MAX_PAYLOAD_SIZE at construction and by the u8 length on decode.
        (self.payload.len() + MIN_LENGTH_BYTE as usize) as u8
    }

    /// Total bytes on the wire.
    #[inline]
    pub fn wire_len(&self) -> usize {
        self.payload.len() + DATA_FRAME_OVERHEAD + 1
    }

    /// Recompute the checksum from the frame contents.
    pub fn compute_checksum(&self) -> u8 {
        let seed = CHECKSUM_SEED ^ self.length_byte() ^ self.kind.as_byte() ^ self.function.0;
        self.payload.iter().fold(seed, |acc, b| acc ^ b)
    }

    /// Check the carried checksum against the contents.
    #[inline]
    pub fn is_checksum_valid(&self) -> bool {
        self.compute_checksum() == self.checksum
    }

    /// Is this a Request-kind frame (callbacks from the controller are too).
    #[inline]
    pub fn is_request(&self) -> bool {
        self.kind == FrameType::Request
    }

    /// Is this a Response-kind frame.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.kind == FrameType::Response
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.wire_len());
        buf.put_u8(FrameHeader::StartOfFrame.as_byte());
        buf.put_u8(self.length_byte());
        buf.put_u8(self.kind.as_byte());
        buf.put_u8(self.function.0);
        buf.put_slice(&self.payload);
        buf.put_u8(self.checksum);
    }
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FrameType::Request => "REQ",
            FrameType::Response => "RES",
            FrameType::Unknown(_) => "???",
        };
        write!(f, "SOF {} {} [", kind, self.function)?;
        for (i, b) in self.payload.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", b)?;
        }
        f.write_str("]")
    }
}

/// A complete frame as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// ACK control byte.
    Ack,
    /// NAK control byte.
    Nak,
    /// CAN control byte.
    Cancel,
    /// SOF data frame.
    Data(DataFrame),
}

impl Frame {
    /// Header of this frame.
    pub fn header(&self) -> FrameHeader {
        match self {
            Frame::Ack => FrameHeader::Acknowledged,
            Frame::Nak => FrameHeader::NotAcknowledged,
            Frame::Cancel => FrameHeader::Cancelled,
            Frame::Data(_) => FrameHeader::StartOfFrame,
        }
    }

    /// Checksum validity; control frames carry none and are always valid.
    pub fn is_checksum_valid(&self) -> bool {
        match self {
            Frame::Data(data) => data.is_checksum_valid(),
            _ => true,
        }
    }

    /// Encode to a new byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.to_vec()
    }

    /// Append the wire form to an existing buffer.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Frame::Data(data) => data.encode_into(buf),
            control => buf.put_u8(control.header().as_byte()),
        }
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns:
    /// - `Ok(Some((frame, consumed)))` if a complete frame is available
    /// - `Ok(None)` if more bytes are needed
    /// - `Err(...)` if the first byte is not a header byte or the length byte is impossible
    ///
    /// A bad checksum is not an error; check [`Frame::is_checksum_valid`].
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };

        let header = FrameHeader::from_byte(first)
            .ok_or_else(|| ZWaveError::Protocol(format!("Unknown header byte 0x{:02x}", first)))?;

        let frame = match header {
            FrameHeader::Acknowledged => Frame::Ack,
            FrameHeader::NotAcknowledged => Frame::Nak,
            FrameHeader::Cancelled => Frame::Cancel,
            FrameHeader::StartOfFrame => return Self::decode_data(buf),
        };

        Ok(Some((frame, 1)))
    }

    fn decode_data(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
        let Some(&length) = buf.get(1) else {
            return Ok(None);
        };

        if length < MIN_LENGTH_BYTE {
            return Err(ZWaveError::Protocol(format!(
                "Length byte {} is shorter than the minimum {}",
                length, MIN_LENGTH_BYTE
            )));
        }

        let total = length as usize + 2;
        if buf.len() < total {
            return Ok(None);
        }

        let payload_len = (length - MIN_LENGTH_BYTE) as usize;
        let kind = FrameType::from(buf[2]);
        let function = FunctionId(buf[3]);
        let payload = Bytes::copy_from_slice(&buf[4..4 + payload_len]);
        let checksum = buf[total - 1];

        let frame = DataFrame::from_wire(kind, function, payload, checksum);
        Ok(Some((Frame::Data(frame), total)))
    }
}

impl From<DataFrame> for Frame {
    fn from(frame: DataFrame) -> Self {
        Frame::Data(frame)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Ack => f.write_str("ACK"),
            Frame::Nak => f.write_str("NAK"),
            Frame::Cancel => f.write_str("CAN"),
            Frame::Data(data) => data.fmt(f),
        }
    }
}

/// Format bytes as a lowercase hex string for trace logging.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::{ACK, CAN, NAK, SOF};

    fn get_version_bytes() -> Vec<u8> {
        vec![SOF, 0x03, 0x00, 0x15, 0xE9]
    }

    #[test]
    fn test_encode_get_version() {
        let frame = Frame::Data(DataFrame::request(FunctionId::GET_VERSION, &[]).unwrap());
        assert_eq!(frame.encode(), get_version_bytes());
    }

    #[test]
    fn test_encode_control_frames() {
        assert_eq!(Frame::Ack.encode(), vec![ACK]);
        assert_eq!(Frame::Nak.encode(), vec![NAK]);
        assert_eq!(Frame::Cancel.encode(), vec![CAN]);
    }

    #[test]
    fn test_decode_control_frames() {
        for (byte, expected) in [(ACK, Frame::Ack), (NAK, Frame::Nak), (CAN, Frame::Cancel)] {
            let (frame, used) = Frame::decode(&[byte, SOF]).unwrap().unwrap();
            assert_eq!(frame, expected);
            assert_eq!(used, 1);
        }
    }

    #[test]
    fn test_decode_data_frame() {
        let (frame, used) = Frame::decode(&get_version_bytes()).unwrap().unwrap();
        assert_eq!(used, 5);
        let Frame::Data(data) = frame else {
            panic!("expected data frame");
        };
        assert_eq!(data.kind(), FrameType::Request);
        assert_eq!(data.function(), FunctionId::GET_VERSION);
        assert!(data.payload().is_empty());
        assert!(data.is_checksum_valid());
    }

    #[test]
    fn test_decode_incomplete() {
        let bytes = get_version_bytes();
        assert!(Frame::decode(&[]).unwrap().is_none());
        for cut in 1..bytes.len() {
            assert!(Frame::decode(&bytes[..cut]).unwrap().is_none(), "cut {}", cut);
        }
    }

    #[test]
    fn test_decode_unknown_header() {
        let err = Frame::decode(&[0x42, 0x00]).unwrap_err();
        assert!(err.to_string().contains("Unknown header byte"));
    }

    #[test]
    fn test_decode_bad_length_byte() {
        let err = Frame::decode(&[SOF, 0x02, 0x00, 0x15]).unwrap_err();
        assert!(err.to_string().contains("Length byte"));
    }

    #[test]
    fn test_round_trip_payload_lengths() {
        for len in [0usize, 1, 2, 13, 64, 250, MAX_PAYLOAD_SIZE] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let original = DataFrame::new(
                FrameType::Response,
                FunctionId::SERIAL_GET_CAPABILITIES,
                payload,
            )
            .unwrap();
            let bytes = Frame::Data(original.clone()).encode();

            assert_eq!(bytes.len(), len + 6);
            assert_eq!(bytes[1] as usize, len + 3);

            let (decoded, used) = Frame::decode(&bytes).unwrap().unwrap();
            assert_eq!(used, bytes.len());
            assert_eq!(decoded, Frame::Data(original));
            assert!(decoded.is_checksum_valid());
        }
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let err = DataFrame::request(FunctionId::SEND_DATA, &payload).unwrap_err();
        assert!(matches!(err, ZWaveError::PayloadTooLarge(253)));
    }

    #[test]
    fn test_single_bit_corruption_detected() {
        let frame = DataFrame::request(FunctionId::SEND_DATA, &[0x05, 0x03, 0x25, 0x01, 0xFF])
            .unwrap();
        let bytes = Frame::Data(frame).encode();

        for byte_idx in 4..bytes.len() - 1 {
            for bit in 0..8 {
                let mut corrupted = bytes.clone();
                corrupted[byte_idx] ^= 1 << bit;
                let (decoded, _) = Frame::decode(&corrupted).unwrap().unwrap();
                assert!(
                    !decoded.is_checksum_valid(),
                    "flip of byte {} bit {} went unnoticed",
                    byte_idx,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_checksum_mismatch_is_data() {
        let mut bytes = get_version_bytes();
        bytes[4] ^= 0x01;
        let (frame, _) = Frame::decode(&bytes).unwrap().unwrap();
        assert!(!frame.is_checksum_valid());
        assert_eq!(frame.header(), FrameHeader::StartOfFrame);
    }

    #[test]
    fn test_unknown_kind_preserved() {
        let frame = DataFrame::new(FrameType::Unknown(0x07), FunctionId(0x99), vec![1, 2]).unwrap();
        let bytes = Frame::Data(frame.clone()).encode();
        let (decoded, _) = Frame::decode(&bytes).unwrap().unwrap();
        assert_eq!(decoded, Frame::Data(frame));
        assert!(decoded.is_checksum_valid());
    }

    #[test]
    fn test_display() {
        let frame = DataFrame::response(FunctionId::GET_SUC_NODE_ID, &[0x01, 0xab]).unwrap();
        assert_eq!(frame.to_string(), "SOF RES GET_SUC_NODE_ID [01 ab]");
        assert_eq!(Frame::Ack.to_string(), "ACK");
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x01, 0xab, 0x00]), "01ab00");
    }
}
