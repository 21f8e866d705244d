//! Wire format constants.
//!
//! Every frame starts with a single header byte. Control frames are exactly
//! that byte; data frames continue with a length byte:
//! ```text
//! ┌──────┬────────┬──────┬──────────┬─────────────┬──────────┐
//! │ SOF  │ Length │ Kind │ Function │ Payload     │ Checksum │
//! │ 0x01 │ N + 3  │ 1 B  │ 1 B      │ N bytes     │ 1 B      │
//! └──────┴────────┴──────┴──────────┴─────────────┴──────────┘
//! ```
//!
//! The length byte counts kind, function, payload and checksum. The checksum
//! is `0xFF` XOR-folded with the length, kind, function and payload bytes.

use std::fmt;

/// Start-of-frame header byte.
pub const SOF: u8 = 0x01;
/// Acknowledge control byte.
pub const ACK: u8 = 0x06;
/// Not-acknowledge control byte.
pub const NAK: u8 = 0x15;
/// Cancel control byte (peer asks for a resend).
pub const CAN: u8 = 0x18;

/// Smallest legal value of the length byte (kind + function + checksum).
pub const MIN_LENGTH_BYTE: u8 = 3;

/// Largest payload a single data frame can carry.
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize - MIN_LENGTH_BYTE as usize;

/// Bytes around the payload of a data frame (SOF, length, kind, function, checksum).
pub const DATA_FRAME_OVERHEAD: usize = 5;

/// Seed value of the XOR checksum.
pub const CHECKSUM_SEED: u8 = 0xFF;

/// Header byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameHeader {
    /// SOF: a data-bearing frame follows.
    StartOfFrame,
    /// ACK.
    Acknowledged,
    /// NAK.
    NotAcknowledged,
    /// CAN.
    Cancelled,
}

impl FrameHeader {
    /// Parse a header byte, `None` if it is not one of the four known values.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOF => Some(FrameHeader::StartOfFrame),
            ACK => Some(FrameHeader::Acknowledged),
            NAK => Some(FrameHeader::NotAcknowledged),
            CAN => Some(FrameHeader::Cancelled),
            _ => None,
        }
    }

    /// Wire value.
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            FrameHeader::StartOfFrame => SOF,
            FrameHeader::Acknowledged => ACK,
            FrameHeader::NotAcknowledged => NAK,
            FrameHeader::Cancelled => CAN,
        }
    }
}

/// Kind byte of a data frame.
///
/// Unknown values are kept so that checksums of odd frames can still be
/// recomputed exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Host → controller command, or controller → host callback.
    Request,
    /// Controller's immediate answer to a request.
    Response,
    /// Any other kind byte.
    Unknown(u8),
}

impl FrameType {
    /// Wire value.
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            FrameType::Request => 0x00,
            FrameType::Response => 0x01,
            FrameType::Unknown(b) => b,
        }
    }
}

impl From<u8> for FrameType {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => FrameType::Request,
            0x01 => FrameType::Response,
            other => FrameType::Unknown(other),
        }
    }
}

/// One-byte serial API function code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u8);

macro_rules! function_ids {
    ($($(#[$doc:meta])* $name:ident = $value:literal;)*) => {
        impl FunctionId {
            $($(#[$doc])* pub const $name: FunctionId = FunctionId($value);)*

            /// Symbolic name of a known function code.
            pub fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(stringify!($name)),)*
                    _ => None,
                }
            }
        }
    };
}

function_ids! {
    /// Discover the node ids present in the controller's network.
    DISCOVERY_NODES = 0x02;
    SERIAL_API_APPL_NODE_INFORMATION = 0x03;
    /// Unsolicited command from a node.
    APPLICATION_COMMAND_HANDLER = 0x04;
    GET_CONTROLLER_CAPABILITIES = 0x05;
    SERIAL_API_SET_TIMEOUTS = 0x06;
    SERIAL_GET_CAPABILITIES = 0x07;
    SERIAL_API_SOFT_RESET = 0x08;
    SET_RF_RECEIVE_MODE = 0x10;
    SET_SLEEP_MODE = 0x11;
    SEND_NODE_INFORMATION = 0x12;
    /// Send a command-class payload to a node.
    SEND_DATA = 0x13;
    SEND_DATA_MULTI = 0x14;
    GET_VERSION = 0x15;
    SEND_DATA_ABORT = 0x16;
    RF_POWER_LEVEL_SET = 0x17;
    SEND_DATA_META = 0x18;
    GET_RANDOM = 0x1C;
    /// Home id and controller node id.
    MEMORY_GET_ID = 0x20;
    MEMORY_GET_BYTE = 0x21;
    MEMORY_PUT_BYTE = 0x22;
    MEMORY_GET_BUFFER = 0x23;
    MEMORY_PUT_BUFFER = 0x24;
    CLOCK_SET = 0x30;
    CLOCK_GET = 0x31;
    CLOCK_COMPARE = 0x32;
    RTC_TIMER_CREATE = 0x33;
    RTC_TIMER_READ = 0x34;
    RTC_TIMER_DELETE = 0x35;
    RTC_TIMER_CALL = 0x36;
    SET_LEARN_NODE_STATE = 0x40;
    /// Listening/security/device-type bytes for a node.
    GET_NODE_PROTOCOL_INFO = 0x41;
    SET_DEFAULT = 0x42;
    NEW_CONTROLLER = 0x43;
    REPLICATION_COMMAND_COMPLETE = 0x44;
    REPLICATION_SEND_DATA = 0x45;
    ASSIGN_RETURN_ROUTE = 0x46;
    DELETE_RETURN_ROUTE = 0x47;
    REQUEST_NODE_NEIGHBOR_UPDATE = 0x48;
    /// Unsolicited node information / status update.
    APPLICATION_UPDATE = 0x49;
    ADD_NODE_TO_NETWORK = 0x4A;
    REMOVE_NODE_FROM_NETWORK = 0x4B;
    CREATE_NEW_PRIMARY = 0x4C;
    CONTROLLER_CHANGE = 0x4D;
    SET_LEARN_MODE = 0x50;
    ASSIGN_SUC_RETURN_ROUTE = 0x51;
    ENABLE_SUC = 0x52;
    REQUEST_NETWORK_UPDATE = 0x53;
    SET_SUC_NODE_ID = 0x54;
    DELETE_SUC_RETURN_ROUTE = 0x55;
    GET_SUC_NODE_ID = 0x56;
    SEND_SUC_ID = 0x57;
    REDISCOVERY_NEEDED = 0x59;
    REQUEST_NODE_NEIGHBOR_UPDATE_OPTIONS = 0x5A;
    EXPLORE_REQUEST_INCLUSION = 0x5E;
    /// Ask a node for its node information frame.
    REQUEST_NODE_INFO = 0x60;
    REMOVE_FAILED_NODE_ID = 0x61;
    IS_FAILED_NODE = 0x62;
    REPLACE_FAILED_NODE = 0x63;
    TIMER_START = 0x70;
    TIMER_RESTART = 0x71;
    TIMER_CANCEL = 0x72;
    TIMER_CALL = 0x73;
    GET_ROUTING_TABLE_LINE = 0x80;
    GET_TX_COUNTER = 0x81;
    RESET_TX_COUNTER = 0x82;
    STORE_NODE_INFO = 0x83;
    STORE_HOME_ID = 0x84;
    LOCK_ROUTE_RESPONSE = 0x90;
    SEND_DATA_ROUTE_DEMO = 0x91;
    SERIAL_API_TEST = 0x95;
    SERIAL_API_SLAVE_NODE_INFO = 0xA0;
    APPLICATION_SLAVE_COMMAND_HANDLER = 0xA1;
    SEND_SLAVE_NODE_INFO = 0xA2;
    SEND_SLAVE_DATA = 0xA3;
    SET_SLAVE_LEARN_MODE = 0xA4;
    GET_VIRTUAL_NODES = 0xA5;
    IS_VIRTUAL_NODE = 0xA6;
    SET_PROMISCUOUS_MODE = 0xD0;
    PROMISCUOUS_APPLICATION_COMMAND_HANDLER = 0xD1;
}

impl FunctionId {
    /// Functions answered by an immediate response and a later callback
    /// carrying the same function code.
    #[inline]
    pub fn expects_multi_response(self) -> bool {
        matches!(
            self,
            FunctionId::SEND_DATA | FunctionId::SEND_DATA_MULTI | FunctionId::SEND_DATA_META
        )
    }
}

impl fmt::Debug for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}(0x{:02X})", name, self.0),
            None => write!(f, "FunctionId(0x{:02X})", self.0),
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

impl From<u8> for FunctionId {
    fn from(byte: u8) -> Self {
        FunctionId(byte)
    }
}
