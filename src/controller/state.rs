//! Controller identity and capability state.
//!
//! Each `apply_*` method parses the payload of one solicited response into
//! the state. They are kept separate from the request plumbing so the byte
//! layouts can be tested on their own.

use std::fmt;

use crate::error::{Result, ZWaveError};
use crate::node::node_ids_from_bitmask;
use crate::protocol::FunctionId;
use crate::types::{ControllerCapabilities, Library};

/// Largest callback sequence number; 0 and 127 are never used.
const MAX_SEQUENCE: u8 = 126;

/// Length of the version string at the start of a `GET_VERSION` response.
const VERSION_STRING_LEN: usize = 12;

/// Prefix stripped from the version string before parsing the numbers.
const VERSION_PRODUCT_NAME: &str = "Z-Wave";

/// Callback id generator for requests that carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceNumber(u8);

impl SequenceNumber {
    pub fn new() -> Self {
        SequenceNumber(0)
    }

    /// Next id: 1, 2, …, 126, then 1 again.
    pub fn next(&mut self) -> u8 {
        self.0 = if self.0 >= MAX_SEQUENCE { 1 } else { self.0 + 1 };
        self.0
    }

    /// Last id handed out, 0 before the first call.
    pub fn current(&self) -> u8 {
        self.0
    }
}

impl Default for SequenceNumber {
    fn default() -> Self {
        Self::new()
    }
}

/// Version record from `GET_VERSION` and `SERIAL_GET_CAPABILITIES`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZWaveVersion {
    /// Raw version string, NUL terminator removed.
    pub version: String,
    pub protocol_version: u8,
    pub protocol_sub_version: u8,
    pub application_version: u8,
    pub application_sub_version: u8,
    pub library: Library,
}

impl fmt::Display for ZWaveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)
    }
}

/// Everything the controller reports about itself.
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    pub sequence: SequenceNumber,
    pub chip_type: u8,
    pub chip_revision: u8,
    pub serial_api_version: u8,
    pub is_slave_api: bool,
    /// Capability byte of the discovery response.
    pub discovery_capabilities: u8,
    pub capabilities: ControllerCapabilities,
    pub version: ZWaveVersion,
    pub home_id: [u8; 4],
    pub controller_node_id: u8,
    pub suc_node_id: u8,
    pub manufacturer_id: u16,
    pub product_type: u16,
    pub product_id: u16,
    /// Serial API functions the controller implements.
    pub supported_functions: Vec<FunctionId>,
}

impl ControllerState {
    /// Home id as a single big-endian number.
    pub fn home_id_u32(&self) -> u32 {
        u32::from_be_bytes(self.home_id)
    }

    /// True if the controller reported `function` as supported.
    pub fn supports(&self, function: FunctionId) -> bool {
        self.supported_functions.contains(&function)
    }

    /// `GET_VERSION`: 12-byte version string then the library kind.
    ///
    /// Shorter payloads are ignored. A version string that does not parse
    /// keeps the previous protocol numbers.
    pub fn apply_version(&mut self, payload: &[u8]) {
        if payload.len() <= VERSION_STRING_LEN {
            return;
        }

        let raw = String::from_utf8_lossy(&payload[..VERSION_STRING_LEN]);
        let version = raw.trim_end_matches('\0').to_string();

        if let Some((major, minor)) = parse_protocol_version(&version) {
            self.version.protocol_version = major;
            self.version.protocol_sub_version = minor;
        }
        self.version.version = version;
        self.version.library = Library::from(payload[VERSION_STRING_LEN]);
    }

    /// `SERIAL_GET_CAPABILITIES`: application version, manufacturer, product
    /// and the supported-function bitmask.
    pub fn apply_serial_capabilities(&mut self, payload: &[u8]) {
        if payload.len() <= 8 {
            return;
        }
        self.version.application_version = payload[0];
        self.version.application_sub_version = payload[1];
        self.manufacturer_id = u16::from_be_bytes([payload[2], payload[3]]);
        self.product_type = u16::from_be_bytes([payload[4], payload[5]]);
        self.product_id = u16::from_be_bytes([payload[6], payload[7]]);
        self.supported_functions = node_ids_from_bitmask(&payload[8..])
            .into_iter()
            .map(FunctionId)
            .collect();
    }

    /// `GET_CONTROLLER_CAPABILITIES`: one capability byte.
    pub fn apply_controller_capabilities(&mut self, payload: &[u8]) -> Result<()> {
        let &[caps, ..] = payload else {
            return Err(ZWaveError::malformed(
                FunctionId::GET_CONTROLLER_CAPABILITIES,
                "empty payload",
            ));
        };
        self.capabilities = ControllerCapabilities::from(caps);
        Ok(())
    }

    /// `MEMORY_GET_ID`: home id then controller node id. Payloads under five
    /// bytes leave both unchanged.
    pub fn apply_memory_id(&mut self, payload: &[u8]) {
        if let [a, b, c, d, node_id, ..] = *payload {
            self.home_id = [a, b, c, d];
            self.controller_node_id = node_id;
        }
    }

    /// `GET_SUC_NODE_ID`: one node id, 0 when there is no SUC.
    pub fn apply_suc_node_id(&mut self, payload: &[u8]) -> Result<()> {
        let &[suc, ..] = payload else {
            return Err(ZWaveError::malformed(FunctionId::GET_SUC_NODE_ID, "empty payload"));
        };
        self.suc_node_id = suc;
        Ok(())
    }

    /// `DISCOVERY_NODES`: `[api version, capabilities, mask length, mask…,
    /// chip type, chip revision]`. Returns the node ids in the mask.
    pub fn apply_discovery(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let malformed = |reason: String| ZWaveError::malformed(FunctionId::DISCOVERY_NODES, reason);

        let &[api_version, capabilities, mask_len, ref rest @ ..] = payload else {
            return Err(malformed(format!("{} bytes, need at least 3", payload.len())));
        };
        let mask_len = mask_len as usize;
        if rest.len() < mask_len + 2 {
            return Err(malformed(format!(
                "bitmask of {} bytes but only {} bytes follow",
                mask_len,
                rest.len()
            )));
        }

        self.serial_api_version = api_version;
        self.discovery_capabilities = capabilities;
        self.is_slave_api = capabilities & 0x01 != 0;
        self.chip_type = rest[mask_len];
        self.chip_revision = rest[mask_len + 1];
        Ok(node_ids_from_bitmask(&rest[..mask_len]))
    }
}

/// `"Z-Wave 4.05"` → `(4, 5)`.
fn parse_protocol_version(version: &str) -> Option<(u8, u8)> {
    let numbers = version.replace(VERSION_PRODUCT_NAME, "");
    let (major, minor) = numbers.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_wraps() {
        let mut seq = SequenceNumber::new();
        assert_eq!(seq.current(), 0);
        for expected in 1..=126u8 {
            assert_eq!(seq.next(), expected);
        }
        assert_eq!(seq.current(), 126);
        assert_eq!(seq.next(), 1);
    }

    #[test]
    fn test_sequence_never_reserved() {
        let mut seq = SequenceNumber::new();
        for _ in 0..1000 {
            let n = seq.next();
            assert!(n != 0 && n != 127);
        }
    }

    #[test]
    fn test_apply_version() {
        let mut state = ControllerState::default();
        state.apply_version(b"Z-Wave 4.05\0\x01");
        assert_eq!(state.version.version, "Z-Wave 4.05");
        assert_eq!(state.version.protocol_version, 4);
        assert_eq!(state.version.protocol_sub_version, 5);
        assert_eq!(state.version.library, Library::ControllerStatic);
    }

    #[test]
    fn test_apply_version_unparsable_keeps_numbers() {
        let mut state = ControllerState::default();
        state.version.protocol_version = 3;
        state.version.protocol_sub_version = 9;

        state.apply_version(b"Z-Wave x.yy\0\x07");
        assert_eq!(state.version.protocol_version, 3);
        assert_eq!(state.version.protocol_sub_version, 9);
        assert_eq!(state.version.version, "Z-Wave x.yy");
        assert_eq!(state.version.library, Library::ControllerBridge);
    }

    #[test]
    fn test_apply_version_too_short() {
        let mut state = ControllerState::default();
        state.apply_version(b"Z-Wave 4.05\0");
        assert_eq!(state.version, ZWaveVersion::default());
    }

    #[test]
    fn test_apply_serial_capabilities() {
        let mut state = ControllerState::default();
        // app 1.2, manufacturer 0x0086, type 0x0001, id 0x005A, functions 0x02 and 0x05
        state.apply_serial_capabilities(&[0x01, 0x02, 0x00, 0x86, 0x00, 0x01, 0x00, 0x5A, 0x12]);

        assert_eq!(state.version.application_version, 1);
        assert_eq!(state.version.application_sub_version, 2);
        assert_eq!(state.manufacturer_id, 0x0086);
        assert_eq!(state.product_type, 0x0001);
        assert_eq!(state.product_id, 0x005A);
        assert_eq!(
            state.supported_functions,
            vec![FunctionId::DISCOVERY_NODES, FunctionId::GET_CONTROLLER_CAPABILITIES]
        );
        assert!(state.supports(FunctionId::DISCOVERY_NODES));
        assert!(!state.supports(FunctionId::SEND_DATA));
    }

    #[test]
    fn test_apply_serial_capabilities_too_short() {
        let mut state = ControllerState::default();
        state.apply_serial_capabilities(&[0x01, 0x02, 0x00, 0x86, 0x00, 0x01, 0x00, 0x5A]);
        assert_eq!(state.version.application_version, 0);
        assert!(state.supported_functions.is_empty());
    }

    #[test]
    fn test_apply_memory_id() {
        let mut state = ControllerState::default();
        state.apply_memory_id(&[0xC0, 0xFF, 0xEE, 0x01, 0x01]);
        assert_eq!(state.home_id, [0xC0, 0xFF, 0xEE, 0x01]);
        assert_eq!(state.home_id_u32(), 0xC0FFEE01);
        assert_eq!(state.controller_node_id, 1);

        state.apply_memory_id(&[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(state.controller_node_id, 1);
    }

    #[test]
    fn test_apply_single_byte_fields() {
        let mut state = ControllerState::default();
        state.apply_controller_capabilities(&[0x1C]).unwrap();
        assert!(state.capabilities.contains(ControllerCapabilities::IS_SUC));
        state.apply_suc_node_id(&[0x01]).unwrap();
        assert_eq!(state.suc_node_id, 1);

        assert!(state.apply_suc_node_id(&[]).is_err());
        assert!(state.apply_controller_capabilities(&[]).is_err());
    }

    #[test]
    fn test_apply_discovery() {
        let mut state = ControllerState::default();
        let ids = state
            .apply_discovery(&[0x05, 0x08, 0x02, 0x05, 0x00, 0x05, 0x00])
            .unwrap();

        assert_eq!(ids, vec![1, 3]);
        assert_eq!(state.serial_api_version, 5);
        assert_eq!(state.discovery_capabilities, 0x08);
        assert!(!state.is_slave_api);
        assert_eq!(state.chip_type, 0x05);
        assert_eq!(state.chip_revision, 0x00);
    }

    #[test]
    fn test_apply_discovery_malformed() {
        let mut state = ControllerState::default();
        assert!(state.apply_discovery(&[0x05, 0x08]).is_err());
        let err = state.apply_discovery(&[0x05, 0x08, 0x1D, 0xFF]).unwrap_err();
        assert!(matches!(err, ZWaveError::MalformedResponse { .. }));
        assert_eq!(state.serial_api_version, 0);
    }

    #[test]
    fn test_parse_protocol_version() {
        assert_eq!(parse_protocol_version("Z-Wave 6.07"), Some((6, 7)));
        assert_eq!(parse_protocol_version("Z-Wave 4"), None);
        assert_eq!(parse_protocol_version("Z-Wave 4.300"), None);
    }
}
