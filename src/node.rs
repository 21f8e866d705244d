//! Nodes of the controller's network.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::registry::{BasicDevice, ClassRegistry, CommandClass, GenericDevice, SpecificDevice};
use crate::types::ApplicationUpdateStatus;

/// Separates supported from controlled command classes in a key list.
pub const COMMAND_CLASS_MARK: u8 = 0xEF;

/// Capability bit set on nodes that keep their receiver on.
const LISTENING_BIT: u8 = 0x80;

/// Protocol-level description of a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeProtocolInfo {
    /// Capability byte; bit 7 is "listening".
    pub capability: u8,
    /// Security byte.
    pub security: u8,
    /// Reserved byte.
    pub reserved: u8,
    pub basic: Option<Arc<BasicDevice>>,
    pub generic: Option<Arc<GenericDevice>>,
    pub specific: Option<Arc<SpecificDevice>>,
}

impl NodeProtocolInfo {
    /// Resolve the three device-type keys; misses leave the field empty.
    pub fn resolve_device_types(
        &mut self,
        registry: &dyn ClassRegistry,
        basic: u8,
        generic: u8,
        specific: u8,
    ) {
        self.basic = registry.basic_device_by_key(basic);
        self.generic = registry.generic_device_by_key(generic);
        self.specific = self
            .generic
            .as_deref()
            .and_then(|generic| registry.specific_device_by_key(generic, specific));
    }
}

/// A node known to the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ZWaveNode {
    pub id: u8,
    /// Last unsolicited update status seen for this node.
    pub update_status: Option<ApplicationUpdateStatus>,
    pub protocol_info: NodeProtocolInfo,
    pub supported_command_classes: Vec<Arc<CommandClass>>,
}

impl ZWaveNode {
    /// A node with only its id known.
    pub fn new(id: u8) -> Self {
        Self {
            id,
            update_status: None,
            protocol_info: NodeProtocolInfo::default(),
            supported_command_classes: Vec::new(),
        }
    }

    /// Build a node from a `[basic, generic, specific, command classes…]`
    /// descriptor as carried by inclusion callbacks and node information
    /// frames. Returns `None` if the descriptor is shorter than three bytes.
    pub fn from_descriptor(registry: &dyn ClassRegistry, id: u8, descriptor: &[u8]) -> Option<Self> {
        let mut node = ZWaveNode::new(id);
        node.apply_descriptor(registry, descriptor).then_some(node)
    }

    /// Refresh device types and supported command classes from a descriptor.
    ///
    /// Returns `false` and leaves the node untouched if the descriptor is too short.
    pub fn apply_descriptor(&mut self, registry: &dyn ClassRegistry, descriptor: &[u8]) -> bool {
        let [basic, generic, specific, classes @ ..] = descriptor else {
            return false;
        };
        self.protocol_info
            .resolve_device_types(registry, *basic, *generic, *specific);
        self.supported_command_classes = resolve_command_classes(registry, classes);
        true
    }

    /// Bit 7 of the capability byte.
    pub fn is_listening(&self) -> bool {
        self.protocol_info.capability & LISTENING_BIT != 0
    }
}

impl fmt::Display for ZWaveNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.protocol_info.specific {
            Some(specific) => write!(f, "{}: {}", self.id, specific),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Resolve command-class keys up to the [`COMMAND_CLASS_MARK`], skipping
/// keys the registry does not know.
pub fn resolve_command_classes(registry: &dyn ClassRegistry, keys: &[u8]) -> Vec<Arc<CommandClass>> {
    keys.iter()
        .take_while(|&&key| key != COMMAND_CLASS_MARK)
        .filter_map(|&key| registry.command_class_by_key(key))
        .collect()
}

/// Decode a node-id bitmask: byte 0 bit 0 is node 1, byte 0 bit 1 is node 2, …
///
/// Bits past id 255 are ignored.
pub fn node_ids_from_bitmask(bitmask: &[u8]) -> Vec<u8> {
    bitmask
        .iter()
        .enumerate()
        .flat_map(|(byte_idx, &byte)| {
            (0..8)
                .filter(move |bit| byte & (1 << bit) != 0)
                .filter_map(move |bit| u8::try_from(byte_idx * 8 + bit + 1).ok())
        })
        .collect()
}

/// The controller's authoritative node collection, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct NodeTable {
    nodes: BTreeMap<u8, ZWaveNode>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table.
    pub fn replace_all(&mut self, nodes: impl IntoIterator<Item = ZWaveNode>) {
        self.nodes = nodes.into_iter().map(|node| (node.id, node)).collect();
    }

    /// Insert or replace a node.
    pub fn insert(&mut self, node: ZWaveNode) -> Option<ZWaveNode> {
        self.nodes.insert(node.id, node)
    }

    pub fn remove(&mut self, id: u8) -> Option<ZWaveNode> {
        self.nodes.remove(&id)
    }

    pub fn get(&self, id: u8) -> Option<&ZWaveNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut ZWaveNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: u8) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<u8> {
        self.nodes.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZWaveNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
