//! Command-class and device-type metadata.
//!
//! The controller only ever looks descriptors up by their one-byte key, so
//! the seam is the [`ClassRegistry`] trait. [`ClassCatalog`] is the stock
//! in-memory implementation, loadable from JSON.
//!
//! # Example
//!
//! ```
//! use zwave_controller::registry::{ClassCatalog, ClassRegistry};
//!
//! let catalog = ClassCatalog::from_json_str(r#"{
//!     "generic_devices": [
//!         { "key": 16, "name": "GENERIC_TYPE_SWITCH_BINARY", "help": "Binary Switch",
//!           "specific_devices": [
//!             { "key": 1, "name": "SPECIFIC_TYPE_POWER_SWITCH_BINARY", "help": "Power Switch" }
//!           ] }
//!     ],
//!     "command_classes": [
//!         { "key": 37, "version": 1, "name": "COMMAND_CLASS_SWITCH_BINARY", "help": "Switch Binary",
//!           "commands": [ { "key": 1, "name": "SWITCH_BINARY_SET", "help": "Set" } ] }
//!     ]
//! }"#).unwrap();
//!
//! let generic = catalog.generic_device_by_key(0x10).unwrap();
//! assert_eq!(catalog.specific_device_by_key(&generic, 1).unwrap().help, "Power Switch");
//!
//! let class = catalog.command_class_by_key(0x25).unwrap();
//! assert_eq!(catalog.command_by_key(&class, 1).unwrap().name, "SWITCH_BINARY_SET");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Basic device class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicDevice {
    pub key: u8,
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Generic device class with its specific sub-classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericDevice {
    pub key: u8,
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub specific_devices: Vec<Arc<SpecificDevice>>,
}

/// Specific device class, scoped to a generic class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificDevice {
    pub key: u8,
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub comment: String,
}

/// A versioned command class and its commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandClass {
    pub key: u8,
    #[serde(default = "default_version")]
    pub version: u8,
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub read_only: Option<bool>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub commands: Vec<Arc<Command>>,
}

fn default_version() -> u8 {
    1
}

/// A single command of a command class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub key: u8,
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub comment: String,
}

macro_rules! display_help {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.help.is_empty() {
                    f.write_str(&self.name)
                } else {
                    f.write_str(&self.help)
                }
            }
        })*
    };
}

display_help!(BasicDevice, GenericDevice, SpecificDevice, Command);

impl fmt::Display for CommandClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.help.is_empty() {
            &self.name
        } else {
            &self.help
        };
        write!(f, "{} (v{})", label, self.version)
    }
}

/// Key → descriptor lookups used while decoding node information.
///
/// Every lookup may miss; callers tolerate absent device types and skip
/// unknown command classes.
pub trait ClassRegistry: Send + Sync {
    /// Basic device class by key.
    fn basic_device_by_key(&self, key: u8) -> Option<Arc<BasicDevice>>;

    /// Generic device class by key.
    fn generic_device_by_key(&self, key: u8) -> Option<Arc<GenericDevice>>;

    /// Specific device class by key within a generic class.
    fn specific_device_by_key(&self, generic: &GenericDevice, key: u8) -> Option<Arc<SpecificDevice>> {
        generic
            .specific_devices
            .iter()
            .find(|specific| specific.key == key)
            .cloned()
    }

    /// Command class by key.
    fn command_class_by_key(&self, key: u8) -> Option<Arc<CommandClass>>;

    /// Command by key within a command class.
    fn command_by_key(&self, command_class: &CommandClass, key: u8) -> Option<Arc<Command>> {
        command_class
            .commands
            .iter()
            .find(|command| command.key == key)
            .cloned()
    }
}

/// Serialized form of a catalog.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    basic_devices: Vec<Arc<BasicDevice>>,
    #[serde(default)]
    generic_devices: Vec<Arc<GenericDevice>>,
    #[serde(default)]
    command_classes: Vec<Arc<CommandClass>>,
}

/// In-memory [`ClassRegistry`] backed by hash maps.
///
/// Later entries with a duplicate key replace earlier ones.
#[derive(Debug, Default, Clone)]
pub struct ClassCatalog {
    basic_devices: HashMap<u8, Arc<BasicDevice>>,
    generic_devices: HashMap<u8, Arc<GenericDevice>>,
    command_classes: HashMap<u8, Arc<CommandClass>>,
}

impl ClassCatalog {
    /// Create an empty catalog. Every lookup misses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON document with optional
    /// `basic_devices`, `generic_devices` and `command_classes` arrays.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for basic in document.basic_devices {
            catalog.basic_devices.insert(basic.key, basic);
        }
        for generic in document.generic_devices {
            catalog.generic_devices.insert(generic.key, generic);
        }
        for class in document.command_classes {
            catalog.command_classes.insert(class.key, class);
        }
        Ok(catalog)
    }

    /// Add a basic device class.
    pub fn with_basic_device(mut self, device: BasicDevice) -> Self {
        self.basic_devices.insert(device.key, Arc::new(device));
        self
    }

    /// Add a generic device class.
    pub fn with_generic_device(mut self, device: GenericDevice) -> Self {
        self.generic_devices.insert(device.key, Arc::new(device));
        self
    }

    /// Add a command class.
    pub fn with_command_class(mut self, class: CommandClass) -> Self {
        self.command_classes.insert(class.key, Arc::new(class));
        self
    }

    /// Number of command classes.
    pub fn command_class_count(&self) -> usize {
        self.command_classes.len()
    }
}

impl ClassRegistry for ClassCatalog {
    fn basic_device_by_key(&self, key: u8) -> Option<Arc<BasicDevice>> {
        self.basic_devices.get(&key).cloned()
    }

    fn generic_device_by_key(&self, key: u8) -> Option<Arc<GenericDevice>> {
        self.generic_devices.get(&key).cloned()
    }

    fn command_class_by_key(&self, key: u8) -> Option<Arc<CommandClass>> {
        self.command_classes.get(&key).cloned()
    }
}
