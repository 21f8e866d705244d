//! Protocol enumerations carried inside frame payloads.

use std::fmt;
use std::ops::BitOr;

macro_rules! byte_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vdoc:meta])* $variant:ident = $value:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vdoc])* $variant,)*
            /// Any value this crate does not name.
            Unknown(u8),
        }

        impl $name {
            /// Wire value.
            pub fn as_byte(self) -> u8 {
                match self {
                    $($name::$variant => $value,)*
                    $name::Unknown(b) => b,
                }
            }
        }

        impl From<u8> for $name {
            fn from(byte: u8) -> Self {
                match byte {
                    $($value => $name::$variant,)*
                    other => $name::Unknown(other),
                }
            }
        }
    };
}

macro_rules! byte_flags {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $($(#[$vdoc:meta])* const $flag:ident = $value:literal;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub u8);

        impl $name {
            /// No bits set.
            pub const NONE: $name = $name(0);
            $($(#[$vdoc])* pub const $flag: $name = $name($value);)*

            /// Raw bits.
            #[inline]
            pub fn bits(self) -> u8 {
                self.0
            }

            /// True if every bit of `other` is set.
            #[inline]
            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl From<u8> for $name {
            fn from(byte: u8) -> Self {
                $name(byte)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut names = Vec::new();
                $(if $value != 0 && self.contains($name::$flag) {
                    names.push(stringify!($flag));
                })*
                write!(f, "{}(0x{:02X} {})", stringify!($name), self.0, names.join("|"))
            }
        }
    };
}

byte_enum! {
    /// Status byte of an unsolicited `APPLICATION_UPDATE`.
    pub enum ApplicationUpdateStatus {
        SucId = 0x10,
        DeleteDone = 0x20,
        AddDone = 0x40,
        RoutingPending = 0x80,
        /// The node did not answer a node information request.
        NodeInfoReqFailed = 0x81,
        NodeInfoReqDone = 0x82,
        /// A node information frame follows.
        NodeInfoReceived = 0x84,
    }
}

byte_enum! {
    /// Status byte of an add/remove node callback.
    pub enum NodeStatus {
        LearnReady = 0x01,
        NodeFound = 0x02,
        /// A slave node is being added or removed; carries its descriptor.
        AddingRemovingSlave = 0x03,
        AddingRemovingController = 0x04,
        ProtocolDone = 0x05,
        Done = 0x06,
        Failed = 0x07,
    }
}

byte_enum! {
    /// Kind of protocol library running on the controller.
    pub enum Library {
        NoLib = 0x00,
        ControllerStatic = 0x01,
        ControllerPortable = 0x02,
        SlaveEnhanced = 0x03,
        Slave = 0x04,
        Installer = 0x05,
        SlaveRouting = 0x06,
        ControllerBridge = 0x07,
    }
}

impl Default for Library {
    fn default() -> Self {
        Library::NoLib
    }
}

byte_flags! {
    /// Mode byte of `ADD_NODE_TO_NETWORK` / `REMOVE_NODE_FROM_NETWORK`.
    ///
    /// The low bits select the operation; the two option bits may be or-ed in.
    pub struct ZWaveMode {
        const NODE_ANY = 0x01;
        const NODE_CONTROLLER = 0x02;
        const NODE_SLAVE = 0x03;
        const NODE_EXISTING = 0x04;
        /// Close the inclusion/exclusion window.
        const NODE_STOP = 0x05;
        const NODE_STOP_FAILED = 0x06;
        const NETWORK_WIDE = 0x40;
        const HIGH_POWER = 0x80;
    }
}

byte_flags! {
    /// Capability bits reported by `GET_CONTROLLER_CAPABILITIES`.
    pub struct ControllerCapabilities {
        const IS_SECONDARY = 0x01;
        const ON_OTHER_NETWORK = 0x02;
        const NODE_ID_SERVER_PRESENT = 0x04;
        const IS_REAL_PRIMARY = 0x08;
        const IS_SUC = 0x10;
    }
}

byte_flags! {
    /// Transmit options appended to `SEND_DATA`.
    pub struct TransmitOptions {
        const ACK = 0x01;
        const LOW_POWER = 0x02;
        const AUTO_ROUTE = 0x04;
        const NO_ROUTE = 0x10;
        const EXPLORE = 0x20;
        const NO_RETRANSMIT = 0x40;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_status() {
        assert_eq!(
            ApplicationUpdateStatus::from(0x84),
            ApplicationUpdateStatus::NodeInfoReceived
        );
        assert_eq!(ApplicationUpdateStatus::from(0x01), ApplicationUpdateStatus::Unknown(0x01));
        assert_eq!(ApplicationUpdateStatus::NodeInfoReqFailed.as_byte(), 0x81);
    }

    #[test]
    fn test_node_status() {
        assert_eq!(NodeStatus::from(0x03), NodeStatus::AddingRemovingSlave);
        assert_eq!(NodeStatus::Failed.as_byte(), 0x07);
    }

    #[test]
    fn test_mode_options() {
        let mode = ZWaveMode::NETWORK_WIDE | ZWaveMode::HIGH_POWER;
        assert_eq!(mode.bits(), 0xC0);
        assert!(mode.contains(ZWaveMode::HIGH_POWER));
        assert!(!mode.contains(ZWaveMode::NODE_ANY));
    }

    #[test]
    fn test_capabilities_debug() {
        let caps = ControllerCapabilities::from(0x18);
        assert!(caps.contains(ControllerCapabilities::IS_SUC));
        assert!(caps.contains(ControllerCapabilities::IS_REAL_PRIMARY));
        assert_eq!(
            format!("{:?}", caps),
            "ControllerCapabilities(0x18 IS_REAL_PRIMARY|IS_SUC)"
        );
    }

    #[test]
    fn test_transmit_options() {
        let options = TransmitOptions::ACK | TransmitOptions::AUTO_ROUTE | TransmitOptions::EXPLORE;
        assert_eq!(options.bits(), 0x25);
    }
}
