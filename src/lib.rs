//! # zwave-controller
//!
//! Host-side driver for a Z-Wave controller attached over the serial API.
//!
//! This crate frames requests to the controller, serializes them one at a
//! time, retransmits and times them out, and correlates responses and
//! callbacks with the request that is in flight. On top of that it keeps a
//! node table and drives the add/remove node handshakes.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): SOF data frames and ACK/NAK/CAN control bytes
//! - **Dispatcher** ([`dispatcher`]): one request in flight, retry and timeout
//! - **Controller** ([`Controller`]): read loop, state, node table, inclusion
//!
//! ## Example
//!
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//! use zwave_controller::{ClassCatalog, Controller};
//!
//! #[tokio::main]
//! async fn main() -> zwave_controller::Result<()> {
//!     let catalog = ClassCatalog::from_json_str(&std::fs::read_to_string("classes.json")?)?;
//!     let controller = Controller::builder()
//!         .registry(catalog)
//!         .open_serial("/dev/ttyACM0")?;
//!
//!     let token = CancellationToken::new();
//!     controller.fetch_controller_info(&token).await?;
//!     controller.discover_nodes(&token).await?;
//!     controller.fetch_all_node_info(&token).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod types;
pub mod writer;

pub use config::ControllerConfig;
pub use controller::{
    Controller, ControllerBuilder, ControllerState, InclusionState, SequenceNumber, ZWaveVersion,
};
pub use dispatcher::Notifications;
pub use error::{Result, ZWaveError};
pub use node::{NodeProtocolInfo, ZWaveNode};
pub use protocol::{DataFrame, Frame, FunctionId};
pub use registry::{ClassCatalog, ClassRegistry};
pub use types::{TransmitOptions, ZWaveMode};
