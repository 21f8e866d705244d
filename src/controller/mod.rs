//! Controller builder and connection runtime.
//!
//! The [`ControllerBuilder`] provides a fluent API for configuring timings
//! and the class registry. [`ControllerBuilder::connect`] then:
//! 1. Splits the transport into read and write halves
//! 2. Spawns the writer task on the write half
//! 3. Spawns the read loop, which feeds every received frame to the
//!    [`Dispatcher`] and applies unsolicited node updates
//!
//! # Example
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use zwave_controller::{ClassCatalog, Controller};
//!
//! # async fn run(port: tokio::io::DuplexStream) -> zwave_controller::Result<()> {
//! let controller = Controller::builder()
//!     .registry(ClassCatalog::new())
//!     .connect(port);
//!
//! let token = CancellationToken::new();
//! controller.fetch_controller_info(&token).await?;
//! for id in controller.discover_nodes(&token).await? {
//!     let node = controller.fetch_node_info(id, &token).await?;
//!     println!("{}", node);
//! }
//! controller.close();
//! # Ok(())
//! # }
//! ```

mod inclusion;
mod info;
mod state;

pub use inclusion::InclusionState;
pub use state::{ControllerState, SequenceNumber, ZWaveVersion};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ControllerConfig;
use crate::dispatcher::{Dispatcher, Notifications};
use crate::error::Result;
use crate::node::{NodeTable, ZWaveNode};
use crate::protocol::{hex, DataFrame, FrameBuffer, FunctionId};
use crate::registry::{ClassCatalog, ClassRegistry};
use crate::transport::Transport;
use crate::types::ApplicationUpdateStatus;
use crate::writer::spawn_writer_task;

/// Lock a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builder for configuring and connecting a [`Controller`].
pub struct ControllerBuilder {
    config: ControllerConfig,
    registry: Arc<dyn ClassRegistry>,
}

impl ControllerBuilder {
    /// Create a builder with default timings and an empty class catalog.
    pub fn new() -> Self {
        Self {
            config: ControllerConfig::default(),
            registry: Arc::new(ClassCatalog::new()),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the class registry used to resolve device types and command classes.
    pub fn registry(mut self, registry: impl ClassRegistry + 'static) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Share an existing registry.
    pub fn shared_registry(mut self, registry: Arc<dyn ClassRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the number of retransmissions.
    ///
    /// Default: 2
    pub fn retry_count(mut self, count: u32) -> Self {
        self.config.retry_count = count;
        self
    }

    /// Set the retransmission interval.
    ///
    /// Default: 1100 ms
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the hard timeout armed after the last retransmission.
    ///
    /// Default: 3000 ms
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set how long to wait for a node information frame.
    ///
    /// Default: 10 seconds
    pub fn node_info_timeout(mut self, timeout: Duration) -> Self {
        self.config.node_info_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer_channel_capacity = capacity;
        self
    }

    /// Set the per-subscriber notification buffer.
    ///
    /// Default: 64
    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.config.notification_capacity = capacity;
        self
    }

    /// Start the connection over `transport`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect<T: Transport>(self, transport: T) -> Controller {
        Controller::start(self.config, self.registry, transport)
    }

    /// Open a serial port and start the connection over it.
    #[cfg(feature = "serial")]
    pub fn open_serial(self, path: &str) -> Result<Controller> {
        let port = crate::transport::open_serial(path)?;
        Ok(self.connect(port))
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Inner {
    config: ControllerConfig,
    registry: Arc<dyn ClassRegistry>,
    dispatcher: Dispatcher,
    state: Mutex<ControllerState>,
    nodes: Mutex<NodeTable>,
    inclusion: Mutex<InclusionState>,
    writer_task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Last handle gone: stop the read loop; the writer drains and exits
        // once the dispatcher's sender is dropped.
        self.dispatcher.close();
    }
}

/// A running connection to a serial API controller.
///
/// Cheap to clone; clones share the connection, state and node table.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    /// Create a new controller builder.
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    fn start<T: Transport>(
        config: ControllerConfig,
        registry: Arc<dyn ClassRegistry>,
        transport: T,
    ) -> Self {
        let (reader, write_half) = tokio::io::split(transport);
        let (writer, writer_task) = spawn_writer_task(write_half, config.writer_channel_capacity);
        let dispatcher = Dispatcher::new(writer, &config);

        let inner = Arc::new(Inner {
            config,
            registry,
            dispatcher,
            state: Mutex::new(ControllerState::default()),
            nodes: Mutex::new(NodeTable::new()),
            inclusion: Mutex::new(InclusionState::Idle),
            writer_task: Mutex::new(Some(writer_task)),
        });

        tokio::spawn(Self::read_loop(
            Arc::downgrade(&inner),
            inner.dispatcher.closed_token(),
            inner.config.read_buffer_size,
            reader,
        ));
        Controller { inner }
    }

    /// Main read loop - reads bytes, extracts frames and hands them to the dispatcher.
    ///
    /// Holds only a weak reference between reads, so dropping every
    /// [`Controller`] handle shuts the connection down.
    async fn read_loop<R: AsyncRead + Unpin>(
        inner: Weak<Inner>,
        closed: CancellationToken,
        buffer_size: usize,
        mut reader: R,
    ) {
        let mut frame_buffer = FrameBuffer::new();
        let mut buf = vec![0u8; buffer_size.max(1)];

        loop {
            let read = tokio::select! {
                _ = closed.cancelled() => break,
                read = reader.read(&mut buf) => read,
            };
            let n = match read {
                Ok(0) => {
                    info!("Transport closed");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    error!("Read loop error: {}", e);
                    break;
                }
            };
            trace!(bytes = %hex(&buf[..n]), "Received");

            let Some(strong) = inner.upgrade() else {
                break;
            };
            let controller = Controller { inner: strong };
            for frame in frame_buffer.push(&buf[..n]) {
                if let Some(unsolicited) = controller.inner.dispatcher.process_frame(frame).await {
                    controller.handle_unsolicited(&unsolicited);
                    controller.inner.dispatcher.publish(unsolicited);
                }
            }
        }

        if let Some(strong) = inner.upgrade() {
            Controller { inner: strong }.close();
        }
    }

    fn handle_unsolicited(&self, frame: &DataFrame) {
        if frame.function() == FunctionId::APPLICATION_UPDATE {
            self.apply_application_update(frame.payload());
        } else {
            debug!(frame = %frame, "Unsolicited frame");
        }
    }

    /// Apply `[status, node id, length, basic, generic, specific, classes…]`.
    fn apply_application_update(&self, payload: &[u8]) {
        let Some(&status) = payload.first() else {
            debug!("Empty application update skipped");
            return;
        };
        let status = ApplicationUpdateStatus::from(status);

        if status == ApplicationUpdateStatus::NodeInfoReqFailed {
            warn!(payload = %hex(payload), "Failed to get node information");
            return;
        }

        let Some(&node_id) = payload.get(1) else {
            debug!(?status, "Application update without node id skipped");
            return;
        };

        let descriptor = if status == ApplicationUpdateStatus::NodeInfoReceived {
            let Some(&len) = payload.get(2) else {
                debug!(node_id, "Node information without length skipped");
                return;
            };
            let end = (3 + len as usize).min(payload.len());
            Some(&payload[3..end])
        } else {
            None
        };

        let mut nodes = lock(&self.inner.nodes);
        let Some(node) = nodes.get_mut(node_id) else {
            debug!(node_id, ?status, "Application update for unknown node skipped");
            return;
        };
        node.update_status = Some(status);

        let Some(descriptor) = descriptor else {
            return;
        };
        let mut updated = node.clone();
        if !updated.apply_descriptor(self.inner.registry.as_ref(), descriptor) {
            debug!(node_id, len = descriptor.len(), "Node information too short, classes kept");
            return;
        }
        info!(
            node = %updated,
            command_classes = ?updated
                .supported_command_classes
                .iter()
                .map(|cc| cc.to_string())
                .collect::<Vec<_>>(),
            "Node information received"
        );
        *node = updated;
    }

    /// Send a raw request and wait for its responses.
    pub async fn dispatch(
        &self,
        request: DataFrame,
        token: &CancellationToken,
    ) -> Result<Vec<DataFrame>> {
        self.inner.dispatcher.dispatch(request, token).await
    }

    /// Subscribe to unsolicited frames received from now on.
    pub fn subscribe(&self) -> Notifications {
        self.inner.dispatcher.subscribe()
    }

    /// Snapshot of the controller state.
    pub fn state(&self) -> ControllerState {
        lock(&self.inner.state).clone()
    }

    /// Snapshot of every known node, ordered by id.
    pub fn nodes(&self) -> Vec<ZWaveNode> {
        lock(&self.inner.nodes).iter().cloned().collect()
    }

    /// Snapshot of one node.
    pub fn node(&self, id: u8) -> Option<ZWaveNode> {
        lock(&self.inner.nodes).get(id).cloned()
    }

    /// Current phase of add/remove node.
    pub fn inclusion_state(&self) -> InclusionState {
        *lock(&self.inner.inclusion)
    }

    /// The class registry in use.
    pub fn registry(&self) -> &Arc<dyn ClassRegistry> {
        &self.inner.registry
    }

    /// The configuration in use.
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// True once the connection has been closed, by either side.
    pub fn is_closed(&self) -> bool {
        self.inner.dispatcher.is_closed()
    }

    /// Wait until the connection closes.
    pub async fn closed(&self) {
        self.inner.dispatcher.closed_token().cancelled().await
    }

    /// Close the connection.
    ///
    /// The read loop and writer stop; pending and later requests fail with
    /// `ConnectionClosed`.
    pub fn close(&self) {
        if self.inner.dispatcher.is_closed() {
            return;
        }
        self.inner.dispatcher.close();
        if let Some(task) = lock(&self.inner.writer_task).take() {
            task.abort();
        }
        info!("Controller closed");
    }

    fn next_sequence(&self) -> u8 {
        lock(&self.inner.state).sequence.next()
    }

    fn update_state(&self, f: impl FnOnce(&mut ControllerState)) {
        f(&mut lock(&self.inner.state));
    }

    fn update_nodes<T>(&self, f: impl FnOnce(&mut NodeTable) -> T) -> T {
        f(&mut lock(&self.inner.nodes))
    }

    fn set_inclusion_state(&self, state: InclusionState) {
        *lock(&self.inner.inclusion) = state;
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("closed", &self.is_closed())
            .field("in_flight", &self.inner.dispatcher.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClassCatalog;

    fn catalog() -> ClassCatalog {
        ClassCatalog::from_json_str(
            r#"{
                "generic_devices": [{"key": 16, "name": "SWITCH_BINARY",
                    "specific_devices": [{"key": 1, "name": "POWER_SWITCH"}]}],
                "command_classes": [{"key": 37, "name": "SWITCH_BINARY"}, {"key": 32, "name": "BASIC"}]
            }"#,
        )
        .unwrap()
    }

    fn controller() -> (Controller, tokio::io::DuplexStream) {
        let (client, server) = tokio::io::duplex(1024);
        let controller = Controller::builder().registry(catalog()).connect(client);
        controller.update_nodes(|nodes| nodes.replace_all([ZWaveNode::new(2), ZWaveNode::new(3)]));
        (controller, server)
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Controller::builder()
            .retry_count(4)
            .retry_interval(Duration::from_millis(500))
            .request_timeout(Duration::from_secs(1))
            .node_info_timeout(Duration::from_secs(2))
            .channel_capacity(8)
            .notification_capacity(16);

        assert_eq!(builder.config.retry_count, 4);
        assert_eq!(builder.config.retry_interval_ms, 500);
        assert_eq!(builder.config.request_timeout_ms, 1000);
        assert_eq!(builder.config.node_info_timeout_ms, 2000);
        assert_eq!(builder.config.writer_channel_capacity, 8);
        assert_eq!(builder.config.notification_capacity, 16);
    }

    #[tokio::test]
    async fn test_node_info_received_updates_node() {
        let (controller, _server) = controller();

        controller.apply_application_update(&[0x84, 0x02, 0x06, 0x04, 0x10, 0x01, 0x25, 0xEF, 0x20]);

        let node = controller.node(2).unwrap();
        assert_eq!(node.update_status, Some(ApplicationUpdateStatus::NodeInfoReceived));
        assert_eq!(node.protocol_info.specific.as_ref().unwrap().name, "POWER_SWITCH");
        let keys: Vec<_> = node.supported_command_classes.iter().map(|cc| cc.key).collect();
        assert_eq!(keys, vec![0x25]);
    }

    #[tokio::test]
    async fn test_status_only_update() {
        let (controller, _server) = controller();
        controller.apply_application_update(&[0x82, 0x03]);
        assert_eq!(
            controller.node(3).unwrap().update_status,
            Some(ApplicationUpdateStatus::NodeInfoReqDone)
        );
    }

    #[tokio::test]
    async fn test_malformed_updates_skipped() {
        let (controller, _server) = controller();

        controller.apply_application_update(&[]);
        controller.apply_application_update(&[0x84]);
        controller.apply_application_update(&[0x84, 0x02]);
        controller.apply_application_update(&[0x84, 0x09, 0x03, 0x04, 0x10, 0x01]);
        controller.apply_application_update(&[0x81, 0x02]);

        assert!(controller.nodes().iter().all(|n| n.update_status.is_none()));
        assert!(controller.node(9).is_none());
    }

    #[tokio::test]
    async fn test_short_node_information_sets_status() {
        let (controller, _server) = controller();

        controller.apply_application_update(&[0x84, 0x02, 0x00]);
        let node = controller.node(2).unwrap();
        assert_eq!(node.update_status, Some(ApplicationUpdateStatus::NodeInfoReceived));
        assert!(node.supported_command_classes.is_empty());

        // A full update first, then a truncated one: status refreshed, classes kept.
        controller.apply_application_update(&[0x84, 0x03, 0x04, 0x04, 0x10, 0x01, 0x25]);
        controller.apply_application_update(&[0x82, 0x03]);
        controller.apply_application_update(&[0x84, 0x03, 0x02, 0x04, 0x10]);
        let node = controller.node(3).unwrap();
        assert_eq!(node.update_status, Some(ApplicationUpdateStatus::NodeInfoReceived));
        assert_eq!(node.supported_command_classes.len(), 1);
        assert!(node.protocol_info.generic.is_some());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (controller, _server) = controller();
        assert!(!controller.is_closed());
        controller.close();
        controller.close();
        assert!(controller.is_closed());
        controller.closed().await;
    }

    #[tokio::test]
    async fn test_transport_eof_closes() {
        let (controller, server) = controller();
        drop(server);
        controller.closed().await;
        assert!(controller.is_closed());
    }

    #[tokio::test]
    async fn test_dropping_last_handle_closes() {
        let (controller, mut server) = controller();
        let closed = controller.inner.dispatcher.closed_token();

        drop(controller);
        closed.cancelled().await;

        // Read loop and writer are gone, so the device sees end of stream.
        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
    }
}
