//! Controller and node information requests.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{lock, Controller};
use crate::error::{Result, ZWaveError};
use crate::node::{NodeProtocolInfo, ZWaveNode};
use crate::protocol::{DataFrame, FunctionId};
use crate::registry::{Command, CommandClass};
use crate::types::TransmitOptions;

/// Bytes of a `GET_NODE_PROTOCOL_INFO` response.
const PROTOCOL_INFO_LEN: usize = 6;

impl Controller {
    /// Send a request and return its first response frame.
    async fn request(
        &self,
        function: FunctionId,
        payload: &[u8],
        token: &CancellationToken,
    ) -> Result<DataFrame> {
        let frame = DataFrame::request(function, payload)?;
        self.dispatch(frame, token)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ZWaveError::malformed(function, "no response frame"))
    }

    /// Fetch version, serial capabilities, controller capabilities, home id
    /// and SUC node id, one after the other.
    pub async fn fetch_controller_info(&self, token: &CancellationToken) -> Result<()> {
        self.fetch_version(token).await?;
        self.fetch_serial_capabilities(token).await?;
        self.fetch_controller_capabilities(token).await?;
        self.fetch_memory_id(token).await?;
        self.fetch_suc_node_id(token).await?;

        let state = self.state();
        info!(
            version = %state.version,
            library = ?state.version.library,
            home_id = %format!("{:08x}", state.home_id_u32()),
            node_id = state.controller_node_id,
            suc_node_id = state.suc_node_id,
            "Controller info fetched"
        );
        Ok(())
    }

    /// `GET_VERSION`: version string and library kind.
    pub async fn fetch_version(&self, token: &CancellationToken) -> Result<()> {
        let response = self.request(FunctionId::GET_VERSION, &[], token).await?;
        self.update_state(|state| state.apply_version(response.payload()));
        Ok(())
    }

    /// `SERIAL_GET_CAPABILITIES`: application version, manufacturer and
    /// product ids, supported functions.
    pub async fn fetch_serial_capabilities(&self, token: &CancellationToken) -> Result<()> {
        let response = self
            .request(FunctionId::SERIAL_GET_CAPABILITIES, &[], token)
            .await?;
        self.update_state(|state| state.apply_serial_capabilities(response.payload()));
        Ok(())
    }

    /// `GET_CONTROLLER_CAPABILITIES`: primary/secondary/SUC bits.
    pub async fn fetch_controller_capabilities(&self, token: &CancellationToken) -> Result<()> {
        let response = self
            .request(FunctionId::GET_CONTROLLER_CAPABILITIES, &[], token)
            .await?;
        lock(&self.inner.state).apply_controller_capabilities(response.payload())
    }

    /// `MEMORY_GET_ID`: home id and the controller's own node id.
    pub async fn fetch_memory_id(&self, token: &CancellationToken) -> Result<()> {
        let response = self.request(FunctionId::MEMORY_GET_ID, &[], token).await?;
        self.update_state(|state| state.apply_memory_id(response.payload()));
        Ok(())
    }

    /// `GET_SUC_NODE_ID`.
    pub async fn fetch_suc_node_id(&self, token: &CancellationToken) -> Result<()> {
        let response = self.request(FunctionId::GET_SUC_NODE_ID, &[], token).await?;
        lock(&self.inner.state).apply_suc_node_id(response.payload())
    }

    /// Ask the controller which nodes it knows and replace the node table
    /// with bare entries for them. Returns the node ids.
    pub async fn discover_nodes(&self, token: &CancellationToken) -> Result<Vec<u8>> {
        let response = self.request(FunctionId::DISCOVERY_NODES, &[], token).await?;
        let ids = lock(&self.inner.state).apply_discovery(response.payload())?;

        self.update_nodes(|nodes| nodes.replace_all(ids.iter().map(|&id| ZWaveNode::new(id))));
        info!(nodes = ?ids, "Discovered nodes");
        Ok(ids)
    }

    /// Fetch protocol info for one node, then request its node information
    /// frame and wait until the resulting application update has been applied.
    ///
    /// The controller aborts a node information exchange when another one
    /// starts, so calls must not overlap.
    pub async fn fetch_node_info(&self, node_id: u8, token: &CancellationToken) -> Result<ZWaveNode> {
        if self.node(node_id).is_none() {
            return Err(ZWaveError::UnknownNode(node_id));
        }

        let response = self
            .request(FunctionId::GET_NODE_PROTOCOL_INFO, &[node_id], token)
            .await?;
        let &[capability, security, reserved, basic, generic, specific, ..] = response.payload()
        else {
            return Err(ZWaveError::malformed(
                FunctionId::GET_NODE_PROTOCOL_INFO,
                format!(
                    "{} bytes, need {}",
                    response.payload().len(),
                    PROTOCOL_INFO_LEN
                ),
            ));
        };

        let mut protocol_info = NodeProtocolInfo {
            capability,
            security,
            reserved,
            ..Default::default()
        };
        protocol_info.resolve_device_types(self.registry().as_ref(), basic, generic, specific);

        self.update_nodes(|nodes| match nodes.get_mut(node_id) {
            Some(node) => {
                node.protocol_info = protocol_info;
                Ok(())
            }
            None => Err(ZWaveError::UnknownNode(node_id)),
        })?;

        // Subscribe first so the update cannot slip past between the two steps.
        let mut updates = self.subscribe();
        self.request(FunctionId::REQUEST_NODE_INFO, &[node_id], token)
            .await?;

        let wait = updates.wait_for(
            |frame| (frame.function() == FunctionId::APPLICATION_UPDATE).then_some(()),
            token,
        );
        match tokio::time::timeout(self.config().node_info_timeout(), wait).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(node_id, "No node information received");
                return Err(ZWaveError::TimedOut);
            }
        }

        let node = self.node(node_id).ok_or(ZWaveError::UnknownNode(node_id))?;
        debug!(node = %node, listening = node.is_listening(), "Node info fetched");
        Ok(node)
    }

    /// [`fetch_node_info`](Self::fetch_node_info) for every known node, strictly in sequence.
    pub async fn fetch_all_node_info(&self, token: &CancellationToken) -> Result<Vec<ZWaveNode>> {
        let ids: Vec<u8> = self.nodes().iter().map(|node| node.id).collect();
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            nodes.push(self.fetch_node_info(id, token).await?);
        }
        Ok(nodes)
    }

    /// Send a command to a node with `SEND_DATA`.
    ///
    /// Returns the controller's immediate response followed by the
    /// transmit-complete callback.
    pub async fn send_command(
        &self,
        node_id: u8,
        command_class: &CommandClass,
        command: &Command,
        options: TransmitOptions,
        data: &[u8],
        token: &CancellationToken,
    ) -> Result<Vec<DataFrame>> {
        let command_len = u8::try_from(data.len() + 2)
            .map_err(|_| ZWaveError::PayloadTooLarge(data.len()))?;

        let mut payload = Vec::with_capacity(data.len() + 6);
        payload.extend_from_slice(&[node_id, command_len, command_class.key, command.key]);
        payload.extend_from_slice(data);
        payload.push(options.bits());
        payload.push(self.next_sequence());

        debug!(node_id, command_class = %command_class, command = %command, "Sending command");
        self.dispatch(DataFrame::request(FunctionId::SEND_DATA, &payload)?, token)
            .await
    }
}
