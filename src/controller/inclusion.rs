//! Adding and removing nodes.
//!
//! Both handshakes follow the same steps:
//!
//! ```text
//! Idle ──start──► AwaitingStart ──ack'd──► AwaitingNodeCallback ──node──► Stopping ──► Idle
//! ```
//!
//! The start request opens the controller's inclusion (or exclusion) window,
//! the controller then reports progress through unsolicited callbacks of the
//! same function, and a Stop request closes the window. Stop is sent on every
//! exit once the start request was written, including cancellation and
//! timeout. A request cancelled while still queued sends nothing.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Controller;
use crate::error::{Result, ZWaveError};
use crate::node::ZWaveNode;
use crate::protocol::{DataFrame, FunctionId};
use crate::registry::ClassRegistry;
use crate::types::{NodeStatus, ZWaveMode};

/// Phase of an add/remove node handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InclusionState {
    /// No handshake running.
    #[default]
    Idle,
    /// Start request sent, waiting for the controller to accept it.
    AwaitingStart,
    /// Window open, waiting for a node to show up.
    AwaitingNodeCallback,
    /// Closing the window.
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Add,
    Remove,
}

impl Membership {
    fn function(self) -> FunctionId {
        match self {
            Membership::Add => FunctionId::ADD_NODE_TO_NETWORK,
            Membership::Remove => FunctionId::REMOVE_NODE_FROM_NETWORK,
        }
    }
}

/// Node carried by an add/remove callback:
/// `[seq, status, node id, length, basic, generic, specific, classes…]`.
///
/// Only `AddingRemovingSlave` callbacks with a non-empty descriptor carry one.
fn node_from_callback(
    registry: &dyn ClassRegistry,
    function: FunctionId,
    frame: &DataFrame,
) -> Option<ZWaveNode> {
    if frame.function() != function || !frame.is_request() {
        return None;
    }
    let [_seq, status, node_id, len, rest @ ..] = frame.payload() else {
        return None;
    };
    if NodeStatus::from(*status) != NodeStatus::AddingRemovingSlave || *len == 0 {
        return None;
    }
    let descriptor = &rest[..rest.len().min(*len as usize)];
    ZWaveNode::from_descriptor(registry, *node_id, descriptor)
}

/// Puts the inclusion state back to `Idle` however the handshake ends.
struct IdleOnDrop<'a>(&'a Controller);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_inclusion_state(InclusionState::Idle);
    }
}

impl Controller {
    /// Open the inclusion window and wait for one node to join.
    ///
    /// The node is added to the node table before the window is closed.
    pub async fn add_node(&self, token: &CancellationToken, mode: ZWaveMode) -> Result<ZWaveNode> {
        self.run_membership(Membership::Add, mode, token).await
    }

    /// Open the exclusion window and wait for one node to leave.
    ///
    /// The node is removed from the node table before the window is closed.
    pub async fn remove_node(&self, token: &CancellationToken) -> Result<ZWaveNode> {
        self.run_membership(Membership::Remove, ZWaveMode::NODE_ANY, token)
            .await
    }

    /// Keep adding nodes with network-wide inclusion until `token` is cancelled.
    ///
    /// An attempt that is cancelled or times out just starts the next one.
    /// Returns every node added.
    pub async fn add_node_network_wide_inclusion(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<ZWaveNode>> {
        let mode = ZWaveMode::NETWORK_WIDE | ZWaveMode::HIGH_POWER;
        let mut added = Vec::new();

        while !token.is_cancelled() {
            let attempt = token.child_token();
            match self.add_node(&attempt, mode).await {
                Ok(node) => added.push(node),
                Err(e) if e.is_cancelled() => debug!(error = %e, "Inclusion attempt ended"),
                Err(e) => return Err(e),
            }
        }

        info!(count = added.len(), "Network-wide inclusion finished");
        Ok(added)
    }

    async fn run_membership(
        &self,
        membership: Membership,
        mode: ZWaveMode,
        token: &CancellationToken,
    ) -> Result<ZWaveNode> {
        let function = membership.function();
        let registry: Arc<dyn ClassRegistry> = self.registry().clone();
        let _idle = IdleOnDrop(self);

        // Callbacks arriving after the start response are only seen by subscribers.
        let mut callbacks = self.subscribe();

        self.set_inclusion_state(InclusionState::AwaitingStart);
        let start = DataFrame::request(function, &[mode.bits(), self.next_sequence()])?;
        let mut transmitted = false;
        let outcome = match self
            .inner
            .dispatcher
            .dispatch_tracked(start, token, &mut transmitted)
            .await
        {
            Ok(_) => {
                self.set_inclusion_state(InclusionState::AwaitingNodeCallback);
                callbacks
                    .wait_for(
                        |frame| node_from_callback(registry.as_ref(), function, frame),
                        token,
                    )
                    .await
            }
            Err(e) => Err(e),
        };

        if let Ok(node) = &outcome {
            self.apply_membership(membership, node);
        }
        // Nothing to close if the start request never went out.
        if transmitted && !matches!(outcome, Err(ZWaveError::ConnectionClosed)) {
            self.stop_membership(function).await;
        }
        outcome
    }

    fn apply_membership(&self, membership: Membership, node: &ZWaveNode) {
        let command_classes: Vec<String> = node
            .supported_command_classes
            .iter()
            .map(|cc| cc.to_string())
            .collect();
        match membership {
            Membership::Add => {
                self.update_nodes(|nodes| nodes.insert(node.clone()));
                info!(node = %node, ?command_classes, "Added node");
            }
            Membership::Remove => {
                self.update_nodes(|nodes| nodes.remove(node.id));
                info!(node = %node, ?command_classes, "Removed node");
            }
        }
    }

    async fn stop_membership(&self, function: FunctionId) {
        self.set_inclusion_state(InclusionState::Stopping);
        let result = match DataFrame::request(
            function,
            &[ZWaveMode::NODE_STOP.bits(), self.next_sequence()],
        ) {
            // Not tied to the caller's token: the window must close even after cancellation.
            Ok(stop) => self.dispatch(stop, &CancellationToken::new()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(%function, error = %e, "Failed to close inclusion window");
        }
    }
}
