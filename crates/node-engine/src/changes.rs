//! Structural change sets
//!
//! [`apply_graph_changes`] is a pure reducer: every change has an idempotent
//! apply rule, so replaying a full change log from an empty graph yields the
//! same state as applying the changes one at a time as they arrived. The
//! registry-aware, validated path lives in [`GraphEngine::apply_changes`];
//! this module knows nothing about node types or ports.
//!
//! [`GraphEngine::apply_changes`]: crate::engine::GraphEngine::apply_changes

use serde::{Deserialize, Serialize};

use crate::types::{Connection, ConnectionId, GraphState, NodeId, NodeInstance, Position, ValueMap};

/// One structural edit, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GraphChange {
    /// Insert a node, replacing any node with the same id
    AddNode { node: NodeInstance },
    /// Delete a node and every connection touching it
    #[serde(rename_all = "camelCase")]
    RemoveNode { node_id: NodeId },
    #[serde(rename_all = "camelCase")]
    UpdateNodePosition { node_id: NodeId, position: Position },
    /// Change a node's type; its outputs are cleared
    #[serde(rename_all = "camelCase")]
    UpdateNodeType { node_id: NodeId, node_type: String },
    /// Shallow-merge into a node's config; `null` values delete the key
    #[serde(rename_all = "camelCase")]
    UpdateNodeConfig { node_id: NodeId, config: ValueMap },
    /// Insert a connection, replacing any connection with the same id
    AddConnection { connection: Connection },
    #[serde(rename_all = "camelCase")]
    RemoveConnection { connection_id: ConnectionId },
}

impl GraphChange {
    /// Node the change is about, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::AddNode { node } => Some(&node.id),
            Self::RemoveNode { node_id }
            | Self::UpdateNodePosition { node_id, .. }
            | Self::UpdateNodeType { node_id, .. }
            | Self::UpdateNodeConfig { node_id, .. } => Some(node_id),
            Self::AddConnection { .. } | Self::RemoveConnection { .. } => None,
        }
    }

    /// Whether the change can alter evaluation order or the connection index
    ///
    /// Position and config edits leave the wiring alone.
    pub fn rewires(&self) -> bool {
        !matches!(
            self,
            Self::UpdateNodePosition { .. } | Self::UpdateNodeConfig { .. }
        )
    }
}

/// Apply `changes` in order to a copy of `state`
pub fn apply_graph_changes(state: &GraphState, changes: &[GraphChange]) -> GraphState {
    let mut next = state.clone();
    for change in changes {
        apply_graph_change(&mut next, change);
    }
    next
}

/// Apply one change in place; returns `false` when it was a no-op
pub fn apply_graph_change(state: &mut GraphState, change: &GraphChange) -> bool {
    match change {
        GraphChange::AddNode { node } => {
            match state.nodes.iter().position(|n| n.id == node.id) {
                Some(pos) => state.nodes[pos] = node.clone(),
                None => state.nodes.push(node.clone()),
            }
            true
        }
        GraphChange::RemoveNode { node_id } => {
            let before = state.nodes.len();
            state.nodes.retain(|n| &n.id != node_id);
            state.connections.retain(|c| !c.touches(node_id));
            before != state.nodes.len()
        }
        GraphChange::UpdateNodePosition { node_id, position } => match state.find_node_mut(node_id) {
            Some(node) => {
                node.position = *position;
                true
            }
            None => false,
        },
        GraphChange::UpdateNodeType { node_id, node_type } => match state.find_node_mut(node_id) {
            Some(node) => {
                node.node_type = node_type.clone();
                node.output_values.clear();
                true
            }
            None => false,
        },
        GraphChange::UpdateNodeConfig { node_id, config } => match state.find_node_mut(node_id) {
            Some(node) => {
                for (key, value) in config {
                    if value.is_null() {
                        node.config.remove(key);
                    } else {
                        node.config.insert(key.clone(), value.clone());
                    }
                }
                true
            }
            None => false,
        },
        GraphChange::AddConnection { connection } => {
            if !state.contains_node(&connection.source_node_id) || !state.contains_node(&connection.target_node_id)
            {
                log::debug!("Skipping connection '{}' with a missing endpoint", connection.id);
                return false;
            }
            match state.connections.iter().position(|c| c.id == connection.id) {
                Some(pos) => state.connections[pos] = connection.clone(),
                None => state.connections.push(connection.clone()),
            }
            true
        }
        GraphChange::RemoveConnection { connection_id } => {
            let before = state.connections.len();
            state.connections.retain(|c| &c.id != connection_id);
            before != state.connections.len()
        }
    }
}
