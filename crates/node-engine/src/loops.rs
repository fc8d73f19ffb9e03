//! Deployable loops
//!
//! A loop is the part of a graph that drives one client: a `client-object`
//! anchor node plus every node that feeds it, directly or transitively. Two
//! anchors wired to a shared source each get their own loop, and both carry
//! a copy of the source.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::groups::{GroupClosure, GroupOperations, NodeGroup};
use crate::types::{GraphState, NodeId};

/// Node type that anchors a loop to a client
pub const CLIENT_ANCHOR_TYPE: &str = "client-object";
/// Anchor config key naming the target client
pub const CLIENT_ID_KEY: &str = "clientId";

/// One deployable subgraph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopDescriptor {
    pub loop_id: String,
    pub anchor_node_id: NodeId,
    /// Client named by the anchor's config; `None` when unset or empty
    pub client_id: Option<String>,
    /// Member nodes in graph insertion order
    pub node_ids: Vec<NodeId>,
}

impl LoopDescriptor {
    pub fn contains(&self, node_id: &str) -> bool {
        self.node_ids.iter().any(|id| id == node_id)
    }
}

/// Loop id for an anchor node
pub fn loop_id_for(anchor_node_id: &str) -> String {
    format!("loop-{}", anchor_node_id)
}

/// Find every loop in the graph, in anchor insertion order
pub fn detect_loops(state: &GraphState) -> Vec<LoopDescriptor> {
    let mut upstream: HashMap<&str, Vec<&str>> = HashMap::new();
    for connection in &state.connections {
        upstream
            .entry(connection.target_node_id.as_str())
            .or_default()
            .push(connection.source_node_id.as_str());
    }

    state
        .nodes
        .iter()
        .filter(|n| n.node_type == CLIENT_ANCHOR_TYPE)
        .map(|anchor| {
            let mut members: HashSet<&str> = HashSet::from([anchor.id.as_str()]);
            let mut queue = VecDeque::from([anchor.id.as_str()]);
            while let Some(current) = queue.pop_front() {
                for &next in upstream.get(current).into_iter().flatten() {
                    if state.contains_node(next) && members.insert(next) {
                        queue.push_back(next);
                    }
                }
            }

            let client_id = anchor
                .config
                .get(CLIENT_ID_KEY)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string);

            LoopDescriptor {
                loop_id: loop_id_for(&anchor.id),
                anchor_node_id: anchor.id.clone(),
                client_id,
                node_ids: state
                    .nodes
                    .iter()
                    .filter(|n| members.contains(n.id.as_str()))
                    .map(|n| n.id.clone())
                    .collect(),
            }
        })
        .collect()
}

/// Look up one loop by id in the current graph
pub fn find_loop(state: &GraphState, loop_id: &str) -> Option<LoopDescriptor> {
    detect_loops(state).into_iter().find(|l| l.loop_id == loop_id)
}

/// Cut a loop's subgraph out of the full graph
///
/// Keeps the member nodes (outputs cleared), connections with both endpoints
/// inside, and the groups that still contain a member after pruning, so
/// group gating carries over to the client.
pub fn export_graph_for_loop(
    state: &GraphState,
    groups: &[NodeGroup],
    descriptor: &LoopDescriptor,
) -> (GraphState, Vec<NodeGroup>) {
    let members: HashSet<&str> = descriptor.node_ids.iter().map(String::as_str).collect();

    let mut graph = GraphState {
        nodes: state
            .nodes
            .iter()
            .filter(|n| members.contains(n.id.as_str()))
            .cloned()
            .collect(),
        connections: state
            .connections
            .iter()
            .filter(|c| members.contains(c.source_node_id.as_str()) && members.contains(c.target_node_id.as_str()))
            .cloned()
            .collect(),
    };
    graph.clear_outputs();

    let mut groups = groups.to_vec();
    GroupOperations::prune_missing(&mut groups, &members);
    let closure = GroupClosure::compute(&groups);
    let keep: BTreeSet<String> = groups
        .iter()
        .filter(|g| closure.effective_nodes(&g.id).is_some_and(|set| !set.is_empty()))
        .map(|g| g.id.clone())
        .collect();
    groups.retain(|g| keep.contains(&g.id));

    (graph, groups)
}
