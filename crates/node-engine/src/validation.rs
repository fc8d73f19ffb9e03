//! Graph validation and evaluation planning
//!
//! Validates graph structure, port kinds and types, node configs, and detects
//! cycles among data connections. Issues are collected, not short-circuited,
//! so the authoring side gets one report naming every offending node and
//! port.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::definition::NodeDefinition;
use crate::registry::NodeRegistry;
use crate::types::{Connection, ConnectionId, GraphState, NodeId, PortDataType, PortId, PortKind};

/// A graph configuration problem, tagged by `issue`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "camelCase")]
pub enum GraphIssue {
    /// Data connections form a cycle through these nodes
    #[serde(rename_all = "camelCase")]
    Cycle { node_ids: Vec<NodeId> },
    /// A connection references a node that does not exist
    #[serde(rename_all = "camelCase")]
    DanglingConnection { connection_id: ConnectionId, node_id: NodeId },
    /// A node has a type the registry does not know
    #[serde(rename_all = "camelCase")]
    UnknownNodeType { node_id: NodeId, node_type: String },
    /// A connection references a port the node type does not declare
    #[serde(rename_all = "camelCase")]
    UnknownPort {
        connection_id: ConnectionId,
        node_id: NodeId,
        port_id: PortId,
    },
    /// A connection joins ports of incompatible data types
    #[serde(rename_all = "camelCase")]
    IncompatiblePortTypes {
        connection_id: ConnectionId,
        source_type: PortDataType,
        target_type: PortDataType,
    },
    /// A connection joins a data port to a sink port
    #[serde(rename_all = "camelCase")]
    PortKindMismatch {
        connection_id: ConnectionId,
        source_kind: PortKind,
        target_kind: PortKind,
    },
    /// A second connection into an input that takes only one
    #[serde(rename_all = "camelCase")]
    PortAlreadyConnected {
        connection_id: ConnectionId,
        node_id: NodeId,
        port_id: PortId,
    },
    /// A node's process or sink hook failed during a tick
    #[serde(rename_all = "camelCase")]
    ProcessFailed { node_id: NodeId, message: String },
    /// A node's config does not satisfy its schema
    #[serde(rename_all = "camelCase")]
    InvalidConfig { node_id: NodeId, message: String },
    /// A group would become its own ancestor
    #[serde(rename_all = "camelCase")]
    GroupCycle { group_id: String },
}

impl std::fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cycle { node_ids } => write!(f, "Cycle through nodes [{}]", node_ids.join(", ")),
            Self::DanglingConnection { connection_id, node_id } => {
                write!(f, "Connection '{}' references missing node '{}'", connection_id, node_id)
            }
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "Unknown node type '{}' for node '{}'", node_type, node_id)
            }
            Self::UnknownPort {
                connection_id,
                node_id,
                port_id,
            } => write!(
                f,
                "Connection '{}' references unknown port '{}' on node '{}'",
                connection_id, port_id, node_id
            ),
            Self::IncompatiblePortTypes {
                connection_id,
                source_type,
                target_type,
            } => write!(
                f,
                "Connection '{}' joins incompatible types: {:?} -> {:?}",
                connection_id, source_type, target_type
            ),
            Self::PortKindMismatch {
                connection_id,
                source_kind,
                target_kind,
            } => write!(
                f,
                "Connection '{}' joins a {:?} port to a {:?} port",
                connection_id, source_kind, target_kind
            ),
            Self::PortAlreadyConnected {
                connection_id,
                node_id,
                port_id,
            } => write!(
                f,
                "Connection '{}' targets '{}.{}' which already has a connection",
                connection_id, node_id, port_id
            ),
            Self::ProcessFailed { node_id, message } => write!(f, "Node '{}' failed: {}", node_id, message),
            Self::InvalidConfig { node_id, message } => {
                write!(f, "Node '{}' has invalid config: {}", node_id, message)
            }
            Self::GroupCycle { group_id } => write!(f, "Group '{}' would become its own ancestor", group_id),
        }
    }
}

impl std::error::Error for GraphIssue {}

/// Validate a whole graph against a registry
///
/// Returns all issues found (not just the first).
pub fn validate_graph(state: &GraphState, registry: &NodeRegistry) -> Vec<GraphIssue> {
    let mut issues = Vec::new();

    validate_node_types(state, registry, &mut issues);
    validate_configs(state, registry, &mut issues);

    let mut wired: HashSet<(&str, &str)> = HashSet::new();
    for connection in &state.connections {
        if let Err(issue) = check_connection(state, registry, connection) {
            issues.push(issue);
            continue;
        }
        let single = registry
            .get_definition(node_type_of(state, &connection.target_node_id))
            .and_then(|d| d.find_input(&connection.target_port_id))
            .is_some_and(|p| !p.multiple);
        if single && !wired.insert((connection.target_node_id.as_str(), connection.target_port_id.as_str())) {
            issues.push(GraphIssue::PortAlreadyConnected {
                connection_id: connection.id.clone(),
                node_id: connection.target_node_id.clone(),
                port_id: connection.target_port_id.clone(),
            });
        }
    }

    for node_ids in find_cycles(state, registry) {
        issues.push(GraphIssue::Cycle { node_ids });
    }

    issues
}

fn node_type_of<'a>(state: &'a GraphState, node_id: &str) -> &'a str {
    state.find_node(node_id).map(|n| n.node_type.as_str()).unwrap_or_default()
}

/// Check that all nodes have known types in the registry
fn validate_node_types(state: &GraphState, registry: &NodeRegistry, issues: &mut Vec<GraphIssue>) {
    for node in &state.nodes {
        if !registry.has_node_type(&node.node_type) {
            issues.push(GraphIssue::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }
    }
}

fn validate_configs(state: &GraphState, registry: &NodeRegistry, issues: &mut Vec<GraphIssue>) {
    for node in &state.nodes {
        if let Some(definition) = registry.get_definition(&node.node_type) {
            if let Err(e) = definition.resolve_config(&node.config) {
                issues.push(GraphIssue::InvalidConfig {
                    node_id: node.id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Check one connection's endpoints, ports, kinds and types
///
/// A connection's kind is its source port's kind, and must equal the target
/// port's kind: data never flows into a sink and sinks never feed data.
pub fn check_connection(
    state: &GraphState,
    registry: &NodeRegistry,
    connection: &Connection,
) -> Result<(), GraphIssue> {
    let source_def = endpoint_definition(state, registry, connection, &connection.source_node_id)?;
    let target_def = endpoint_definition(state, registry, connection, &connection.target_node_id)?;

    let unknown_port = |node_id: &str, port_id: &str| GraphIssue::UnknownPort {
        connection_id: connection.id.clone(),
        node_id: node_id.to_string(),
        port_id: port_id.to_string(),
    };
    let source = source_def
        .find_output(&connection.source_port_id)
        .ok_or_else(|| unknown_port(&connection.source_node_id, &connection.source_port_id))?;
    let target = target_def
        .find_input(&connection.target_port_id)
        .ok_or_else(|| unknown_port(&connection.target_node_id, &connection.target_port_id))?;

    if source.kind != target.kind {
        return Err(GraphIssue::PortKindMismatch {
            connection_id: connection.id.clone(),
            source_kind: source.kind,
            target_kind: target.kind,
        });
    }
    if !source.data_type.is_compatible_with(&target.data_type) {
        return Err(GraphIssue::IncompatiblePortTypes {
            connection_id: connection.id.clone(),
            source_type: source.data_type,
            target_type: target.data_type,
        });
    }
    Ok(())
}

fn endpoint_definition<'a>(
    state: &GraphState,
    registry: &'a NodeRegistry,
    connection: &Connection,
    node_id: &str,
) -> Result<&'a NodeDefinition, GraphIssue> {
    let node = state.find_node(node_id).ok_or_else(|| GraphIssue::DanglingConnection {
        connection_id: connection.id.clone(),
        node_id: node_id.to_string(),
    })?;
    registry
        .get_definition(&node.node_type)
        .ok_or_else(|| GraphIssue::UnknownNodeType {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
        })
}

/// Whether a connection takes part in the data DAG
///
/// Connections whose source port is unknown count as data so a cycle through
/// misconfigured nodes is still reported.
pub fn is_data_connection(state: &GraphState, registry: &NodeRegistry, connection: &Connection) -> bool {
    let kind = state
        .find_node(&connection.source_node_id)
        .and_then(|n| registry.get_definition(&n.node_type))
        .and_then(|d| d.find_output(&connection.source_port_id))
        .map(|p| p.kind);
    kind != Some(PortKind::Sink)
}

/// Data adjacency by node insertion index
fn data_adjacency(state: &GraphState, registry: &NodeRegistry) -> Vec<Vec<usize>> {
    let index: HashMap<&str, usize> = state
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let mut adjacency = vec![Vec::new(); state.nodes.len()];
    for connection in &state.connections {
        if !is_data_connection(state, registry, connection) {
            continue;
        }
        if let (Some(&from), Some(&to)) = (
            index.get(connection.source_node_id.as_str()),
            index.get(connection.target_node_id.as_str()),
        ) {
            adjacency[from].push(to);
        }
    }
    adjacency
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Detect cycles among data connections using DFS coloring
///
/// Each distinct cycle is reported once, as the nodes along it in path order.
pub fn find_cycles(state: &GraphState, registry: &NodeRegistry) -> Vec<Vec<NodeId>> {
    let adjacency = data_adjacency(state, registry);
    let mut color = vec![Color::White; adjacency.len()];
    let mut stack = Vec::new();
    let mut found: Vec<Vec<usize>> = Vec::new();

    for start in 0..adjacency.len() {
        if color[start] == Color::White {
            visit(start, &adjacency, &mut color, &mut stack, &mut found);
        }
    }

    let mut seen: HashSet<BTreeSet<usize>> = HashSet::new();
    found
        .into_iter()
        .filter(|cycle| seen.insert(cycle.iter().copied().collect()))
        .map(|cycle| cycle.into_iter().map(|i| state.nodes[i].id.clone()).collect())
        .collect()
}

fn visit(
    node: usize,
    adjacency: &[Vec<usize>],
    color: &mut [Color],
    stack: &mut Vec<usize>,
    found: &mut Vec<Vec<usize>>,
) {
    color[node] = Color::Gray;
    stack.push(node);
    for &next in &adjacency[node] {
        match color[next] {
            Color::White => visit(next, adjacency, color, stack, found),
            Color::Gray => {
                if let Some(pos) = stack.iter().position(|&n| n == next) {
                    found.push(stack[pos..].to_vec());
                }
            }
            Color::Black => {}
        }
    }
    stack.pop();
    color[node] = Color::Black;
}

/// Evaluation order for one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationPlan {
    /// Nodes in dependency order, ties broken by insertion order
    pub order: Vec<NodeId>,
    /// Nodes on or downstream of a cycle; never evaluated
    pub blocked: Vec<NodeId>,
    /// Cycles found among data connections
    pub cycles: Vec<Vec<NodeId>>,
}

/// Topologically sort data connections with Kahn's algorithm
///
/// The ready set is keyed by insertion index, so the order is stable for a
/// fixed graph structure. Nodes that never become ready sit on or below a
/// cycle and are reported in `blocked` instead of being evaluated.
pub fn plan_evaluation(state: &GraphState, registry: &NodeRegistry) -> EvaluationPlan {
    let adjacency = data_adjacency(state, registry);
    let mut in_degree = vec![0usize; adjacency.len()];
    for targets in &adjacency {
        for &t in targets {
            in_degree[t] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..adjacency.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(adjacency.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &next in &adjacency[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    let placed: HashSet<usize> = order.iter().copied().collect();
    let blocked: Vec<NodeId> = (0..adjacency.len())
        .filter(|i| !placed.contains(i))
        .map(|i| state.nodes[i].id.clone())
        .collect();
    let cycles = if blocked.is_empty() {
        Vec::new()
    } else {
        find_cycles(state, registry)
    };

    EvaluationPlan {
        order: order.into_iter().map(|i| state.nodes[i].id.clone()).collect(),
        blocked,
        cycles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::definition::ConfigField;
    use crate::registry::ProcessContext;
    use crate::types::{NodeCategory, PortDefinition, ValueMap};

    fn pass(_: &ValueMap, _: &ValueMap, _: &ProcessContext<'_>) -> crate::error::Result<ValueMap> {
        Ok(ValueMap::new())
    }

    fn make_test_registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry
            .register_fn(
                NodeDefinition::new("value", NodeCategory::Processing, "Value")
                    .input(PortDefinition::data("in", "In", PortDataType::Number))
                    .output(PortDefinition::data("out", "Out", PortDataType::Number))
                    .config(ConfigField::number("gain", "Gain", 1.0).with_range(Some(0.0), None)),
                pass,
            )
            .unwrap();
        registry
            .register_fn(
                NodeDefinition::new("text", NodeCategory::Input, "Text")
                    .output(PortDefinition::data("out", "Out", PortDataType::String)),
                pass,
            )
            .unwrap();
        registry
            .register_fn(
                NodeDefinition::new("effect", NodeCategory::Effect, "Effect")
                    .input(PortDefinition::data("in", "In", PortDataType::Number))
                    .output(PortDefinition::sink("cmd", "Command", PortDataType::Command)),
                pass,
            )
            .unwrap();
        registry
            .register_fn(
                NodeDefinition::new("anchor", NodeCategory::Output, "Anchor")
                    .input(PortDefinition::sink("in", "In", PortDataType::Command).multiple()),
                pass,
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_valid_graph() {
        let graph = GraphBuilder::new()
            .add_node("a", "value")
            .add_node("b", "effect")
            .add_node("c", "anchor")
            .connect("a", "out", "b", "in")
            .connect("b", "cmd", "c", "in")
            .build();

        let issues = validate_graph(&graph, &make_test_registry());
        assert!(issues.is_empty(), "Expected no issues, got: {:?}", issues);
    }

    #[test]
    fn test_two_node_cycle_reported() {
        let graph = GraphBuilder::new()
            .add_node("a", "value")
            .add_node("b", "value")
            .connect("a", "out", "b", "in")
            .connect("b", "out", "a", "in")
            .build();
        let registry = make_test_registry();

        let issues = validate_graph(&graph, &registry);
        assert!(issues.contains(&GraphIssue::Cycle {
            node_ids: vec!["a".to_string(), "b".to_string()]
        }));

        let plan = plan_evaluation(&graph, &registry);
        assert!(plan.order.is_empty());
        assert_eq!(plan.blocked, vec!["a", "b"]);
        assert_eq!(plan.cycles.len(), 1);
    }

    #[test]
    fn test_cycle_blocks_only_its_component_and_downstream() {
        let graph = GraphBuilder::new()
            .add_node("free", "value")
            .add_node("a", "value")
            .add_node("b", "value")
            .add_node("below", "value")
            .connect("a", "out", "b", "in")
            .connect("b", "out", "a", "in")
            .connect_with_id("down", "b", "out", "below", "in")
            .build();

        let plan = plan_evaluation(&graph, &make_test_registry());
        assert_eq!(plan.order, vec!["free"]);
        assert_eq!(plan.blocked, vec!["a", "b", "below"]);
    }

    #[test]
    fn test_order_is_topological_with_insertion_ties() {
        let graph = GraphBuilder::new()
            .add_node("sink", "value")
            .add_node("x", "value")
            .add_node("y", "value")
            .connect("y", "out", "sink", "in")
            .build();

        let plan = plan_evaluation(&graph, &make_test_registry());
        assert_eq!(plan.order, vec!["x", "y", "sink"]);
        assert!(plan.blocked.is_empty());
    }

    #[test]
    fn test_sink_connections_excluded_from_cycles() {
        let graph = GraphBuilder::new()
            .add_node("e", "effect")
            .add_node("c", "anchor")
            .connect("e", "cmd", "c", "in")
            .build();
        assert!(find_cycles(&graph, &make_test_registry()).is_empty());
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let graph = GraphBuilder::new()
            .add_node("a", "value")
            .add_node("c", "anchor")
            .connect("a", "out", "c", "in")
            .build();
        let issues = validate_graph(&graph, &make_test_registry());
        assert!(issues.iter().any(|i| matches!(i, GraphIssue::PortKindMismatch { .. })));
    }

    #[test]
    fn test_incompatible_types_rejected() {
        let graph = GraphBuilder::new()
            .add_node("t", "text")
            .add_node("v", "value")
            .connect("t", "out", "v", "in")
            .build();
        let issues = validate_graph(&graph, &make_test_registry());
        assert!(issues
            .iter()
            .any(|i| matches!(i, GraphIssue::IncompatiblePortTypes { .. })));
    }

    #[test]
    fn test_unknown_port_and_dangling() {
        let graph = GraphBuilder::new()
            .add_node("a", "value")
            .add_node("b", "value")
            .connect("a", "nope", "b", "in")
            .connect("a", "out", "missing", "in")
            .build();
        let issues = validate_graph(&graph, &make_test_registry());
        assert!(issues.iter().any(|i| matches!(i, GraphIssue::UnknownPort { port_id, .. } if port_id == "nope")));
        assert!(issues
            .iter()
            .any(|i| matches!(i, GraphIssue::DanglingConnection { node_id, .. } if node_id == "missing")));
    }

    #[test]
    fn test_single_input_connected_twice() {
        let graph = GraphBuilder::new()
            .add_node("a", "value")
            .add_node("b", "value")
            .add_node("c", "value")
            .connect("a", "out", "c", "in")
            .connect("b", "out", "c", "in")
            .build();
        let issues = validate_graph(&graph, &make_test_registry());
        assert!(issues
            .iter()
            .any(|i| matches!(i, GraphIssue::PortAlreadyConnected { .. })));
    }

    #[test]
    fn test_invalid_config_reported() {
        let graph = GraphBuilder::new()
            .add_node("a", "value")
            .with_config("gain", serde_json::json!(-1))
            .build();
        let issues = validate_graph(&graph, &make_test_registry());
        assert!(issues.iter().any(|i| matches!(i, GraphIssue::InvalidConfig { .. })));
    }

    #[test]
    fn test_collects_multiple_issues() {
        let graph = GraphBuilder::new()
            .add_node("a", "unknown-type-1")
            .add_node("b", "unknown-type-2")
            .connect("a", "out", "b", "in")
            .connect("b", "out", "a", "in")
            .build();

        let issues = validate_graph(&graph, &make_test_registry());
        assert!(issues.iter().any(|i| matches!(i, GraphIssue::Cycle { .. })));
        assert!(issues.iter().any(|i| matches!(i, GraphIssue::UnknownNodeType { .. })));
    }
}
