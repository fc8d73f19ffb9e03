//! Core types for effect graphs
//!
//! These types define the structure of a graph: node instances, the
//! connections between their ports, and the port metadata that node
//! definitions declare.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for a connection
pub type ConnectionId = String;

/// Unique identifier for a port
pub type PortId = String;

/// Named values keyed by port id or config key
///
/// Ordered so serialized graphs and snapshots are stable.
pub type ValueMap = BTreeMap<String, serde_json::Value>;

/// The data type of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDataType {
    /// Accepts any type
    Any,
    /// Numeric value
    Number,
    /// Boolean value
    Boolean,
    /// Text string
    String,
    /// `#rrggbb` color string
    Color,
    /// Numeric array (x, y, z or alpha, beta, gamma)
    Vector,
    /// JSON object
    Json,
    /// Control command destined for a client
    Command,
}

impl PortDataType {
    /// Check if this type can connect to another type
    pub fn is_compatible_with(&self, other: &PortDataType) -> bool {
        // Any type is compatible with everything
        if matches!(self, PortDataType::Any) || matches!(other, PortDataType::Any) {
            return true;
        }

        // Colors are strings
        if matches!(
            (self, other),
            (PortDataType::Color, PortDataType::String) | (PortDataType::String, PortDataType::Color)
        ) {
            return true;
        }

        self == other
    }
}

/// Whether a port takes part in pure evaluation or receives effects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    /// Participates in the acyclic compute graph
    #[default]
    Data,
    /// Carries already-computed values to effectful leaves
    Sink,
}

/// Definition of a port (input or output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDefinition {
    /// Unique identifier for this port
    pub id: PortId,
    /// Human-readable label
    pub label: String,
    /// Data type of the port
    pub data_type: PortDataType,
    /// Data or sink
    #[serde(default)]
    pub kind: PortKind,
    /// Whether this port accepts multiple connections
    #[serde(default)]
    pub multiple: bool,
    /// Value used when nothing is connected and no literal is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}

impl PortDefinition {
    fn new(id: impl Into<String>, label: impl Into<String>, data_type: PortDataType, kind: PortKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_type,
            kind,
            multiple: false,
            default_value: None,
        }
    }

    /// Create a data port
    pub fn data(id: impl Into<String>, label: impl Into<String>, data_type: PortDataType) -> Self {
        Self::new(id, label, data_type, PortKind::Data)
    }

    /// Create a sink port
    pub fn sink(id: impl Into<String>, label: impl Into<String>, data_type: PortDataType) -> Self {
        Self::new(id, label, data_type, PortKind::Sink)
    }

    /// Set this port to accept multiple connections
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Set a default value for this port
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn is_sink(&self) -> bool {
        self.kind == PortKind::Sink
    }
}

/// Category of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Constants and sensor readings
    Input,
    /// Pure transforms (math, modulation, logic)
    Processing,
    /// Produces client commands
    Effect,
    /// Consumes commands (client anchors, logging)
    Output,
}

/// Canvas position of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    /// Unique identifier for this node instance
    pub id: NodeId,
    /// Node type (references a NodeDefinition)
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub position: Position,
    /// Per-instance configuration
    #[serde(default)]
    pub config: ValueMap,
    /// Literal overrides for unconnected inputs
    #[serde(default)]
    pub input_values: ValueMap,
    /// Last computed outputs
    #[serde(default)]
    pub output_values: ValueMap,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            position: Position::default(),
            config: ValueMap::new(),
            input_values: ValueMap::new(),
            output_values: ValueMap::new(),
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn with_input_value(mut self, port: impl Into<String>, value: serde_json::Value) -> Self {
        self.input_values.insert(port.into(), value);
        self
    }
}

/// A connection between an output port and an input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    pub source_node_id: NodeId,
    pub source_port_id: PortId,
    pub target_node_id: NodeId,
    pub target_port_id: PortId,
}

impl Connection {
    pub fn new(
        id: impl Into<String>,
        source_node_id: impl Into<String>,
        source_port_id: impl Into<String>,
        target_node_id: impl Into<String>,
        target_port_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source_node_id.into(),
            source_port_id: source_port_id.into(),
            target_node_id: target_node_id.into(),
            target_port_id: target_port_id.into(),
        }
    }

    /// Whether either endpoint is `node_id`
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }
}

/// Nodes and connections of one graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphState {
    #[serde(default)]
    pub nodes: Vec<NodeInstance>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl GraphState {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node by ID (mutable)
    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut NodeInstance> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn find_connection(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Get connections coming into a node
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.target_node_id == node_id)
    }

    /// Get connections going out of a node
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.source_node_id == node_id)
    }

    /// Get the IDs of nodes that this node depends on (upstream nodes)
    pub fn get_dependencies(&self, node_id: &str) -> Vec<NodeId> {
        self.incoming(node_id).map(|c| c.source_node_id.clone()).collect()
    }

    /// Get the IDs of nodes that depend on this node (downstream nodes)
    pub fn get_dependents(&self, node_id: &str) -> Vec<NodeId> {
        self.outgoing(node_id).map(|c| c.target_node_id.clone()).collect()
    }

    /// Drop `outputValues` from every node
    pub fn clear_outputs(&mut self) {
        for node in &mut self.nodes {
            node.output_values.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_data_type_compatibility() {
        assert!(PortDataType::Any.is_compatible_with(&PortDataType::String));
        assert!(PortDataType::String.is_compatible_with(&PortDataType::Any));
        assert!(PortDataType::Color.is_compatible_with(&PortDataType::String));
        assert!(PortDataType::String.is_compatible_with(&PortDataType::Color));
        assert!(!PortDataType::Number.is_compatible_with(&PortDataType::String));
        assert!(!PortDataType::Command.is_compatible_with(&PortDataType::Number));
    }

    #[test]
    fn test_graph_connections() {
        let mut graph = GraphState::new();
        graph.nodes.push(NodeInstance::new("node1", "number"));
        graph.nodes.push(NodeInstance::new("node2", "clamp").with_position(100.0, 0.0));
        graph
            .connections
            .push(Connection::new("c1", "node1", "value", "node2", "value"));

        assert_eq!(graph.get_dependencies("node2"), vec!["node1"]);
        assert_eq!(graph.get_dependents("node1"), vec!["node2"]);
        assert!(graph.connections[0].touches("node1"));
    }

    #[test]
    fn test_node_wire_shape() {
        let node = NodeInstance::new("n1", "number")
            .with_config("value", serde_json::json!(3))
            .with_input_value("a", serde_json::json!(1));
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "number");
        assert_eq!(value["inputValues"]["a"], 1);
        assert_eq!(value["position"], serde_json::json!({"x": 0.0, "y": 0.0}));

        let parsed: NodeInstance = serde_json::from_value(serde_json::json!({"id": "n2", "type": "lfo"})).unwrap();
        assert!(parsed.config.is_empty());
        assert!(parsed.output_values.is_empty());
    }
}
