//! Fluent builder for effect graphs
//!
//! Provides a fluent API for constructing graphs programmatically, mostly for
//! tests and for hosts that assemble a fixed graph in code.

use crate::groups::NodeGroup;
use crate::types::{Connection, GraphState, NodeInstance, Position};

/// Fluent builder for constructing graphs
///
/// # Example
///
/// ```ignore
/// let graph = GraphBuilder::new()
///     .add_node("lfo-1", "lfo")
///     .with_config("frequency", serde_json::json!(2.0))
///     .add_node("color-1", "screen-color")
///     .at(200.0, 0.0)
///     .connect("lfo-1", "value", "color-1", "intensity")
///     .build();
/// ```
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<NodeInstance>,
    connections: Vec<Connection>,
    groups: Vec<NodeGroup>,
    connection_counter: usize,
}

impl GraphBuilder {
    /// Create a new graph builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph
    pub fn add_node(mut self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.nodes.push(NodeInstance::new(id, node_type));
        self
    }

    /// Set the position of the most recently added node
    pub fn at(mut self, x: f64, y: f64) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.position = Position::new(x, y);
        }
        self
    }

    /// Set a config value on the most recently added node
    ///
    /// Must be called after `add_node`.
    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.config.insert(key.into(), value);
        }
        self
    }

    /// Set a literal input value on the most recently added node
    pub fn with_input_value(mut self, port: impl Into<String>, value: serde_json::Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.input_values.insert(port.into(), value);
        }
        self
    }

    /// Connect two ports (auto-generates the connection ID)
    pub fn connect(
        mut self,
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        self.connection_counter += 1;
        let id = format!("conn-{}", self.connection_counter);
        self.connections
            .push(Connection::new(id, source, source_port, target, target_port));
        self
    }

    /// Connect two ports with an explicit ID
    pub fn connect_with_id(
        mut self,
        connection_id: impl Into<String>,
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        self.connections.push(Connection::new(
            connection_id,
            source,
            source_port,
            target,
            target_port,
        ));
        self
    }

    /// Add a group
    pub fn group(mut self, group: NodeGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Build the graph without validation
    pub fn build(self) -> GraphState {
        GraphState {
            nodes: self.nodes,
            connections: self.connections,
        }
    }

    /// Build the graph and its groups without validation
    pub fn build_with_groups(self) -> (GraphState, Vec<NodeGroup>) {
        let groups = self.groups;
        let graph = GraphState {
            nodes: self.nodes,
            connections: self.connections,
        };
        (graph, groups)
    }
}
