//! Node type registry
//!
//! Maps node type strings to a [`NodeDefinition`] (ports, schema) and a
//! [`NodeBehavior`] (what the node does). The registry is built explicitly by
//! the process root and passed by reference (usually as an `Arc`) to every
//! engine that needs it, so independent engines can run side by side with
//! different node sets.
//!
//! ```ignore
//! let mut registry = NodeRegistry::new();
//! effect_nodes::register_builtin_nodes(&mut registry)?;
//! registry.merge(plugin_registry); // Add plugin nodes
//! let engine = GraphEngine::new(Arc::new(registry));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::definition::NodeDefinition;
use crate::error::Result;
use crate::events::EffectSink;
use crate::types::{NodeCategory, ValueMap};

/// Per-call context handed to node behaviors
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext<'a> {
    pub node_id: &'a str,
    /// Engine time in seconds
    pub time: f64,
    /// Seconds since the previous tick
    pub delta_time: f64,
}

/// Behavior of one node type
///
/// `process` must be a pure function of its arguments. Side effects belong in
/// `on_sink` (delivered after every data node of the tick has run) and
/// `on_disable` (fired once when the node leaves the enabled set).
pub trait NodeBehavior: Send + Sync {
    /// Compute outputs from resolved data inputs and config
    fn process(&self, inputs: &ValueMap, config: &ValueMap, ctx: &ProcessContext<'_>) -> Result<ValueMap>;

    /// Receive the values arriving on sink inputs
    fn on_sink(
        &self,
        _inputs: &ValueMap,
        _config: &ValueMap,
        _ctx: &ProcessContext<'_>,
        _effects: &dyn EffectSink,
    ) -> Result<()> {
        Ok(())
    }

    /// Undo held side effects when the node becomes disabled
    fn on_disable(&self, _config: &ValueMap, _ctx: &ProcessContext<'_>, _effects: &dyn EffectSink) -> Result<()> {
        Ok(())
    }
}

type ProcessFn = dyn Fn(&ValueMap, &ValueMap, &ProcessContext<'_>) -> Result<ValueMap> + Send + Sync;

/// Closure-backed behavior with only a `process` step
pub struct FnBehavior {
    process: Box<ProcessFn>,
}

impl FnBehavior {
    pub fn new(
        process: impl Fn(&ValueMap, &ValueMap, &ProcessContext<'_>) -> Result<ValueMap> + Send + Sync + 'static,
    ) -> Self {
        Self {
            process: Box::new(process),
        }
    }
}

impl NodeBehavior for FnBehavior {
    fn process(&self, inputs: &ValueMap, config: &ValueMap, ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        (self.process)(inputs, config, ctx)
    }
}

/// A registration entry combining a definition with its behavior
struct RegistryEntry {
    definition: NodeDefinition,
    behavior: Arc<dyn NodeBehavior>,
}

/// Registry of node types with their definitions and behaviors
///
/// # Composability
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = NodeRegistry::new();
/// // Register built-in nodes...
/// registry.merge(external_registry); // Add plugin nodes
/// ```
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a node type
    ///
    /// The definition is validated first; a later registration of the same
    /// type replaces the earlier one.
    pub fn register(&mut self, definition: NodeDefinition, behavior: Arc<dyn NodeBehavior>) -> Result<()> {
        definition.validate()?;
        if self.entries.contains_key(&definition.node_type) {
            log::debug!("Replacing registration for node type '{}'", definition.node_type);
        }
        self.entries.insert(
            definition.node_type.clone(),
            RegistryEntry { definition, behavior },
        );
        Ok(())
    }

    /// Register a node type backed by a process closure
    pub fn register_fn<F>(&mut self, definition: NodeDefinition, process: F) -> Result<()>
    where
        F: Fn(&ValueMap, &ValueMap, &ProcessContext<'_>) -> Result<ValueMap> + Send + Sync + 'static,
    {
        self.register(definition, Arc::new(FnBehavior::new(process)))
    }

    /// Get the definition for a node type
    pub fn get_definition(&self, node_type: &str) -> Option<&NodeDefinition> {
        self.entries.get(node_type).map(|e| &e.definition)
    }

    /// Get the behavior for a node type
    pub fn get_behavior(&self, node_type: &str) -> Option<Arc<dyn NodeBehavior>> {
        self.entries.get(node_type).map(|e| e.behavior.clone())
    }

    /// All registered definitions, sorted by node type
    pub fn all_definitions(&self) -> Vec<&NodeDefinition> {
        let mut all: Vec<&NodeDefinition> = self.entries.values().map(|e| &e.definition).collect();
        all.sort_by(|a, b| a.node_type.cmp(&b.node_type));
        all
    }

    /// Get definitions grouped by category
    pub fn definitions_by_category(&self) -> HashMap<NodeCategory, Vec<&NodeDefinition>> {
        let mut grouped: HashMap<NodeCategory, Vec<&NodeDefinition>> = HashMap::new();
        for definition in self.all_definitions() {
            grouped.entry(definition.category).or_default().push(definition);
        }
        grouped
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// List all registered node type strings, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same node_type.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
