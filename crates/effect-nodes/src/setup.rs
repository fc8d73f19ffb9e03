//! Registration of the built-in node set
//!
//! Hosts build a [`NodeRegistry`] explicitly at startup and share it by
//! `Arc`. Nothing here is global, so tests can assemble registries with
//! any subset of nodes.
//!
//! ```ignore
//! let mut registry = NodeRegistry::new();
//! effect_nodes::register_builtin_nodes(&mut registry)?;
//! let engine = GraphEngine::new(Arc::new(registry));
//! ```

use std::sync::Arc;

use node_engine::{NodeBehavior, NodeDefinition, NodeRegistry, Result};

use crate::effect::{FlashlightNode, ScreenColorNode, VibrateNode};
use crate::input::{NumberNode, SensorInputNode};
use crate::output::{ClientObjectNode, LogNode};
use crate::processing::{ClampNode, LfoNode, MathNode, ThresholdNode};

/// A node type with a static definition
pub trait BuiltinNode: NodeBehavior + Default + 'static {
    const NODE_TYPE: &'static str;

    fn definition() -> NodeDefinition;

    /// Add this node type to `registry`
    fn register(registry: &mut NodeRegistry) -> Result<()> {
        registry.register(Self::definition(), Arc::new(Self::default()))
    }
}

/// Register every built-in node type
pub fn register_builtin_nodes(registry: &mut NodeRegistry) -> Result<()> {
    NumberNode::register(registry)?;
    SensorInputNode::register(registry)?;
    MathNode::register(registry)?;
    LfoNode::register(registry)?;
    ClampNode::register(registry)?;
    ThresholdNode::register(registry)?;
    ScreenColorNode::register(registry)?;
    FlashlightNode::register(registry)?;
    VibrateNode::register(registry)?;
    ClientObjectNode::register(registry)?;
    LogNode::register(registry)?;
    log::debug!("Registered {} built-in node types", registry.len());
    Ok(())
}

/// A fresh registry holding only the built-in nodes
pub fn builtin_registry() -> Result<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    register_builtin_nodes(&mut registry)?;
    Ok(registry)
}
