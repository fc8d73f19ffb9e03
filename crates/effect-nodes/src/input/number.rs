//! Number Node
//!
//! Emits the number stored in its config. The usual way to feed a fixed
//! value into a loop.

use node_engine::{
    ConfigField, NodeBehavior, NodeCategory, NodeDefinition, PortDataType, PortDefinition, ProcessContext, Result,
    ValueMap,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ports::{outputs, parse_config};
use crate::setup::BuiltinNode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberConfig {
    pub value: f64,
}

impl Default for NumberConfig {
    fn default() -> Self {
        Self { value: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NumberNode;

impl NumberNode {
    /// Port ID for the emitted value
    pub const PORT_VALUE: &'static str = "value";
}

impl BuiltinNode for NumberNode {
    const NODE_TYPE: &'static str = "number";

    fn definition() -> NodeDefinition {
        NodeDefinition::new(Self::NODE_TYPE, NodeCategory::Input, "Number")
            .with_description("Emits a constant number")
            .output(PortDefinition::data(Self::PORT_VALUE, "Value", PortDataType::Number))
            .config(ConfigField::number("value", "Value", NumberConfig::default().value))
    }
}

impl NodeBehavior for NumberNode {
    fn process(&self, _inputs: &ValueMap, config: &ValueMap, _ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        let config: NumberConfig = parse_config(config)?;
        Ok(outputs([(Self::PORT_VALUE, json!(config.value))]))
    }
}
