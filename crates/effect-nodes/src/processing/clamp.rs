//! Clamp Node
//!
//! Limits a number to a configured range.

use node_engine::{
    ConfigField, NodeBehavior, NodeCategory, NodeDefinition, PortDataType, PortDefinition, ProcessContext, Result,
    ValueMap,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ports::{number, outputs, parse_config};
use crate::setup::BuiltinNode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClampConfig {
    pub min: f64,
    pub max: f64,
}

impl Default for ClampConfig {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

impl ClampConfig {
    /// Range with swapped bounds put back in order
    fn bounds(&self) -> (f64, f64) {
        if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClampNode;

impl ClampNode {
    pub const PORT_VALUE: &'static str = "value";
}

impl BuiltinNode for ClampNode {
    const NODE_TYPE: &'static str = "clamp";

    fn definition() -> NodeDefinition {
        let defaults = ClampConfig::default();
        NodeDefinition::new(Self::NODE_TYPE, NodeCategory::Processing, "Clamp")
            .with_description("Limits a number to a range")
            .input(PortDefinition::data(Self::PORT_VALUE, "Value", PortDataType::Number).with_default(json!(0.0)))
            .output(PortDefinition::data(Self::PORT_VALUE, "Value", PortDataType::Number))
            .config(ConfigField::number("min", "Min", defaults.min))
            .config(ConfigField::number("max", "Max", defaults.max))
    }
}

impl NodeBehavior for ClampNode {
    fn process(&self, inputs: &ValueMap, config: &ValueMap, _ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        let config: ClampConfig = parse_config(config)?;
        let (lo, hi) = config.bounds();
        let value = number(inputs, Self::PORT_VALUE).unwrap_or(lo);
        Ok(outputs([(Self::PORT_VALUE, json!(value.clamp(lo, hi)))]))
    }
}
