//! Threshold Node
//!
//! Turns a number into a boolean gate.

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
pub struct ThresholdConfig {
    pub threshold: f64,
    /// Active below the threshold instead of at or above it
    pub invert: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            invert: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdNode;

impl ThresholdNode {
    pub const PORT_VALUE: &'static str = "value";
    pub const PORT_ACTIVE: &'static str = "active";
}

impl BuiltinNode for ThresholdNode {
    const NODE_TYPE: &'static str = "threshold";

    fn definition() -> NodeDefinition {
        let defaults = ThresholdConfig::default();
        NodeDefinition::new(Self::NODE_TYPE, NodeCategory::Processing, "Threshold")
            .with_description("True while the input is at or above the threshold")
            .input(PortDefinition::data(Self::PORT_VALUE, "Value", PortDataType::Number))
            .output(PortDefinition::data(Self::PORT_ACTIVE, "Active", PortDataType::Boolean))
            .config(ConfigField::number("threshold", "Threshold", defaults.threshold))
            .config(ConfigField::boolean("invert", "Invert", defaults.invert))
    }
}

impl NodeBehavior for ThresholdNode {
    fn process(&self, inputs: &ValueMap, config: &ValueMap, _ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        let config: ThresholdConfig = parse_config(config)?;
        let Some(value) = number(inputs, Self::PORT_VALUE) else {
            return Ok(outputs([(Self::PORT_ACTIVE, json!(false))]));
        };
        let active = (value >= config.threshold) != config.invert;
        Ok(outputs([(Self::PORT_ACTIVE, json!(active))]))
    }
}
