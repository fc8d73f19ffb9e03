//! Log Node
//!
//! Debug leaf. Writes whatever reaches its sink to the host log.

use node_engine::{
    ConfigField, EffectSink, NodeBehavior, NodeCategory, NodeDefinition, PortDataType, PortDefinition,
    ProcessContext, Result, ValueMap,
};
use serde::{Deserialize, Serialize};

use crate::ports::{each_value, parse_config};
use crate::setup::BuiltinNode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub label: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            label: "log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNode;

impl LogNode {
    pub const PORT_IN: &'static str = "in";
}

impl BuiltinNode for LogNode {
    const NODE_TYPE: &'static str = "log";

    fn definition() -> NodeDefinition {
        NodeDefinition::new(Self::NODE_TYPE, NodeCategory::Output, "Log")
            .with_description("Logs incoming values")
            .input(PortDefinition::sink(Self::PORT_IN, "Values", PortDataType::Any).multiple())
            .config(ConfigField::string("label", "Label", LogConfig::default().label))
    }
}

impl NodeBehavior for LogNode {
    fn process(&self, _inputs: &ValueMap, _config: &ValueMap, _ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        Ok(ValueMap::new())
    }

    fn on_sink(
        &self,
        inputs: &ValueMap,
        config: &ValueMap,
        ctx: &ProcessContext<'_>,
        _effects: &dyn EffectSink,
    ) -> Result<()> {
        let config: LogConfig = parse_config(config)?;
        for value in each_value(inputs, Self::PORT_IN) {
            log::info!("[{}] {} @ {:.3}s: {}", config.label, ctx.node_id, ctx.time, value);
        }
        Ok(())
    }
}
