//! Flashlight Node
//!
//! Turns the client torch on (steady, blinking or pulsing) while its `on`
//! input is true, and off otherwise. Disabling the node switches it off.

use node_engine::{
    ConfigField, Effect, EffectSink, NodeBehavior, NodeCategory, NodeDefinition, PortDataType, PortDefinition,
    ProcessContext, Result, ValueMap,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tandem_protocol::{ControlAction, FlashlightMode};

use crate::ports::{boolean, command, outputs, parse_config};
use crate::setup::BuiltinNode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlashlightConfig {
    /// Mode used while on: `on`, `blink` or `pulse`
    pub mode: FlashlightMode,
    pub interval_ms: f64,
}

impl Default for FlashlightConfig {
    fn default() -> Self {
        Self {
            mode: FlashlightMode::On,
            interval_ms: 250.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlashlightNode;

impl FlashlightNode {
    pub const PORT_ON: &'static str = "on";
    pub const PORT_COMMAND: &'static str = "cmd";

    fn off() -> ControlAction {
        ControlAction::Flashlight {
            mode: FlashlightMode::Off,
            interval_ms: None,
            duration_ms: None,
        }
    }
}

impl BuiltinNode for FlashlightNode {
    const NODE_TYPE: &'static str = "flashlight";

    fn definition() -> NodeDefinition {
        NodeDefinition::new(Self::NODE_TYPE, NodeCategory::Effect, "Flashlight")
            .with_description("Drives the client torch")
            .input(PortDefinition::data(Self::PORT_ON, "On", PortDataType::Boolean).with_default(json!(false)))
            .output(PortDefinition::sink(Self::PORT_COMMAND, "Command", PortDataType::Command))
            .config(ConfigField::select("mode", "Mode", &["on", "blink", "pulse"], "on"))
            .config(
                ConfigField::number("intervalMs", "Interval (ms)", FlashlightConfig::default().interval_ms)
                    .with_range(Some(1.0), None),
            )
    }
}

impl NodeBehavior for FlashlightNode {
    fn process(&self, inputs: &ValueMap, config: &ValueMap, _ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        let config: FlashlightConfig = parse_config(config)?;
        let action = if boolean(inputs, Self::PORT_ON).unwrap_or(false) {
            let interval_ms = match config.mode {
                FlashlightMode::Blink | FlashlightMode::Pulse => Some(config.interval_ms.round() as u32),
                FlashlightMode::On | FlashlightMode::Off => None,
            };
            ControlAction::Flashlight {
                mode: config.mode,
                interval_ms,
                duration_ms: None,
            }
        } else {
            Self::off()
        };
        Ok(outputs([(Self::PORT_COMMAND, command(&action)?)]))
    }

    fn on_disable(&self, _config: &ValueMap, ctx: &ProcessContext<'_>, effects: &dyn EffectSink) -> Result<()> {
        effects.emit(Effect::new(ctx.node_id, command(&Self::off())?))?;
        Ok(())
    }
}
