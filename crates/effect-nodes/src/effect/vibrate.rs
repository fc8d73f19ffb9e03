//! Vibrate Node
//!
//! Emits a `vibrate` command on every tick its `trigger` input is true. The
//! pattern is `pulses` buzzes of `durationMs`, separated by `pauseMs`.
//! Disabling the node sends an empty pattern, which cancels vibration.

use node_engine::{
    ConfigField, Effect, EffectSink, NodeBehavior, NodeCategory, NodeDefinition, PortDataType, PortDefinition,
    ProcessContext, Result, ValueMap,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tandem_protocol::ControlAction;

use crate::ports::{boolean, command, outputs, parse_config};
use crate::setup::BuiltinNode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VibrateConfig {
    pub duration_ms: f64,
    pub pause_ms: f64,
    pub pulses: f64,
}

impl Default for VibrateConfig {
    fn default() -> Self {
        Self {
            duration_ms: 200.0,
            pause_ms: 100.0,
            pulses: 1.0,
        }
    }
}

impl VibrateConfig {
    /// Alternating on/off durations, starting and ending with "on"
    pub fn pattern(&self) -> Vec<u32> {
        let pulses = self.pulses.round().max(1.0) as usize;
        let on = self.duration_ms.round().max(0.0) as u32;
        let off = self.pause_ms.round().max(0.0) as u32;
        let mut pattern = Vec::with_capacity(pulses * 2 - 1);
        for i in 0..pulses {
            if i > 0 {
                pattern.push(off);
            }
            pattern.push(on);
        }
        pattern
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VibrateNode;

impl VibrateNode {
    pub const PORT_TRIGGER: &'static str = "trigger";
    pub const PORT_COMMAND: &'static str = "cmd";
}

impl BuiltinNode for VibrateNode {
    const NODE_TYPE: &'static str = "vibrate";

    fn definition() -> NodeDefinition {
        let defaults = VibrateConfig::default();
        NodeDefinition::new(Self::NODE_TYPE, NodeCategory::Effect, "Vibrate")
            .with_description("Buzzes the client while triggered")
            .input(PortDefinition::data(Self::PORT_TRIGGER, "Trigger", PortDataType::Boolean).with_default(json!(false)))
            .output(PortDefinition::sink(Self::PORT_COMMAND, "Command", PortDataType::Command))
            .config(
                ConfigField::number("durationMs", "Duration (ms)", defaults.duration_ms)
                    .with_range(Some(1.0), Some(5000.0)),
            )
            .config(ConfigField::number("pauseMs", "Pause (ms)", defaults.pause_ms).with_range(Some(0.0), Some(5000.0)))
            .config(ConfigField::number("pulses", "Pulses", defaults.pulses).with_range(Some(1.0), Some(32.0)))
    }
}

impl NodeBehavior for VibrateNode {
    fn process(&self, inputs: &ValueMap, config: &ValueMap, _ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        if !boolean(inputs, Self::PORT_TRIGGER).unwrap_or(false) {
            return Ok(ValueMap::new());
        }
        let config: VibrateConfig = parse_config(config)?;
        let action = ControlAction::Vibrate {
            pattern: config.pattern(),
        };
        Ok(outputs([(Self::PORT_COMMAND, command(&action)?)]))
    }

    fn on_disable(&self, _config: &ValueMap, ctx: &ProcessContext<'_>, effects: &dyn EffectSink) -> Result<()> {
        let stop = ControlAction::Vibrate { pattern: Vec::new() };
        effects.emit(Effect::new(ctx.node_id, command(&stop)?))?;
        Ok(())
    }
}
