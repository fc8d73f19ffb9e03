//! Screen Color Node
//!
//! Produces a `screenColor` command. The color comes from the `color` input
//! when connected, otherwise from config, and is scaled by `intensity`.
//! Disabling the node sends black.

use node_engine::{
    ConfigField, Effect, EffectSink, NodeBehavior, NodeCategory, NodeDefinition, PortDataType, PortDefinition,
    ProcessContext, Result, ValueMap,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tandem_protocol::message::is_hex_color;
use tandem_protocol::{ControlAction, ScreenMode};

use crate::ports::{command, number, outputs, parse_config, string};
use crate::setup::BuiltinNode;

/// Color sent when the node is disabled
pub const SCREEN_OFF: &str = "#000000";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScreenColorConfig {
    pub color: String,
    pub mode: ScreenMode,
    /// Blink or pulse period
    pub interval_ms: f64,
}

impl Default for ScreenColorConfig {
    fn default() -> Self {
        Self {
            color: "#ffffff".to_string(),
            mode: ScreenMode::Solid,
            interval_ms: 500.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScreenColorNode;

impl ScreenColorNode {
    pub const PORT_INTENSITY: &'static str = "intensity";
    pub const PORT_COLOR: &'static str = "color";
    pub const PORT_COMMAND: &'static str = "cmd";
}

impl BuiltinNode for ScreenColorNode {
    const NODE_TYPE: &'static str = "screen-color";

    fn definition() -> NodeDefinition {
        let defaults = ScreenColorConfig::default();
        NodeDefinition::new(Self::NODE_TYPE, NodeCategory::Effect, "Screen Color")
            .with_description("Fills the client screen with a color")
            .input(PortDefinition::data(Self::PORT_INTENSITY, "Intensity", PortDataType::Number).with_default(json!(1.0)))
            .input(PortDefinition::data(Self::PORT_COLOR, "Color", PortDataType::Color))
            .output(PortDefinition::sink(Self::PORT_COMMAND, "Command", PortDataType::Command))
            .config(ConfigField::color("color", "Color", defaults.color))
            .config(ConfigField::select("mode", "Mode", &["solid", "blink", "pulse"], "solid"))
            .config(
                ConfigField::number("intervalMs", "Interval (ms)", defaults.interval_ms)
                    .with_range(Some(1.0), None),
            )
    }
}

impl NodeBehavior for ScreenColorNode {
    fn process(&self, inputs: &ValueMap, config: &ValueMap, _ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        let config: ScreenColorConfig = parse_config(config)?;
        let base = string(inputs, Self::PORT_COLOR)
            .filter(|c| is_hex_color(c))
            .unwrap_or(config.color.as_str());
        let intensity = number(inputs, Self::PORT_INTENSITY).unwrap_or(1.0);
        let color = scale_color(base, intensity).unwrap_or_else(|| SCREEN_OFF.to_string());

        let interval_ms = match config.mode {
            ScreenMode::Solid => None,
            ScreenMode::Blink | ScreenMode::Pulse => Some(config.interval_ms.round() as u32),
        };
        let action = ControlAction::ScreenColor {
            color,
            mode: config.mode,
            interval_ms,
        };
        Ok(outputs([(Self::PORT_COMMAND, command(&action)?)]))
    }

    fn on_disable(&self, _config: &ValueMap, ctx: &ProcessContext<'_>, effects: &dyn EffectSink) -> Result<()> {
        let off = ControlAction::ScreenColor {
            color: SCREEN_OFF.to_string(),
            mode: ScreenMode::Solid,
            interval_ms: None,
        };
        effects.emit(Effect::new(ctx.node_id, command(&off)?))?;
        Ok(())
    }
}

/// Multiply each channel of `#rgb`/`#rrggbb` by `intensity` (clamped to 0..=1)
pub fn scale_color(hex: &str, intensity: f64) -> Option<String> {
    let digits = hex.strip_prefix('#')?;
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return None,
    };
    let factor = intensity.clamp(0.0, 1.0);
    let mut out = String::from("#");
    for i in 0..3 {
        let channel = u8::from_str_radix(expanded.get(i * 2..i * 2 + 2)?, 16).ok()?;
        let scaled = (f64::from(channel) * factor).round() as u8;
        out.push_str(&format!("{:02x}", scaled));
    }
    Some(out)
}
