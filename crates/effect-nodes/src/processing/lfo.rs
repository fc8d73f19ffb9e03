//! LFO Node
//!
//! Low-frequency oscillator driven by engine time. Output swings between
//! `offset` and `offset + amplitude`.

use std::f64::consts::TAU;

use node_engine::{
    ConfigField, NodeBehavior, NodeCategory, NodeDefinition, PortDataType, PortDefinition, ProcessContext, Result,
    ValueMap,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ports::{number, outputs, parse_config};
use crate::setup::BuiltinNode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

impl Waveform {
    /// Unipolar level in `[0, 1]` at cycle position `phase` in `[0, 1)`
    pub fn level(self, phase: f64) -> f64 {
        match self {
            Self::Sine => 0.5 - 0.5 * (TAU * phase).cos(),
            Self::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Triangle => 1.0 - (2.0 * phase - 1.0).abs(),
            Self::Sawtooth => phase,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LfoConfig {
    /// Cycles per second
    pub frequency: f64,
    pub waveform: Waveform,
    pub amplitude: f64,
    pub offset: f64,
    /// Cycle offset in `[0, 1)`
    pub phase: f64,
}

impl Default for LfoConfig {
    fn default() -> Self {
        Self {
            frequency: 1.0,
            waveform: Waveform::Sine,
            amplitude: 1.0,
            offset: 0.0,
            phase: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LfoNode;

impl LfoNode {
    /// Optional frequency override
    pub const PORT_FREQUENCY: &'static str = "frequency";
    pub const PORT_VALUE: &'static str = "value";
}

impl BuiltinNode for LfoNode {
    const NODE_TYPE: &'static str = "lfo";

    fn definition() -> NodeDefinition {
        let defaults = LfoConfig::default();
        NodeDefinition::new(Self::NODE_TYPE, NodeCategory::Processing, "LFO")
            .with_description("Oscillates over time")
            .input(PortDefinition::data(Self::PORT_FREQUENCY, "Frequency", PortDataType::Number))
            .output(PortDefinition::data(Self::PORT_VALUE, "Value", PortDataType::Number))
            .config(ConfigField::number("frequency", "Frequency", defaults.frequency).with_range(Some(0.0), Some(50.0)))
            .config(ConfigField::select(
                "waveform",
                "Waveform",
                &["sine", "square", "triangle", "sawtooth"],
                "sine",
            ))
            .config(ConfigField::number("amplitude", "Amplitude", defaults.amplitude))
            .config(ConfigField::number("offset", "Offset", defaults.offset))
            .config(ConfigField::number("phase", "Phase", defaults.phase).with_range(Some(0.0), Some(1.0)))
    }
}

impl NodeBehavior for LfoNode {
    fn process(&self, inputs: &ValueMap, config: &ValueMap, ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        let config: LfoConfig = parse_config(config)?;
        let frequency = number(inputs, Self::PORT_FREQUENCY).unwrap_or(config.frequency).max(0.0);
        let phase = (frequency * ctx.time + config.phase).rem_euclid(1.0);
        let value = config.offset + config.amplitude * config.waveform.level(phase);
        Ok(outputs([(Self::PORT_VALUE, json!(value))]))
    }
}
