//! Sensor Input Node
//!
//! Exposes the latest device sensor sample to the graph. The host writes
//! each incoming sample into the node's `sample` input value; the node picks
//! one axis out of it.

use node_engine::{
    ConfigField, NodeBehavior, NodeCategory, NodeDefinition, PortDataType, PortDefinition, ProcessContext, Result,
    ValueMap,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tandem_protocol::DataSample;

use crate::ports::{outputs, parse_config};
use crate::setup::BuiltinNode;

/// Component of a sample to emit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorAxis {
    X,
    Y,
    Z,
    Alpha,
    Beta,
    Gamma,
    /// Euclidean norm of whichever components the sample has
    #[default]
    Magnitude,
}

impl SensorAxis {
    fn key(self) -> Option<&'static str> {
        match self {
            Self::X => Some("x"),
            Self::Y => Some("y"),
            Self::Z => Some("z"),
            Self::Alpha => Some("alpha"),
            Self::Beta => Some("beta"),
            Self::Gamma => Some("gamma"),
            Self::Magnitude => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SensorInputConfig {
    /// `accelerometer`, `gyroscope`, `orientation` or `custom`
    pub sensor_type: String,
    pub axis: SensorAxis,
    /// Sample name for `custom` sensors
    pub name: Option<String>,
    pub scale: f64,
}

impl Default for SensorInputConfig {
    fn default() -> Self {
        Self {
            sensor_type: "accelerometer".to_string(),
            axis: SensorAxis::Magnitude,
            name: None,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SensorInputNode;

impl SensorInputNode {
    /// Port ID the host writes samples into
    pub const PORT_SAMPLE: &'static str = "sample";
    /// Port ID for the selected axis
    pub const PORT_VALUE: &'static str = "value";

    /// Whether a node with this (unresolved) config listens to `sample`
    pub fn accepts(config: &ValueMap, sample: &DataSample) -> bool {
        let config: SensorInputConfig = parse_config(config).unwrap_or_default();
        match sample {
            DataSample::Accelerometer { .. } => config.sensor_type == "accelerometer",
            DataSample::Gyroscope { .. } => config.sensor_type == "gyroscope",
            DataSample::Orientation { .. } => config.sensor_type == "orientation",
            DataSample::Custom { name, .. } => {
                config.sensor_type == "custom" && config.name.as_deref().map_or(true, |n| n == name)
            }
            DataSample::NodeExecutor { .. } => false,
        }
    }
}

impl BuiltinNode for SensorInputNode {
    const NODE_TYPE: &'static str = "sensor-input";

    fn definition() -> NodeDefinition {
        let defaults = SensorInputConfig::default();
        NodeDefinition::new(Self::NODE_TYPE, NodeCategory::Input, "Sensor Input")
            .with_description("Reads one axis of the latest device sensor sample")
            .input(PortDefinition::data(Self::PORT_SAMPLE, "Sample", PortDataType::Json))
            .output(PortDefinition::data(Self::PORT_VALUE, "Value", PortDataType::Number))
            .config(ConfigField::select(
                "sensorType",
                "Sensor",
                &["accelerometer", "gyroscope", "orientation", "custom"],
                &defaults.sensor_type,
            ))
            .config(ConfigField::select(
                "axis",
                "Axis",
                &["x", "y", "z", "alpha", "beta", "gamma", "magnitude"],
                "magnitude",
            ))
            .config(ConfigField::string("name", "Custom name", "").optional())
            .config(ConfigField::number("scale", "Scale", defaults.scale))
    }
}

impl NodeBehavior for SensorInputNode {
    fn process(&self, inputs: &ValueMap, config: &ValueMap, _ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        let config: SensorInputConfig = parse_config(config)?;
        let Some(sample) = inputs.get(Self::PORT_SAMPLE).filter(|v| v.is_object()) else {
            return Ok(ValueMap::new());
        };
        match read_axis(sample, config.axis) {
            Some(value) => Ok(outputs([(Self::PORT_VALUE, json!(value * config.scale))])),
            None => Ok(ValueMap::new()),
        }
    }
}

fn read_axis(sample: &Value, axis: SensorAxis) -> Option<f64> {
    // Custom samples carry their reading under `value`
    let body = match sample.get("value") {
        Some(Value::Number(n)) => return n.as_f64(),
        Some(inner @ Value::Object(_)) => inner,
        _ => sample,
    };
    let field = |key: &str| body.get(key).and_then(Value::as_f64);

    match axis.key() {
        Some(key) => field(key),
        None => {
            let components: Vec<f64> = ["x", "y", "z", "alpha", "beta", "gamma"]
                .into_iter()
                .filter_map(field)
                .collect();
            if components.is_empty() {
                None
            } else {
                Some(components.iter().map(|c| c * c).sum::<f64>().sqrt())
            }
        }
    }
}
