//! Math Node
//!
//! Binary arithmetic on two number inputs.

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
pub enum MathOperation {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
    Min,
    Max,
    Power,
    Modulo,
}

impl MathOperation {
    const NAMES: [&'static str; 8] = [
        "add", "subtract", "multiply", "divide", "min", "max", "power", "modulo",
    ];

    /// `None` for division or modulo by zero
    pub fn apply(self, a: f64, b: f64) -> Option<f64> {
        let result = match self {
            Self::Add => a + b,
            Self::Subtract => a - b,
            Self::Multiply => a * b,
            Self::Divide if b == 0.0 => return None,
            Self::Divide => a / b,
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Power => a.powf(b),
            Self::Modulo if b == 0.0 => return None,
            Self::Modulo => a.rem_euclid(b),
        };
        result.is_finite().then_some(result)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MathConfig {
    pub operation: MathOperation,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MathNode;

impl MathNode {
    pub const PORT_A: &'static str = "a";
    pub const PORT_B: &'static str = "b";
    pub const PORT_RESULT: &'static str = "result";
}

impl BuiltinNode for MathNode {
    const NODE_TYPE: &'static str = "math";

    fn definition() -> NodeDefinition {
        NodeDefinition::new(Self::NODE_TYPE, NodeCategory::Processing, "Math")
            .with_description("Combines two numbers")
            .input(PortDefinition::data(Self::PORT_A, "A", PortDataType::Number).with_default(json!(0.0)))
            .input(PortDefinition::data(Self::PORT_B, "B", PortDataType::Number).with_default(json!(0.0)))
            .output(PortDefinition::data(Self::PORT_RESULT, "Result", PortDataType::Number))
            .config(ConfigField::select("operation", "Operation", &MathOperation::NAMES, "add"))
    }
}

impl NodeBehavior for MathNode {
    fn process(&self, inputs: &ValueMap, config: &ValueMap, ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        let config: MathConfig = parse_config(config)?;
        let a = number(inputs, Self::PORT_A).unwrap_or_default();
        let b = number(inputs, Self::PORT_B).unwrap_or_default();
        match config.operation.apply(a, b) {
            Some(result) => Ok(outputs([(Self::PORT_RESULT, json!(result))])),
            None => {
                log::debug!("Math node '{}': {:?} of {} and {} is undefined", ctx.node_id, config.operation, a, b);
                Ok(ValueMap::new())
            }
        }
    }
}
