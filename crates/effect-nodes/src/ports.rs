//! Helpers for reading resolved inputs and config

use node_engine::{NodeEngineError, Result, ValueMap};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tandem_protocol::ControlAction;

/// Deserialize a resolved config map into a node's config struct
pub(crate) fn parse_config<T: DeserializeOwned>(config: &ValueMap) -> Result<T> {
    let object: serde_json::Map<String, Value> = config.clone().into_iter().collect();
    serde_json::from_value(Value::Object(object)).map_err(|e| NodeEngineError::invalid_config("config", e.to_string()))
}

pub(crate) fn number(inputs: &ValueMap, port: &str) -> Option<f64> {
    inputs.get(port).and_then(Value::as_f64).filter(|v| v.is_finite())
}

/// Booleans as-is, numbers as "greater than one half"
pub(crate) fn boolean(inputs: &ValueMap, port: &str) -> Option<bool> {
    match inputs.get(port)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v > 0.5),
        _ => None,
    }
}

pub(crate) fn string<'a>(inputs: &'a ValueMap, port: &str) -> Option<&'a str> {
    inputs.get(port).and_then(Value::as_str)
}

pub(crate) fn outputs<const N: usize>(pairs: [(&str, Value); N]) -> ValueMap {
    pairs.into_iter().map(|(port, value)| (port.to_string(), value)).collect()
}

/// Serialize a control action for a `Command` port
pub(crate) fn command(action: &ControlAction) -> Result<Value> {
    Ok(serde_json::to_value(action)?)
}

/// Values on a `multiple` port, or the single value of a plain one
pub(crate) fn each_value<'a>(inputs: &'a ValueMap, port: &str) -> impl Iterator<Item = &'a Value> + 'a {
    let values: Vec<&'a Value> = match inputs.get(port) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(value) => vec![value],
    };
    values.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boolean_accepts_numbers() {
        let inputs = outputs([("a", json!(true)), ("b", json!(0.75)), ("c", json!(0.25)), ("d", json!("yes"))]);
        assert_eq!(boolean(&inputs, "a"), Some(true));
        assert_eq!(boolean(&inputs, "b"), Some(true));
        assert_eq!(boolean(&inputs, "c"), Some(false));
        assert_eq!(boolean(&inputs, "d"), None);
        assert_eq!(boolean(&inputs, "missing"), None);
    }

    #[test]
    fn test_each_value_flattens_arrays() {
        let inputs = outputs([("many", json!([1, 2])), ("one", json!(3)), ("none", Value::Null)]);
        assert_eq!(each_value(&inputs, "many").count(), 2);
        assert_eq!(each_value(&inputs, "one").count(), 1);
        assert_eq!(each_value(&inputs, "none").count(), 0);
    }
}
