//! Node type definitions and config schemas
//!
//! A [`NodeDefinition`] is the static description of a node type: its ports,
//! category and the schema of its per-instance config. Config maps coming in
//! from authoring or from the wire are checked against the schema once, at the
//! edge, by [`NodeDefinition::resolve_config`]; behaviors downstream read the
//! resolved map and can rely on its shape.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{NodeEngineError, Result};
use crate::types::{NodeCategory, PortDefinition, ValueMap};

/// Allowed values for one config key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigFieldKind {
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Boolean,
    String,
    Color,
    Select {
        options: Vec<String>,
    },
}

/// One entry of a node's config schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigField {
    pub key: String,
    pub label: String,
    pub kind: ConfigFieldKind,
    /// Used when the instance config omits the key; `null` means optional
    #[serde(default)]
    pub default: serde_json::Value,
}

impl ConfigField {
    pub fn number(key: impl Into<String>, label: impl Into<String>, default: f64) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind: ConfigFieldKind::Number { min: None, max: None },
            default: serde_json::json!(default),
        }
    }

    pub fn boolean(key: impl Into<String>, label: impl Into<String>, default: bool) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind: ConfigFieldKind::Boolean,
            default: serde_json::json!(default),
        }
    }

    pub fn string(key: impl Into<String>, label: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind: ConfigFieldKind::String,
            default: serde_json::Value::String(default.into()),
        }
    }

    pub fn color(key: impl Into<String>, label: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind: ConfigFieldKind::Color,
            default: serde_json::Value::String(default.into()),
        }
    }

    pub fn select(key: impl Into<String>, label: impl Into<String>, options: &[&str], default: &str) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind: ConfigFieldKind::Select {
                options: options.iter().map(|o| o.to_string()).collect(),
            },
            default: serde_json::Value::String(default.to_string()),
        }
    }

    /// Bound a number field
    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        if let ConfigFieldKind::Number { min: lo, max: hi } = &mut self.kind {
            *lo = min;
            *hi = max;
        }
        self
    }

    /// Key may be absent after resolution
    pub fn optional(mut self) -> Self {
        self.default = serde_json::Value::Null;
        self
    }

    fn check(&self, value: &serde_json::Value) -> Result<()> {
        let bad = |message: String| Err(NodeEngineError::invalid_config(&self.key, message));
        match &self.kind {
            ConfigFieldKind::Number { min, max } => {
                let Some(n) = value.as_f64() else {
                    return bad(format!("expected number, got {}", value));
                };
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return bad(format!("{} outside [{:?}, {:?}]", n, min, max));
                }
            }
            ConfigFieldKind::Boolean if !value.is_boolean() => {
                return bad(format!("expected boolean, got {}", value));
            }
            ConfigFieldKind::String if !value.is_string() => {
                return bad(format!("expected string, got {}", value));
            }
            ConfigFieldKind::Color => match value.as_str() {
                Some(s) if is_color(s) => {}
                _ => return bad(format!("expected #rgb or #rrggbb color, got {}", value)),
            },
            ConfigFieldKind::Select { options } => match value.as_str() {
                Some(s) if options.iter().any(|o| o == s) => {}
                _ => return bad(format!("expected one of {:?}, got {}", options, value)),
            },
            _ => {}
        }
        Ok(())
    }
}

fn is_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Definition of a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    /// Unique type identifier (e.g., "screen-color")
    pub node_type: String,
    /// Category for grouping in the palette
    pub category: NodeCategory,
    /// Human-readable label
    pub label: String,
    /// Description of what the node does
    #[serde(default)]
    pub description: String,
    /// Input port definitions
    #[serde(default)]
    pub inputs: Vec<PortDefinition>,
    /// Output port definitions
    #[serde(default)]
    pub outputs: Vec<PortDefinition>,
    /// Per-instance config schema
    #[serde(default)]
    pub config_schema: Vec<ConfigField>,
}

impl NodeDefinition {
    pub fn new(node_type: impl Into<String>, category: NodeCategory, label: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            category,
            label: label.into(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            config_schema: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, port: PortDefinition) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn output(mut self, port: PortDefinition) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn config(mut self, field: ConfigField) -> Self {
        self.config_schema.push(field);
        self
    }

    pub fn find_input(&self, port_id: &str) -> Option<&PortDefinition> {
        self.inputs.iter().find(|p| p.id == port_id)
    }

    pub fn find_output(&self, port_id: &str) -> Option<&PortDefinition> {
        self.outputs.iter().find(|p| p.id == port_id)
    }

    /// Whether any input receives sink values
    pub fn has_sink_inputs(&self) -> bool {
        self.inputs.iter().any(PortDefinition::is_sink)
    }

    /// Structural checks run at registration
    ///
    /// Sinks are leaves: a definition with sink inputs may not declare data
    /// outputs.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| {
            Err(NodeEngineError::InvalidDefinition {
                node_type: self.node_type.clone(),
                message,
            })
        };

        if self.node_type.is_empty() {
            return invalid("node type must not be empty".to_string());
        }

        for (side, ports) in [("input", &self.inputs), ("output", &self.outputs)] {
            let mut seen = HashSet::new();
            for port in ports {
                if !seen.insert(port.id.as_str()) {
                    return invalid(format!("duplicate {} port '{}'", side, port.id));
                }
            }
        }

        if self.has_sink_inputs() {
            if let Some(port) = self.outputs.iter().find(|p| !p.is_sink()) {
                return invalid(format!(
                    "declares sink inputs and data output '{}'; sinks must be leaves",
                    port.id
                ));
            }
        }

        let mut keys = HashSet::new();
        for field in &self.config_schema {
            if !keys.insert(field.key.as_str()) {
                return invalid(format!("duplicate config key '{}'", field.key));
            }
            if !field.default.is_null() {
                field.check(&field.default).or_else(|e| invalid(e.to_string()))?;
            }
        }

        Ok(())
    }

    /// Fill schema defaults into `config` and check every declared key
    ///
    /// Keys the schema does not declare pass through unchanged.
    pub fn resolve_config(&self, config: &ValueMap) -> Result<ValueMap> {
        let mut resolved = config.clone();
        for field in &self.config_schema {
            match config.get(&field.key) {
                Some(value) if !value.is_null() => field.check(value)?,
                _ if field.default.is_null() => {
                    resolved.remove(&field.key);
                }
                _ => {
                    resolved.insert(field.key.clone(), field.default.clone());
                }
            }
        }
        Ok(resolved)
    }
}
