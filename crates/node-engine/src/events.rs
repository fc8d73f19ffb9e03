//! Effect output from sink nodes
//!
//! Pure evaluation never touches the outside world. Sink hooks and disable
//! hooks hand [`Effect`]s to an [`EffectSink`], which abstracts over whatever
//! delivers them (the client's device layer, a manager-side router, a test
//! collector).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// A command produced by a sink or disable hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effect {
    /// Node whose hook produced the effect
    pub node_id: NodeId,
    /// Client the effect is addressed to, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Control command payload (`{"action": ..., ...}`)
    pub command: serde_json::Value,
}

impl Effect {
    pub fn new(node_id: impl Into<String>, command: serde_json::Value) -> Self {
        Self {
            node_id: node_id.into(),
            client_id: None,
            command,
        }
    }

    pub fn for_client(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }
}

/// Trait for receiving effects
pub trait EffectSink: Send + Sync {
    /// Deliver an effect
    ///
    /// Returns an error if the effect could not be delivered (e.g., channel closed)
    fn emit(&self, effect: Effect) -> Result<(), EffectError>;
}

/// Error when delivering effects fails
#[derive(Debug, Clone)]
pub struct EffectError {
    pub message: String,
}

impl std::fmt::Display for EffectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Effect error: {}", self.message)
    }
}

impl std::error::Error for EffectError {}

impl EffectError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// A no-op sink that discards all effects
pub struct NullEffectSink;

impl EffectSink for NullEffectSink {
    fn emit(&self, _effect: Effect) -> Result<(), EffectError> {
        Ok(())
    }
}

/// A vector-based sink that collects effects
///
/// Useful for testing to verify effects were emitted correctly.
#[derive(Default)]
pub struct VecEffectSink {
    effects: Mutex<Vec<Effect>>,
}

impl VecEffectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected effects
    pub fn effects(&self) -> Vec<Effect> {
        self.effects.lock().clone()
    }

    /// Take all collected effects, leaving the sink empty
    pub fn drain(&self) -> Vec<Effect> {
        std::mem::take(&mut *self.effects.lock())
    }

    /// Clear all collected effects
    pub fn clear(&self) {
        self.effects.lock().clear();
    }
}

impl EffectSink for VecEffectSink {
    fn emit(&self, effect: Effect) -> Result<(), EffectError> {
        self.effects.lock().push(effect);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vec_effect_sink() {
        let sink = VecEffectSink::new();
        sink.emit(Effect::new("n1", json!({"action": "stopSound"}))).unwrap();

        let effects = sink.effects();
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].node_id, "n1");

        assert_eq!(sink.drain().len(), 1);
        assert!(sink.effects().is_empty());
    }

    #[test]
    fn test_effect_wire_shape() {
        let effect = Effect::new("n1", json!({"action": "vibrate", "pattern": [100]})).for_client(Some("c1".into()));
        let value = serde_json::to_value(&effect).unwrap();
        assert_eq!(value["nodeId"], "n1");
        assert_eq!(value["clientId"], "c1");
    }

    #[test]
    fn test_null_effect_sink() {
        let sink = NullEffectSink;
        sink.emit(Effect::new("n1", json!(null))).unwrap();
    }
}
