//! Client Object Node
//!
//! Anchor of a loop: the device the loop drives. Every command that reaches
//! its `in` sink is checked as a control action and forwarded as an
//! [`Effect`] addressed to the configured client.

use node_engine::{
    ConfigField, Effect, EffectSink, NodeBehavior, NodeCategory, NodeDefinition, PortDataType, PortDefinition,
    ProcessContext, Result, ValueMap, CLIENT_ID_KEY,
};
use serde::{Deserialize, Serialize};
use tandem_protocol::ControlAction;

use crate::ports::{each_value, parse_config};
use crate::setup::BuiltinNode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientObjectConfig {
    pub client_id: Option<String>,
}

impl ClientObjectConfig {
    /// Trimmed client id, if one is set
    pub fn client(&self) -> Option<String> {
        self.client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClientObjectNode;

impl ClientObjectNode {
    pub const PORT_IN: &'static str = "in";
}

impl BuiltinNode for ClientObjectNode {
    const NODE_TYPE: &'static str = node_engine::CLIENT_ANCHOR_TYPE;

    fn definition() -> NodeDefinition {
        NodeDefinition::new(Self::NODE_TYPE, NodeCategory::Output, "Client")
            .with_description("Delivers commands to one connected client")
            .input(PortDefinition::sink(Self::PORT_IN, "Commands", PortDataType::Command).multiple())
            .config(ConfigField::string(CLIENT_ID_KEY, "Client", "").optional())
    }
}

impl NodeBehavior for ClientObjectNode {
    fn process(&self, _inputs: &ValueMap, _config: &ValueMap, _ctx: &ProcessContext<'_>) -> Result<ValueMap> {
        Ok(ValueMap::new())
    }

    fn on_sink(
        &self,
        inputs: &ValueMap,
        config: &ValueMap,
        ctx: &ProcessContext<'_>,
        effects: &dyn EffectSink,
    ) -> Result<()> {
        let config: ClientObjectConfig = parse_config(config)?;
        let client = config.client();
        for value in each_value(inputs, Self::PORT_IN) {
            let action = match serde_json::from_value::<ControlAction>(value.clone()) {
                Ok(action) => action,
                Err(e) => {
                    log::warn!("Node '{}' dropped malformed command: {}", ctx.node_id, e);
                    continue;
                }
            };
            if let Err(e) = action.validate() {
                log::warn!("Node '{}' dropped invalid command: {}", ctx.node_id, e);
                continue;
            }
            effects.emit(Effect::new(ctx.node_id, value.clone()).for_client(client.clone()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outputs;
    use node_engine::VecEffectSink;
    use serde_json::json;

    #[test]
    fn test_forwards_valid_commands_to_client() {
        let sink = VecEffectSink::new();
        let ctx = ProcessContext {
            node_id: "anchor",
            time: 0.0,
            delta_time: 0.0,
        };
        let inputs = outputs([(
            "in",
            json!([
                { "action": "vibrate", "pattern": [100] },
                { "action": "screenColor", "color": "nope" },
                { "action": "teleport" }
            ]),
        )]);
        let config = outputs([("clientId", json!("  phone-1 "))]);

        ClientObjectNode.on_sink(&inputs, &config, &ctx, &sink).unwrap();

        let effects = sink.effects();
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].node_id, "anchor");
        assert_eq!(effects[0].client_id.as_deref(), Some("phone-1"));
        assert_eq!(effects[0].command["action"], json!("vibrate"));
    }

    #[test]
    fn test_blank_client_is_none() {
        let config = ClientObjectConfig {
            client_id: Some("   ".to_string()),
        };
        assert_eq!(config.client(), None);
    }
}
