//! Executor commands and status reports
//!
//! Managers drive a client's executor with `plugin` envelopes
//! (`pluginId = node-executor`) whose `command` is one of `deploy`, `start`,
//! `stop` or `remove`. Clients may not send `plugin` messages, so their
//! acknowledgements travel back as `data` messages carrying a
//! `nodeExecutor` sample.

use node_engine::{GraphState, NodeGroup};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tandem_protocol::constants::executor::PLUGIN_ID;
use tandem_protocol::{DataSample, Message, Origin, PluginMessage, TargetSelector};

use crate::error::{ExecutorError, Result};

/// A lifecycle command for one loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "camelCase")]
pub enum ExecutorCommand {
    #[serde(rename_all = "camelCase")]
    Deploy {
        loop_id: String,
        graph: GraphState,
        #[serde(default)]
        groups: Vec<NodeGroup>,
    },
    #[serde(rename_all = "camelCase")]
    Start { loop_id: String },
    #[serde(rename_all = "camelCase")]
    Stop { loop_id: String },
    #[serde(rename_all = "camelCase")]
    Remove { loop_id: String },
}

impl ExecutorCommand {
    pub fn loop_id(&self) -> &str {
        match self {
            Self::Deploy { loop_id, .. }
            | Self::Start { loop_id }
            | Self::Stop { loop_id }
            | Self::Remove { loop_id } => loop_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Deploy { .. } => "deploy",
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Remove { .. } => "remove",
        }
    }

    /// Plugin envelope from a manager to one client
    pub fn to_message(&self, client_id: &str) -> Result<Message> {
        let mut value = serde_json::to_value(self)?;
        let payload = value.get_mut("payload").map(Value::take).unwrap_or(Value::Null);
        Ok(Message::plugin(
            Origin::Manager,
            TargetSelector::client(client_id),
            PLUGIN_ID,
            self.name(),
            payload,
        ))
    }

    /// Decode the command carried by a plugin envelope
    pub fn from_plugin(message: &PluginMessage) -> Result<Self> {
        if message.plugin_id != PLUGIN_ID {
            return Err(ExecutorError::WrongPlugin(message.plugin_id.clone()));
        }
        if !matches!(message.command.as_str(), "deploy" | "start" | "stop" | "remove") {
            return Err(ExecutorError::UnknownCommand(message.command.clone()));
        }
        let tagged = json!({ "command": message.command, "payload": message.payload });
        Ok(serde_json::from_value(tagged)?)
    }
}

/// Status event kinds reported by a client executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorEvent {
    Deployed,
    Started,
    Stopped,
    Removed,
    Rejected,
    /// Anything newer peers send that this build does not know
    #[serde(other)]
    Unknown,
}

/// A status report from a client executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorReport {
    pub event: ExecutorEvent,
    pub loop_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutorReport {
    pub fn new(event: ExecutorEvent, loop_id: impl Into<String>) -> Self {
        Self {
            event,
            loop_id: loop_id.into(),
            error: None,
        }
    }

    pub fn rejected(loop_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            event: ExecutorEvent::Rejected,
            loop_id: loop_id.into(),
            error: Some(error.into()),
        }
    }

    pub fn to_sample(&self) -> Result<DataSample> {
        Ok(DataSample::NodeExecutor {
            report: serde_json::to_value(self)?,
        })
    }

    /// Data message a client sends back to the managers
    pub fn to_message(&self) -> Result<Message> {
        Ok(Message::data(self.to_sample()?))
    }

    /// Report carried by a sample, if it is a `nodeExecutor` sample
    pub fn from_sample(sample: &DataSample) -> Option<Self> {
        let DataSample::NodeExecutor { report } = sample else {
            return None;
        };
        match serde_json::from_value(report.clone()) {
            Ok(report) => Some(report),
            Err(e) => {
                log::warn!("Ignoring malformed executor report: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_engine::GraphBuilder;

    fn plugin(message: Message) -> PluginMessage {
        match message {
            Message::Plugin(m) => m,
            other => panic!("expected plugin message, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_deploy_message_shape() {
        let graph = GraphBuilder::new().add_node("n1", "number").build();
        let command = ExecutorCommand::Deploy {
            loop_id: "loop-a".to_string(),
            graph,
            groups: Vec::new(),
        };
        let message = plugin(command.to_message("phone-1").unwrap());

        assert_eq!(message.plugin_id, PLUGIN_ID);
        assert_eq!(message.command, "deploy");
        assert_eq!(message.target, TargetSelector::client("phone-1"));
        assert_eq!(message.payload["loopId"], json!("loop-a"));
        assert_eq!(message.payload["graph"]["nodes"][0]["id"], json!("n1"));

        assert_eq!(ExecutorCommand::from_plugin(&message).unwrap(), command);
    }

    #[test]
    fn test_rejects_foreign_plugin_and_unknown_command() {
        let mut message = plugin(
            ExecutorCommand::Stop {
                loop_id: "loop-a".to_string(),
            }
            .to_message("c")
            .unwrap(),
        );
        message.command = "explode".to_string();
        assert!(matches!(
            ExecutorCommand::from_plugin(&message),
            Err(ExecutorError::UnknownCommand(_))
        ));

        message.plugin_id = "other".to_string();
        assert!(matches!(
            ExecutorCommand::from_plugin(&message),
            Err(ExecutorError::WrongPlugin(_))
        ));
    }

    #[test]
    fn test_report_through_data_sample() {
        let report = ExecutorReport::rejected("loop-a", "cycle");
        let sample = report.to_sample().unwrap();
        assert_eq!(ExecutorReport::from_sample(&sample), Some(report));

        let unknown = DataSample::NodeExecutor {
            report: json!({ "event": "paused", "loopId": "loop-a" }),
        };
        assert_eq!(
            ExecutorReport::from_sample(&unknown).map(|r| r.event),
            Some(ExecutorEvent::Unknown)
        );
    }
}
