//! Websocket text frames
//!
//! Every text frame is `{"event": <name>, "data": <payload>}`. The `message`
//! event carries a raw envelope that is validated separately so a bad
//! envelope never poisons frame decoding.

use serde::{Deserialize, Serialize};

use crate::connection::ClientId;
use crate::error::{ProtocolError, Result};
use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePing {
    pub client_timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePong {
    pub client_timestamp: f64,
    pub server_timestamp: f64,
}

/// Manager request to replace the selected-client set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectClients {
    pub client_ids: Vec<ClientId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Frame {
    #[serde(rename = "message")]
    Message(serde_json::Value),
    #[serde(rename = "time:ping")]
    TimePing(TimePing),
    #[serde(rename = "time:pong")]
    TimePong(TimePong),
    #[serde(rename = "select:clients")]
    SelectClients(SelectClients),
}

impl Frame {
    /// Wrap a typed envelope
    pub fn message(message: &Message) -> Result<Self> {
        Ok(Self::Message(message.to_json()?))
    }

    pub fn event(&self) -> &'static str {
        use crate::constants::events;
        match self {
            Self::Message(_) => events::MESSAGE,
            Self::TimePing(_) => events::TIME_PING,
            Self::TimePong(_) => events::TIME_PONG,
            Self::SelectClients(_) => events::SELECT_CLIENTS,
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidFrame(e.to_string()))
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
