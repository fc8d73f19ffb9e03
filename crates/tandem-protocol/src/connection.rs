//! Connection identity shared by the registry, the router and roster payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport-level socket identifier
pub type SocketId = String;

/// Stable client identifier, assigned once per connection
pub type ClientId = String;

/// Role a socket declared at handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Client,
}

impl Role {
    /// Parse a handshake role string
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manager" => Some(Self::Manager),
            "client" => Some(Self::Client),
            _ => None,
        }
    }
}

/// Sender recorded in an envelope's `from` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Manager,
    Client,
    /// Internal origin used for server-initiated gating actions
    Server,
}

impl From<Role> for Origin {
    fn from(role: Role) -> Self {
        match role {
            Role::Manager => Origin::Manager,
            Role::Client => Origin::Client,
        }
    }
}

/// A live connection tracked by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub socket_id: SocketId,
    pub role: Role,
    pub client_id: ClientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub selected: bool,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// Create a record for a freshly connected socket
    pub fn new(
        socket_id: impl Into<SocketId>,
        role: Role,
        client_id: impl Into<ClientId>,
        group: Option<String>,
    ) -> Self {
        Self {
            socket_id: socket_id.into(),
            role,
            client_id: client_id.into(),
            group,
            selected: false,
            connected_at: Utc::now(),
        }
    }

    pub fn is_client(&self) -> bool {
        self.role == Role::Client
    }

    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }

    /// Roster entry for this connection
    pub fn summary(&self) -> ClientSummary {
        ClientSummary {
            client_id: self.client_id.clone(),
            group: self.group.clone(),
            selected: self.selected,
            connected_at: self.connected_at,
        }
    }
}

/// Client entry broadcast to managers in roster updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    pub client_id: ClientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub selected: bool,
    pub connected_at: DateTime<Utc>,
}
