//! Live connection registry
//!
//! Owned exclusively by the hub task. Records are created on connect and
//! dropped on disconnect; a client id is fixed for the lifetime of its
//! record. Identity continuity across reconnects is the caller's business:
//! the registry reuses whatever id the handshake hands it.

use std::collections::HashMap;

use tandem_protocol::{ClientId, ClientSummary, ConnectionRecord, Role, SocketId};

use crate::error::{Result, ServerError};

/// Identity a peer presents at handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Stable per-device id, persisted by the peer
    pub device_id: Option<String>,
    /// Per-tab or per-process id
    pub instance_id: Option<String>,
    /// Id handed out on a previous connection, if the peer kept it
    pub assigned_client_id: Option<ClientId>,
}

/// Everything the handshake tells us about a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionMetadata {
    pub role: Role,
    pub group: Option<String>,
    pub identity: ClientIdentity,
}

impl ConnectionMetadata {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            group: None,
            identity: ClientIdentity::default(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<ClientId>) -> Self {
        self.identity.assigned_client_id = Some(client_id.into());
        self
    }

    /// Parse websocket query parameters
    ///
    /// `role` defaults to `client`; `group`, `deviceId`, `instanceId` and
    /// `clientId` are optional and ignored when blank.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let field = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let role = match field("role") {
            None => Role::Client,
            Some(role) => Role::parse(&role).ok_or_else(|| ServerError::handshake(format!("unknown role '{}'", role)))?,
        };
        Ok(Self {
            role,
            group: field("group"),
            identity: ClientIdentity {
                device_id: field("deviceId"),
                instance_id: field("instanceId"),
                assigned_client_id: field("clientId"),
            },
        })
    }
}

/// Result of registering a socket
#[derive(Debug, Clone)]
pub struct Registration {
    pub record: ConnectionRecord,
    /// Previous record with the same client id, now discarded
    pub replaced: Option<ConnectionRecord>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// In connection order
    records: Vec<ConnectionRecord>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record a new socket
    ///
    /// Reuses the identity's assigned id when present, otherwise derives one
    /// from the device id or generates a fresh one. A live record of the same
    /// role holding that id is discarded in favor of the new socket; an id
    /// held by the other role is never taken over, the newcomer gets a fresh
    /// one instead.
    pub fn register_connection(&mut self, socket_id: impl Into<SocketId>, metadata: ConnectionMetadata) -> Registration {
        let socket_id = socket_id.into();
        let mut client_id = Self::resolve_client_id(&metadata);

        // Only a peer of the same role may take over a live id
        if let Some(holder) = self
            .records
            .iter()
            .find(|r| r.client_id == client_id && r.role != metadata.role)
        {
            let fresh = Self::generated_id(metadata.role);
            log::warn!(
                "{:?} handshake on socket '{}' asked for id '{}' held by a {:?}, assigning '{}'",
                metadata.role,
                socket_id,
                client_id,
                holder.role,
                fresh
            );
            client_id = fresh;
        }

        let replaced = self
            .records
            .iter()
            .position(|r| r.client_id == client_id)
            .map(|index| self.records.remove(index));
        if let Some(old) = &replaced {
            log::info!(
                "Client '{}' reconnected on socket '{}', dropping socket '{}'",
                client_id,
                socket_id,
                old.socket_id
            );
        }
        // A socket id is registered at most once
        self.records.retain(|r| r.socket_id != socket_id);

        let record = ConnectionRecord::new(socket_id, metadata.role, client_id, metadata.group);
        log::debug!(
            "Registered {:?} '{}' on socket '{}' (group {:?})",
            record.role,
            record.client_id,
            record.socket_id,
            record.group
        );
        self.records.push(record.clone());
        Registration { record, replaced }
    }

    fn resolve_client_id(metadata: &ConnectionMetadata) -> ClientId {
        let identity = &metadata.identity;
        if let Some(id) = &identity.assigned_client_id {
            return id.clone();
        }
        let prefix = Self::id_prefix(metadata.role);
        match (&identity.device_id, &identity.instance_id) {
            (Some(device), Some(instance)) => format!("{}-{}-{}", prefix, device, instance),
            (Some(device), None) => format!("{}-{}", prefix, device),
            _ => Self::generated_id(metadata.role),
        }
    }

    fn id_prefix(role: Role) -> &'static str {
        match role {
            Role::Manager => "manager",
            Role::Client => "client",
        }
    }

    fn generated_id(role: Role) -> ClientId {
        format!("{}-{}", Self::id_prefix(role), uuid::Uuid::new_v4().simple())
    }

    /// Remove a socket's record
    pub fn disconnect(&mut self, socket_id: &str) -> Option<ConnectionRecord> {
        let index = self.records.iter().position(|r| r.socket_id == socket_id)?;
        let record = self.records.remove(index);
        log::debug!("Unregistered '{}' (socket '{}')", record.client_id, socket_id);
        Some(record)
    }

    pub fn get(&self, socket_id: &str) -> Option<&ConnectionRecord> {
        self.records.iter().find(|r| r.socket_id == socket_id)
    }

    pub fn find_client(&self, client_id: &str) -> Option<&ConnectionRecord> {
        self.records.iter().find(|r| r.client_id == client_id)
    }

    /// Mark exactly `client_ids` as selected; returns how many matched
    pub fn set_client_selected(&mut self, client_ids: &[ClientId]) -> usize {
        let mut matched = 0;
        for record in self.records.iter_mut().filter(|r| r.is_client()) {
            record.selected = client_ids.contains(&record.client_id);
            if record.selected {
                matched += 1;
            }
        }
        matched
    }

    /// Toggle one client's selection
    pub fn set_selected(&mut self, client_id: &str, selected: bool) -> bool {
        match self.records.iter_mut().find(|r| r.is_client() && r.client_id == client_id) {
            Some(record) => {
                record.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Connected clients in connection order
    pub fn get_all_clients(&self) -> Vec<&ConnectionRecord> {
        self.records.iter().filter(|r| r.is_client()).collect()
    }

    pub fn managers(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.records.iter().filter(|r| r.is_manager())
    }

    pub fn selected_clients(&self) -> Vec<&ConnectionRecord> {
        self.records.iter().filter(|r| r.is_client() && r.selected).collect()
    }

    /// Roster payload for managers
    pub fn roster(&self) -> Vec<ClientSummary> {
        self.get_all_clients().into_iter().map(ConnectionRecord::summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_metadata_from_params() {
        let meta = ConnectionMetadata::from_params(&params(&[
            ("role", "manager"),
            ("group", " display "),
            ("clientId", ""),
            ("deviceId", "dev-1"),
        ]))
        .unwrap();
        assert_eq!(meta.role, Role::Manager);
        assert_eq!(meta.group.as_deref(), Some("display"));
        assert_eq!(meta.identity.assigned_client_id, None);
        assert_eq!(meta.identity.device_id.as_deref(), Some("dev-1"));

        assert_eq!(ConnectionMetadata::from_params(&HashMap::new()).unwrap().role, Role::Client);
        assert!(ConnectionMetadata::from_params(&params(&[("role", "admin")])).is_err());
    }

    #[test]
    fn test_register_and_disconnect() {
        let mut registry = ConnectionRegistry::new();
        let a = registry.register_connection("s1", ConnectionMetadata::new(Role::Client).with_client_id("a"));
        registry.register_connection("s2", ConnectionMetadata::new(Role::Manager));
        assert_eq!(a.record.client_id, "a");
        assert!(a.replaced.is_none());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_all_clients().len(), 1);
        assert_eq!(registry.managers().count(), 1);

        let gone = registry.disconnect("s1").unwrap();
        assert!(gone.is_client());
        assert!(registry.disconnect("s1").is_none());
        assert!(registry.get_all_clients().is_empty());
    }

    #[test]
    fn test_reconnect_replaces_old_record() {
        let mut registry = ConnectionRegistry::new();
        registry.register_connection("s1", ConnectionMetadata::new(Role::Client).with_client_id("a"));
        let again = registry.register_connection("s2", ConnectionMetadata::new(Role::Client).with_client_id("a"));

        assert_eq!(again.replaced.map(|r| r.socket_id).as_deref(), Some("s1"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find_client("a").map(|r| r.socket_id.as_str()), Some("s2"));
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let mut registry = ConnectionRegistry::new();
        let a = registry.register_connection("s1", ConnectionMetadata::new(Role::Client));
        let b = registry.register_connection("s2", ConnectionMetadata::new(Role::Client));
        assert_ne!(a.record.client_id, b.record.client_id);
        assert!(a.record.client_id.starts_with("client-"));
    }

    #[test]
    fn test_selection_replaces_set() {
        let mut registry = ConnectionRegistry::new();
        for (socket, id) in [("s1", "a"), ("s2", "b"), ("s3", "c")] {
            registry.register_connection(socket, ConnectionMetadata::new(Role::Client).with_client_id(id));
        }

        assert_eq!(registry.set_client_selected(&["a".to_string(), "c".to_string(), "zz".to_string()]), 2);
        let selected: Vec<&str> = registry.selected_clients().iter().map(|r| r.client_id.as_str()).collect();
        assert_eq!(selected, vec!["a", "c"]);

        registry.set_client_selected(&["b".to_string()]);
        assert!(registry.set_selected("c", true));
        assert!(!registry.set_selected("nobody", true));
        let roster = registry.roster();
        assert_eq!(roster.iter().filter(|c| c.selected).count(), 2);
        assert!(!roster[0].selected);
    }

    #[test]
    fn test_client_cannot_take_over_manager_id() {
        let mut registry = ConnectionRegistry::new();
        registry.register_connection("m1", ConnectionMetadata::new(Role::Manager).with_client_id("boss"));
        let intruder = registry.register_connection("c1", ConnectionMetadata::new(Role::Client).with_client_id("boss"));

        assert!(intruder.replaced.is_none());
        assert_ne!(intruder.record.client_id, "boss");
        assert!(intruder.record.client_id.starts_with("client-"));
        assert_eq!(registry.managers().count(), 1);
        assert_eq!(registry.find_client("boss").map(|r| r.socket_id.as_str()), Some("m1"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_derived_manager_id_is_not_stolen_by_client() {
        let mut registry = ConnectionRegistry::new();
        let mut manager = ConnectionMetadata::new(Role::Manager);
        manager.identity.device_id = Some("ipad".to_string());
        let manager = registry.register_connection("m1", manager);
        assert_eq!(manager.record.client_id, "manager-ipad");

        let client = registry.register_connection("c1", ConnectionMetadata::new(Role::Client).with_client_id("manager-ipad"));
        assert!(client.replaced.is_none());
        assert_eq!(registry.get("m1").map(|r| r.client_id.as_str()), Some("manager-ipad"));

        // A reconnecting manager still takes over its own id
        let again = registry.register_connection("m2", ConnectionMetadata::new(Role::Manager).with_client_id("manager-ipad"));
        assert_eq!(again.replaced.map(|r| r.socket_id).as_deref(), Some("m1"));
    }
}
