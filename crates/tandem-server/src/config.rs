//! Server configuration
//!
//! Read from a JSON file; every field falls back to its default so a
//! missing file or a partial one both work. `TANDEM_BIND` overrides the
//! bind address.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

/// Environment variable overriding [`ServerConfig::bind_address`]
pub const BIND_ENV: &str = "TANDEM_BIND";

/// How rosters reach managers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterBroadcast {
    /// Full client list on every join, leave or selection change
    #[default]
    Full,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub bind_address: String,
    pub websocket_path: String,
    /// Sockets beyond this are refused before upgrade
    pub max_connections: usize,
    pub roster_broadcast: RosterBroadcast,
    /// Bound of the queue between socket tasks and the hub
    pub dispatch_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            websocket_path: "/ws".to_string(),
            max_connections: 250,
            roster_broadcast: RosterBroadcast::Full,
            dispatch_queue_capacity: 1024,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `path`, or defaults if it does not exist
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !fs::try_exists(path).await? {
            log::info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).await?;
        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration to `path` as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, contents).await?;
        log::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Apply environment overrides
    pub fn with_env(mut self) -> Self {
        if let Some(bind) = std::env::var(BIND_ENV).ok().filter(|v| !v.trim().is_empty()) {
            self.bind_address = bind.trim().to_string();
        }
        self
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.websocket_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "websocketPath must start with '/', got '{}'",
                self.websocket_path
            )));
        }
        if self.dispatch_queue_capacity == 0 {
            return Err(ConfigError::Invalid("dispatchQueueCapacity must be positive".to_string()));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(&dir.path().join("server.json")).await.unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.max_connections, 250);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.json");
        let config = ServerConfig {
            max_connections: 12,
            roster_broadcast: RosterBroadcast::Disabled,
            ..ServerConfig::default()
        };
        config.save(&path).await.unwrap();
        assert_eq!(ServerConfig::load(&path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_partial_file_and_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");

        tokio::fs::write(&path, r#"{ "bindAddress": "127.0.0.1:9000" }"#).await.unwrap();
        let config = ServerConfig::load(&path).await.unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.websocket_path, "/ws");

        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(matches!(ServerConfig::load(&path).await, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate() {
        assert!(ServerConfig::default().validate().is_ok());
        let bad = ServerConfig {
            websocket_path: "ws".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid(_))));
    }
}
