//! Tandem Server - the control plane's routing hub
//!
//! Managers and clients connect over websockets. The hub keeps the
//! [`ConnectionRegistry`], answers clock pings, applies manager selections
//! and hands every envelope to the [`Router`] for authorization and fan-out.

pub mod config;
pub mod error;
pub mod hub;
pub mod registry;
pub mod router;
pub mod ws;

pub use config::{ConfigError, RosterBroadcast, ServerConfig};
pub use error::{Result, ServerError, TransportError};
pub use hub::{Hub, HubEvent, HubHandle};
pub use registry::{ClientIdentity, ConnectionMetadata, ConnectionRegistry, Registration};
pub use router::{DropReason, RouteOrigin, RouteOutcome, Router, Transport};

use tokio::net::TcpListener;

/// Bind, spawn the hub and serve until the listener fails
pub async fn serve(config: ServerConfig) -> Result<()> {
    config.validate()?;
    let listener = TcpListener::bind(&config.bind_address).await?;
    log::info!(
        "Listening on {} (websocket path {})",
        listener.local_addr()?,
        config.websocket_path
    );

    let (hub, hub_task) = Hub::spawn(&config);
    let app = ws::router(ws::AppState::new(hub, &config), &config);
    axum::serve(listener, app).await?;

    hub_task.abort();
    Ok(())
}
