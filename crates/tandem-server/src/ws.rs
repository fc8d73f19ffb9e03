//! Axum websocket transport
//!
//! One task per connection reads text frames into the hub queue; a
//! companion writer task drains the connection's outbound channel. Neither
//! waits on any other connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::hub::{HubEvent, HubHandle};
use crate::registry::ConnectionMetadata;

/// Shared state of the HTTP layer
#[derive(Clone)]
pub struct AppState {
    hub: HubHandle,
    limiter: ConnectionLimiter,
}

impl AppState {
    pub fn new(hub: HubHandle, config: &ServerConfig) -> Self {
        Self {
            hub,
            limiter: ConnectionLimiter::new(config.max_connections),
        }
    }
}

/// Counts open sockets against a ceiling
#[derive(Debug, Clone)]
pub struct ConnectionLimiter {
    open: Arc<AtomicUsize>,
    max: usize,
}

/// Releases its slot on drop
#[derive(Debug)]
pub struct ConnectionGuard {
    open: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            open: Arc::new(AtomicUsize::new(0)),
            max,
        }
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self) -> Option<ConnectionGuard> {
        self.open
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max).then_some(n + 1))
            .ok()
            .map(|_| ConnectionGuard {
                open: Arc::clone(&self.open),
            })
    }
}

/// HTTP router serving the websocket endpoint
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route(&config.websocket_path, get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let metadata = match ConnectionMetadata::from_params(&params) {
        Ok(metadata) => metadata,
        Err(e) => {
            log::debug!("Rejecting handshake: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    let Some(guard) = state.limiter.try_acquire() else {
        log::warn!("Connection limit of {} reached, refusing socket", state.limiter.max);
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };
    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state.hub, metadata).await;
        drop(guard);
    })
}

async fn handle_socket(socket: WebSocket, hub: HubHandle, metadata: ConnectionMetadata) {
    let socket_id = uuid::Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let connected = HubEvent::Connected {
        socket_id: socket_id.clone(),
        metadata,
        outbound,
    };
    if let Err(e) = hub.send(connected).await {
        log::error!("Dropping socket '{}': {}", socket_id, e);
        writer.abort();
        return;
    }

    while let Some(incoming) = receiver.next().await {
        let text = match incoming {
            Ok(WsMessage::Text(text)) => text.to_string(),
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Binary(_)) => {
                log::debug!("Ignoring binary frame from '{}'", socket_id);
                continue;
            }
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => continue,
            Err(e) => {
                log::debug!("Socket '{}' errored: {}", socket_id, e);
                break;
            }
        };
        let frame = HubEvent::Frame {
            socket_id: socket_id.clone(),
            text,
        };
        if hub.send(frame).await.is_err() {
            break;
        }
    }

    // The hub drops our outbound sender on disconnect, which ends the writer
    if hub.send(HubEvent::Disconnected { socket_id }).await.is_err() {
        writer.abort();
    }
    let _ = writer.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_refuses_past_ceiling() {
        let limiter = ConnectionLimiter::new(2);
        let a = limiter.try_acquire();
        let b = limiter.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.open(), 2);

        drop(a);
        assert_eq!(limiter.open(), 1);
        assert!(limiter.try_acquire().is_some());
        assert_eq!(limiter.open(), 1);
    }

    #[test]
    fn test_zero_ceiling_refuses_everything() {
        let limiter = ConnectionLimiter::new(0);
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.open(), 0);
    }
}
