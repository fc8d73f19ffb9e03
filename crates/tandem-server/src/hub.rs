//! Dispatch loop
//!
//! Connection tasks never touch shared state. They push [`HubEvent`]s into a
//! bounded queue drained by one hub task, which owns the
//! [`ConnectionRegistry`] and [`Router`] outright and writes replies into
//! each peer's unbounded outbound channel.

use std::collections::HashMap;

use tandem_protocol::{now_ms, Frame, Message, SelectClients, SocketId, TimePing, TimePong};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError, TransportError};
use crate::registry::{ConnectionMetadata, ConnectionRegistry};
use crate::router::{RouteOrigin, RouteOutcome, Router, Transport};

/// Outbound text frames for one socket
pub type Outbound = mpsc::UnboundedSender<String>;

#[derive(Debug)]
pub enum HubEvent {
    Connected {
        socket_id: SocketId,
        metadata: ConnectionMetadata,
        outbound: Outbound,
    },
    /// Raw text frame from a socket
    Frame { socket_id: SocketId, text: String },
    Disconnected { socket_id: SocketId },
    /// Server-initiated message, routed with the server origin
    Inject { message: Message },
}

/// Cloneable sender side of the dispatch queue
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    pub async fn send(&self, event: HubEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| ServerError::HubClosed)
    }

    /// Route `message` as the server
    pub async fn inject(&self, message: Message) -> Result<()> {
        self.send(HubEvent::Inject { message }).await
    }
}

/// Transport writing into the peers' outbound channels
struct PeerTransport<'a> {
    peers: &'a HashMap<SocketId, Outbound>,
}

impl Transport for PeerTransport<'_> {
    fn send(&self, socket_id: &str, frame: &Frame) -> std::result::Result<(), TransportError> {
        let peer = self.peers.get(socket_id).ok_or_else(|| TransportError::UnknownSocket(socket_id.to_string()))?;
        let text = frame
            .to_text()
            .map_err(|e| TransportError::Encoding(e.to_string()))?;
        peer.send(text).map_err(|_| TransportError::Closed(socket_id.to_string()))
    }
}

pub struct Hub {
    registry: ConnectionRegistry,
    router: Router,
    peers: HashMap<SocketId, Outbound>,
}

impl Hub {
    pub fn new(router: Router) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            router,
            peers: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Spawn the hub task with a queue sized from `config`
    pub fn spawn(config: &ServerConfig) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.dispatch_queue_capacity.max(1));
        let hub = Self::new(Router::new(config.roster_broadcast));
        let task = tokio::spawn(hub.run(rx));
        (HubHandle { tx }, task)
    }

    /// Drain events until every sender is gone
    pub async fn run(mut self, mut rx: mpsc::Receiver<HubEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
        log::info!("Hub stopped with {} connection(s) registered", self.registry.len());
    }

    pub fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected {
                socket_id,
                metadata,
                outbound,
            } => self.on_connect(socket_id, metadata, outbound),
            HubEvent::Frame { socket_id, text } => self.on_frame(&socket_id, &text),
            HubEvent::Disconnected { socket_id } => self.on_disconnect(&socket_id),
            HubEvent::Inject { message } => {
                self.route(message, &RouteOrigin::Server);
            }
        }
    }

    fn transport(&self) -> PeerTransport<'_> {
        PeerTransport { peers: &self.peers }
    }

    fn on_connect(&mut self, socket_id: SocketId, metadata: ConnectionMetadata, outbound: Outbound) {
        let registration = self.registry.register_connection(socket_id.clone(), metadata);
        if let Some(old) = registration.replaced {
            // Dropping the sender ends the old socket's writer
            self.peers.remove(&old.socket_id);
        }
        self.peers.insert(socket_id, outbound);
        log::info!(
            "{:?} '{}' connected ({} total)",
            registration.record.role,
            registration.record.client_id,
            self.registry.len()
        );
        // Managers receive the current roster on join as well
        self.broadcast_roster();
    }

    fn on_disconnect(&mut self, socket_id: &str) {
        self.peers.remove(socket_id);
        // Sockets superseded by a reconnect are already gone from the registry
        let Some(record) = self.registry.disconnect(socket_id) else {
            return;
        };
        log::info!("{:?} '{}' disconnected", record.role, record.client_id);
        if record.is_client() {
            self.broadcast_roster();
        }
    }

    fn on_frame(&mut self, socket_id: &str, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Ignoring bad frame from '{}': {}", socket_id, e);
                return;
            }
        };
        match frame {
            Frame::Message(value) => {
                let transport = self.transport();
                self.router
                    .route_value(&self.registry, &transport, value, &RouteOrigin::Socket(socket_id.to_string()));
            }
            Frame::TimePing(ping) => self.on_time_ping(socket_id, ping),
            Frame::SelectClients(select) => self.on_select_clients(socket_id, select),
            Frame::TimePong(_) => {
                log::debug!("Ignoring time:pong from '{}'", socket_id);
            }
        }
    }

    fn on_time_ping(&self, socket_id: &str, ping: TimePing) {
        let pong = Frame::TimePong(TimePong {
            client_timestamp: ping.client_timestamp,
            server_timestamp: now_ms(),
        });
        if let Err(e) = self.transport().send(socket_id, &pong) {
            log::debug!("Could not answer time:ping from '{}': {}", socket_id, e);
        }
    }

    fn on_select_clients(&mut self, socket_id: &str, select: SelectClients) {
        match self.registry.get(socket_id) {
            Some(record) if record.is_manager() => {}
            Some(record) => {
                log::warn!("Dropping select:clients from non-manager '{}'", record.client_id);
                return;
            }
            None => return,
        }
        let matched = self.registry.set_client_selected(&select.client_ids);
        log::debug!("Selected {} of {} requested client(s)", matched, select.client_ids.len());
        self.broadcast_roster();
    }

    fn route(&self, message: Message, origin: &RouteOrigin) -> RouteOutcome {
        self.router
            .route_message(&self.registry, &self.transport(), message, origin)
    }

    fn broadcast_roster(&self) {
        self.router.broadcast_roster(&self.registry, &self.transport());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tandem_protocol::{ControlAction, Origin, Role, TargetSelector};

    struct Peer {
        socket_id: String,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl Peer {
        fn frames(&mut self) -> Vec<Frame> {
            let mut frames = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                frames.push(Frame::parse(&text).unwrap());
            }
            frames
        }

        fn messages(&mut self) -> Vec<Value> {
            self.frames()
                .into_iter()
                .filter_map(|f| match f {
                    Frame::Message(v) => Some(v),
                    _ => None,
                })
                .collect()
        }
    }

    fn connect(hub: &mut Hub, socket_id: &str, metadata: ConnectionMetadata) -> Peer {
        let (outbound, rx) = mpsc::unbounded_channel();
        hub.handle(HubEvent::Connected {
            socket_id: socket_id.to_string(),
            metadata,
            outbound,
        });
        Peer {
            socket_id: socket_id.to_string(),
            rx,
        }
    }

    fn send_frame(hub: &mut Hub, peer: &Peer, frame: &Frame) {
        hub.handle(HubEvent::Frame {
            socket_id: peer.socket_id.clone(),
            text: frame.to_text().unwrap(),
        });
    }

    fn stop_sound(from: Origin) -> Message {
        Message::control(from, TargetSelector::All, ControlAction::StopSound)
    }

    #[test]
    fn test_roster_follows_client_joins_and_leaves() {
        let mut hub = Hub::new(Router::default());
        let mut manager = connect(&mut hub, "m", ConnectionMetadata::new(Role::Manager));
        let initial = manager.messages();
        assert_eq!(initial[0]["event"]["clients"], json!([]));

        connect(&mut hub, "c", ConnectionMetadata::new(Role::Client).with_client_id("phone"));
        let roster = manager.messages();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0]["event"]["clients"][0]["clientId"], json!("phone"));

        hub.handle(HubEvent::Disconnected {
            socket_id: "c".to_string(),
        });
        let roster = manager.messages();
        assert_eq!(roster[0]["event"]["clients"], json!([]));
        assert_eq!(hub.registry().len(), 1);
    }

    #[test]
    fn test_time_ping_answers_origin_only() {
        let mut hub = Hub::new(Router::default());
        let mut a = connect(&mut hub, "a", ConnectionMetadata::new(Role::Manager));
        let mut b = connect(&mut hub, "b", ConnectionMetadata::new(Role::Manager));
        a.frames();
        b.frames();

        send_frame(&mut hub, &a, &Frame::TimePing(TimePing { client_timestamp: 42.0 }));
        match a.frames().as_slice() {
            [Frame::TimePong(pong)] => {
                assert_eq!(pong.client_timestamp, 42.0);
                assert!(pong.server_timestamp > 0.0);
            }
            other => panic!("expected one pong, got {:?}", other),
        }
        assert!(b.frames().is_empty());
    }

    #[test]
    fn test_select_clients_is_manager_only() {
        let mut hub = Hub::new(Router::default());
        let mut manager = connect(&mut hub, "m", ConnectionMetadata::new(Role::Manager));
        let client = connect(&mut hub, "c", ConnectionMetadata::new(Role::Client).with_client_id("phone"));
        manager.frames();

        let select = Frame::SelectClients(SelectClients {
            client_ids: vec!["phone".to_string()],
        });
        send_frame(&mut hub, &client, &select);
        assert!(hub.registry().selected_clients().is_empty());
        assert!(manager.frames().is_empty());

        send_frame(&mut hub, &manager, &select);
        assert_eq!(hub.registry().selected_clients().len(), 1);
        let roster = manager.messages();
        assert_eq!(roster[0]["event"]["clients"][0]["selected"], json!(true));
    }

    #[test]
    fn test_messages_are_routed() {
        let mut hub = Hub::new(Router::default());
        let manager = connect(&mut hub, "m", ConnectionMetadata::new(Role::Manager));
        let mut client = connect(&mut hub, "c", ConnectionMetadata::new(Role::Client));

        send_frame(&mut hub, &manager, &Frame::message(&stop_sound(Origin::Manager)).unwrap());
        let received = client.messages();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["command"]["action"], json!("stopSound"));

        // Garbage and client-sent control both vanish quietly
        hub.handle(HubEvent::Frame {
            socket_id: "c".to_string(),
            text: "not json".to_string(),
        });
        send_frame(&mut hub, &client, &Frame::message(&stop_sound(Origin::Client)).unwrap());
        assert!(client.messages().is_empty());
    }

    #[test]
    fn test_reconnect_closes_superseded_socket() {
        let mut hub = Hub::new(Router::default());
        let mut first = connect(&mut hub, "s1", ConnectionMetadata::new(Role::Client).with_client_id("phone"));
        let mut second = connect(&mut hub, "s2", ConnectionMetadata::new(Role::Client).with_client_id("phone"));
        assert!(matches!(first.rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));

        // Late disconnect of the old socket must not evict the new one
        hub.handle(HubEvent::Disconnected {
            socket_id: "s1".to_string(),
        });
        assert_eq!(hub.registry().find_client("phone").map(|r| r.socket_id.as_str()), Some("s2"));

        hub.handle(HubEvent::Inject {
            message: stop_sound(Origin::Server),
        });
        assert_eq!(second.messages().len(), 1);
    }

    #[test]
    fn test_client_claiming_manager_id_leaves_manager_connected() {
        let mut hub = Hub::new(Router::default());
        let mut manager = connect(&mut hub, "m1", ConnectionMetadata::new(Role::Manager).with_client_id("boss"));
        manager.frames();

        let mut intruder = connect(&mut hub, "c1", ConnectionMetadata::new(Role::Client).with_client_id("boss"));
        assert_eq!(hub.registry().managers().count(), 1);

        // The manager's channel is still open and receives the new roster
        let roster = manager.messages();
        assert_eq!(roster.len(), 1);
        assert_ne!(roster[0]["event"]["clients"][0]["clientId"], json!("boss"));

        // and can still command the newcomer, which is an ordinary client
        send_frame(&mut hub, &manager, &Frame::message(&stop_sound(Origin::Manager)).unwrap());
        assert_eq!(intruder.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_hub_processes_queue() {
        let (handle, task) = Hub::spawn(&ServerConfig::default());
        let (outbound, mut rx) = mpsc::unbounded_channel();
        handle
            .send(HubEvent::Connected {
                socket_id: "c".to_string(),
                metadata: ConnectionMetadata::new(Role::Client),
                outbound,
            })
            .await
            .unwrap();
        handle.inject(stop_sound(Origin::Server)).await.unwrap();

        let text = rx.recv().await.unwrap();
        assert!(matches!(Frame::parse(&text).unwrap(), Frame::Message(_)));

        drop(handle);
        task.await.unwrap();
    }
}
