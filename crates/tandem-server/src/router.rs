//! Authorization and fan-out of protocol messages
//!
//! Routing never fails outward. Invalid, unauthorized or spoofed envelopes
//! become a [`RouteOutcome::Dropped`] plus a log line; the sender's
//! connection stays up and nobody else sees the message.

use serde_json::Value;
use tandem_protocol::{
    check_message, matches_target, message_from_value, now_ms, Frame, Message, MessageKind, Origin, Role, SocketId,
    SystemEvent,
};

use crate::config::RosterBroadcast;
use crate::error::TransportError;
use crate::registry::ConnectionRegistry;

/// Delivery of encoded frames to sockets
pub trait Transport: Send + Sync {
    fn send(&self, socket_id: &str, frame: &Frame) -> Result<(), TransportError>;
}

/// Who handed a message to the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOrigin {
    Socket(SocketId),
    /// Server-initiated gating actions
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Unknown type, wrong version or bad payload
    Invalid(String),
    /// Socket is not registered
    UnknownOrigin,
    /// Sender's role may not emit this kind
    Unauthorized { kind: MessageKind, role: Role },
    /// `from` does not match the sender's role
    Spoofed { claimed: Origin },
    Encoding(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered { kind: MessageKind, recipients: Vec<SocketId> },
    Dropped(DropReason),
}

impl RouteOutcome {
    pub fn recipients(&self) -> &[SocketId] {
        match self {
            Self::Delivered { recipients, .. } => recipients,
            Self::Dropped(_) => &[],
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    roster_broadcast: RosterBroadcast,
}

impl Router {
    pub fn new(roster_broadcast: RosterBroadcast) -> Self {
        Self { roster_broadcast }
    }

    /// Route a raw envelope as received in a `message` frame
    pub fn route_value(
        &self,
        registry: &ConnectionRegistry,
        transport: &dyn Transport,
        value: Value,
        origin: &RouteOrigin,
    ) -> RouteOutcome {
        if let Err(e) = check_message(&value) {
            return self.drop_with(origin, DropReason::Invalid(e.to_string()));
        }
        match message_from_value(value) {
            Ok(message) => self.route_message(registry, transport, message, origin),
            Err(e) => self.drop_with(origin, DropReason::Invalid(e.to_string())),
        }
    }

    /// Authorize, stamp and deliver a typed message
    ///
    /// Privileged kinds (`control`, `media`, `plugin`) go to the clients
    /// their selector matches and may only come from a manager or the
    /// server. `data` goes to every manager; `system` comes only from the
    /// server and also goes to managers.
    pub fn route_message(
        &self,
        registry: &ConnectionRegistry,
        transport: &dyn Transport,
        mut message: Message,
        origin: &RouteOrigin,
    ) -> RouteOutcome {
        if let Err(e) = message.validate() {
            return self.drop_with(origin, DropReason::Invalid(e.to_string()));
        }

        let kind = message.kind();
        let claimed = message.envelope().from;
        let sender = match origin {
            RouteOrigin::Server => None,
            RouteOrigin::Socket(socket_id) => match registry.get(socket_id) {
                Some(record) => Some(record),
                None => return self.drop_with(origin, DropReason::UnknownOrigin),
            },
        };

        match sender {
            None => {
                if claimed != Origin::Server {
                    return self.drop_with(origin, DropReason::Spoofed { claimed });
                }
            }
            Some(record) => {
                let allowed = match kind {
                    MessageKind::Control | MessageKind::Media | MessageKind::Plugin => record.is_manager(),
                    MessageKind::System => false,
                    MessageKind::Data => true,
                };
                if !allowed {
                    return self.drop_with(
                        origin,
                        DropReason::Unauthorized {
                            kind,
                            role: record.role,
                        },
                    );
                }
                if claimed != Origin::from(record.role) {
                    return self.drop_with(origin, DropReason::Spoofed { claimed });
                }
            }
        }

        message.envelope_mut().server_timestamp = Some(now_ms());
        if let (Message::Data(data), Some(record)) = (&mut message, sender) {
            data.client_id = Some(record.client_id.clone());
        }

        let origin_socket = sender.map(|r| r.socket_id.as_str());
        let recipients: Vec<SocketId> = match message.target() {
            Some(selector) => registry
                .get_all_clients()
                .into_iter()
                .filter(|r| matches_target(selector, r))
                .map(|r| r.socket_id.clone())
                .collect(),
            None => registry
                .managers()
                .filter(|r| Some(r.socket_id.as_str()) != origin_socket)
                .map(|r| r.socket_id.clone())
                .collect(),
        };

        let frame = match Frame::message(&message) {
            Ok(frame) => frame,
            Err(e) => return self.drop_with(origin, DropReason::Encoding(e.to_string())),
        };
        let recipients = deliver(transport, &recipients, &frame);
        log::debug!("Routed {} from {:?} to {} socket(s)", kind, origin, recipients.len());
        RouteOutcome::Delivered { kind, recipients }
    }

    /// Send the full client list to every manager
    ///
    /// Returns the managers reached; nothing is sent when roster
    /// broadcasting is disabled.
    pub fn broadcast_roster(&self, registry: &ConnectionRegistry, transport: &dyn Transport) -> Vec<SocketId> {
        if self.roster_broadcast == RosterBroadcast::Disabled {
            return Vec::new();
        }
        let message = Message::system(SystemEvent::ClientList {
            clients: registry.roster(),
        });
        self.route_message(registry, transport, message, &RouteOrigin::Server)
            .recipients()
            .to_vec()
    }

    fn drop_with(&self, origin: &RouteOrigin, reason: DropReason) -> RouteOutcome {
        match &reason {
            DropReason::Unauthorized { .. } | DropReason::Spoofed { .. } | DropReason::UnknownOrigin => {
                log::warn!("Dropping message from {:?}: {:?}", origin, reason);
            }
            DropReason::Invalid(_) | DropReason::Encoding(_) => {
                log::debug!("Dropping message from {:?}: {:?}", origin, reason);
            }
        }
        RouteOutcome::Dropped(reason)
    }
}

/// Send `frame` to each socket, returning the ones that accepted it
pub(crate) fn deliver(transport: &dyn Transport, sockets: &[SocketId], frame: &Frame) -> Vec<SocketId> {
    sockets
        .iter()
        .filter(|socket_id| match transport.send(socket_id, frame) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Delivery to '{}' failed: {}", socket_id, e);
                false
            }
        })
        .cloned()
        .collect()
}
