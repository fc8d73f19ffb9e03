//! Typed message envelope
//!
//! Every envelope carries a shared header ([`Envelope`]) plus a payload
//! specific to its kind. `control`, `media` and `plugin` messages are
//! privileged: they carry a [`TargetSelector`] and an optional `executeAt`
//! server-time deadline, and only managers (or the server itself) may send
//! them.
//!
//! Incoming text is checked structurally on the raw JSON before it is
//! deserialized, so stale or foreign peers are rejected with a
//! [`ProtocolError`] rather than a half-parsed message.

use serde::{Deserialize, Serialize};

use crate::clock::now_ms;
use crate::connection::{ClientId, ClientSummary, Origin};
use crate::constants::clock::MAX_EXECUTE_AT_MS;
use crate::constants::PROTOCOL_VERSION;
use crate::error::{ProtocolError, Result};
use crate::target::TargetSelector;

/// The five envelope kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Control,
    Data,
    Media,
    System,
    Plugin,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Control,
        MessageKind::Data,
        MessageKind::Media,
        MessageKind::System,
        MessageKind::Plugin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Data => "data",
            Self::Media => "media",
            Self::System => "system",
            Self::Plugin => "plugin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }

    /// Kinds only a manager (or the server) may emit
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Control | Self::Media | Self::Plugin)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header shared by every message kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: u32,
    pub from: Origin,
    pub client_timestamp: f64,
    /// Stamped by the routing boundary, never by the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<f64>,
}

impl Envelope {
    /// Header for a message sent now by `from`
    pub fn new(from: Origin) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            from,
            client_timestamp: now_ms(),
            server_timestamp: None,
        }
    }
}

/// Flashlight behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlashlightMode {
    On,
    Off,
    Blink,
    Pulse,
}

/// Screen color behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScreenMode {
    #[default]
    Solid,
    Blink,
    Pulse,
}

/// Effect a control message asks the target clients to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlAction {
    #[serde(rename_all = "camelCase")]
    Flashlight {
        mode: FlashlightMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval_ms: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u32>,
    },
    Vibrate {
        pattern: Vec<u32>,
    },
    #[serde(rename_all = "camelCase")]
    ScreenColor {
        color: String,
        #[serde(default)]
        mode: ScreenMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval_ms: Option<u32>,
    },
    PlaySound {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        volume: Option<f32>,
        #[serde(rename = "loop", default)]
        looping: bool,
    },
    StopSound,
    Visual {
        scene: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    Custom {
        name: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// Longest vibration pattern accepted from a manager
const MAX_VIBRATE_STEPS: usize = 64;

impl ControlAction {
    /// Edge validation for values the envelope schema cannot express
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Flashlight {
                mode, interval_ms, ..
            } => {
                if matches!(mode, FlashlightMode::Blink | FlashlightMode::Pulse)
                    && *interval_ms == Some(0)
                {
                    return Err(ProtocolError::payload("flashlight interval must be positive"));
                }
            }
            Self::Vibrate { pattern } => {
                if pattern.len() > MAX_VIBRATE_STEPS {
                    return Err(ProtocolError::payload(format!(
                        "vibrate pattern has {} steps (max {})",
                        pattern.len(),
                        MAX_VIBRATE_STEPS
                    )));
                }
            }
            Self::ScreenColor { color, .. } => {
                if !is_hex_color(color) {
                    return Err(ProtocolError::payload(format!("invalid color '{}'", color)));
                }
            }
            Self::PlaySound { url, volume, .. } => {
                if url.is_empty() {
                    return Err(ProtocolError::payload("playSound requires a url"));
                }
                validate_volume(*volume)?;
            }
            Self::Visual { scene, .. } if scene.is_empty() => {
                return Err(ProtocolError::payload("visual requires a scene"));
            }
            Self::Custom { name, .. } if name.is_empty() => {
                return Err(ProtocolError::payload("custom action requires a name"));
            }
            _ => {}
        }
        Ok(())
    }
}

/// `#rgb` or `#rrggbb`
pub fn is_hex_color(value: &str) -> bool {
    let Some(hex) = value.strip_prefix('#') else {
        return false;
    };
    (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

fn validate_volume(volume: Option<f32>) -> Result<()> {
    match volume {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(ProtocolError::payload(format!(
            "volume {} outside 0..=1",
            v
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub target: TargetSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_at: Option<f64>,
    pub command: ControlAction,
}

/// Sensor or status sample flowing from a client to the managers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensorType", rename_all = "camelCase")]
pub enum DataSample {
    Accelerometer { x: f64, y: f64, z: f64 },
    Gyroscope { alpha: f64, beta: f64, gamma: f64 },
    Orientation { alpha: f64, beta: f64, gamma: f64 },
    /// Node executor status report (see the `node-executor` crate)
    NodeExecutor { report: serde_json::Value },
    Custom {
        name: String,
        #[serde(default)]
        value: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Overwritten by the router with the origin's registry id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    pub sample: DataSample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaAction {
    Play,
    Stop,
    Preload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub target: TargetSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_at: Option<f64>,
    pub media_type: MediaType,
    pub action: MediaAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
}

impl MediaMessage {
    pub fn validate(&self) -> Result<()> {
        if matches!(self.action, MediaAction::Play | MediaAction::Preload)
            && self.url.as_deref().map_or(true, str::is_empty)
        {
            return Err(ProtocolError::payload("media play/preload requires a url"));
        }
        validate_volume(self.volume)
    }
}

/// Server-originated notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SystemEvent {
    /// Full roster, sent to managers on every join/leave/selection change
    ClientList { clients: Vec<ClientSummary> },
    ClientJoined { client: ClientSummary },
    #[serde(rename_all = "camelCase")]
    ClientLeft { client_id: ClientId },
    Notice { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub event: SystemEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub target: TargetSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_at: Option<f64>,
    pub plugin_id: String,
    pub command: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A protocol message, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Control(ControlMessage),
    Data(DataMessage),
    Media(MediaMessage),
    System(SystemMessage),
    Plugin(PluginMessage),
}

impl Message {
    /// Control message sent now
    pub fn control(from: Origin, target: TargetSelector, command: ControlAction) -> Self {
        Self::Control(ControlMessage {
            envelope: Envelope::new(from),
            target,
            execute_at: None,
            command,
        })
    }

    /// Data message sent now by a client
    pub fn data(sample: DataSample) -> Self {
        Self::Data(DataMessage {
            envelope: Envelope::new(Origin::Client),
            client_id: None,
            sample,
        })
    }

    /// System message originated by the server
    pub fn system(event: SystemEvent) -> Self {
        Self::System(SystemMessage {
            envelope: Envelope::new(Origin::Server),
            event,
        })
    }

    /// Plugin command sent now
    pub fn plugin(
        from: Origin,
        target: TargetSelector,
        plugin_id: impl Into<String>,
        command: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::Plugin(PluginMessage {
            envelope: Envelope::new(from),
            target,
            execute_at: None,
            plugin_id: plugin_id.into(),
            command: command.into(),
            payload,
        })
    }

    /// Set the absolute server-time deadline (privileged kinds only)
    pub fn with_execute_at(mut self, at: f64) -> Self {
        let kind = self.kind();
        match &mut self {
            Self::Control(m) => m.execute_at = Some(at),
            Self::Media(m) => m.execute_at = Some(at),
            Self::Plugin(m) => m.execute_at = Some(at),
            Self::Data(_) | Self::System(_) => {
                log::debug!("Ignoring executeAt on non-targeted {} message", kind);
            }
        }
        self
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Control(_) => MessageKind::Control,
            Self::Data(_) => MessageKind::Data,
            Self::Media(_) => MessageKind::Media,
            Self::System(_) => MessageKind::System,
            Self::Plugin(_) => MessageKind::Plugin,
        }
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Control(m) => &m.envelope,
            Self::Data(m) => &m.envelope,
            Self::Media(m) => &m.envelope,
            Self::System(m) => &m.envelope,
            Self::Plugin(m) => &m.envelope,
        }
    }

    pub fn envelope_mut(&mut self) -> &mut Envelope {
        match self {
            Self::Control(m) => &mut m.envelope,
            Self::Data(m) => &mut m.envelope,
            Self::Media(m) => &mut m.envelope,
            Self::System(m) => &mut m.envelope,
            Self::Plugin(m) => &mut m.envelope,
        }
    }

    /// Selector for privileged kinds; `None` for data and system
    pub fn target(&self) -> Option<&TargetSelector> {
        match self {
            Self::Control(m) => Some(&m.target),
            Self::Media(m) => Some(&m.target),
            Self::Plugin(m) => Some(&m.target),
            Self::Data(_) | Self::System(_) => None,
        }
    }

    pub fn execute_at(&self) -> Option<f64> {
        match self {
            Self::Control(m) => m.execute_at,
            Self::Media(m) => m.execute_at,
            Self::Plugin(m) => m.execute_at,
            Self::Data(_) | Self::System(_) => None,
        }
    }

    /// Version and payload validation of an already-typed message
    pub fn validate(&self) -> Result<()> {
        let version = self.envelope().version;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                found: version.to_string(),
            });
        }
        if let Some(at) = self.execute_at() {
            if !(0.0..=MAX_EXECUTE_AT_MS).contains(&at) {
                return Err(ProtocolError::payload(format!("executeAt {} is out of range", at)));
            }
        }
        match self {
            Self::Control(m) => m.command.validate(),
            Self::Media(m) => m.validate(),
            Self::Plugin(m) if m.plugin_id.is_empty() => {
                Err(ProtocolError::payload("plugin message requires a pluginId"))
            }
            _ => Ok(()),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Structural check on raw JSON: known `type` and exact `version`
pub fn check_message(value: &serde_json::Value) -> Result<MessageKind> {
    let obj = value
        .as_object()
        .ok_or_else(|| ProtocolError::Malformed("envelope is not an object".to_string()))?;

    let type_str = obj
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ProtocolError::Malformed("missing string 'type'".to_string()))?;
    let kind =
        MessageKind::parse(type_str).ok_or_else(|| ProtocolError::UnknownType(type_str.to_string()))?;

    match obj.get("version") {
        Some(v) if v.as_u64() == Some(PROTOCOL_VERSION as u64) => Ok(kind),
        Some(v) => Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found: v.to_string(),
        }),
        None => Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found: "none".to_string(),
        }),
    }
}

/// Boolean form of [`check_message`]; failures are logged, never raised
pub fn is_valid_message(value: &serde_json::Value) -> bool {
    match check_message(value) {
        Ok(_) => true,
        Err(e) => {
            log::debug!("Rejected envelope: {}", e);
            false
        }
    }
}

/// Decode a raw JSON envelope
pub fn message_from_value(value: serde_json::Value) -> Result<Message> {
    check_message(&value)?;
    let message: Message = serde_json::from_value(value)?;
    message.validate()?;
    Ok(message)
}

/// Decode envelope text
pub fn parse_message(text: &str) -> Result<Message> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    message_from_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn control_json() -> serde_json::Value {
        json!({
            "type": "control",
            "version": PROTOCOL_VERSION,
            "from": "manager",
            "clientTimestamp": 1000.0,
            "target": {"mode": "all"},
            "executeAt": 5000.0,
            "command": {"action": "screenColor", "color": "#ff0000", "mode": "blink", "intervalMs": 250}
        })
    }

    #[test]
    fn test_parse_control_message() {
        let message = message_from_value(control_json()).unwrap();
        assert_eq!(message.kind(), MessageKind::Control);
        assert_eq!(message.target(), Some(&TargetSelector::All));
        assert_eq!(message.execute_at(), Some(5000.0));
        assert_eq!(message.envelope().server_timestamp, None);

        match message {
            Message::Control(m) => assert_eq!(
                m.command,
                ControlAction::ScreenColor {
                    color: "#ff0000".to_string(),
                    mode: ScreenMode::Blink,
                    interval_ms: Some(250),
                }
            ),
            other => panic!("Expected control, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut value = control_json();
        value["type"] = json!("telemetry");
        assert!(matches!(
            check_message(&value),
            Err(ProtocolError::UnknownType(t)) if t == "telemetry"
        ));
        assert!(!is_valid_message(&value));
    }

    #[test]
    fn test_version_must_match_exactly() {
        let mut value = control_json();
        value["version"] = json!(PROTOCOL_VERSION + 1);
        assert!(matches!(
            check_message(&value),
            Err(ProtocolError::VersionMismatch { .. })
        ));

        value["version"] = json!("1");
        assert!(!is_valid_message(&value));

        value.as_object_mut().unwrap().remove("version");
        assert!(!is_valid_message(&value));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(!is_valid_message(&json!([1, 2, 3])));
        assert!(parse_message("not json").is_err());
    }

    #[test]
    fn test_invalid_payload_rejected() {
        let mut value = control_json();
        value["command"] = json!({"action": "screenColor", "color": "red"});
        assert!(matches!(
            message_from_value(value),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_data_message_shape() {
        let mut message = Message::data(DataSample::Accelerometer {
            x: 0.5,
            y: 0.25,
            z: 9.75,
        });
        message.envelope_mut().client_timestamp = 1000.0;
        let value = message.to_json().unwrap();
        assert_eq!(value["type"], "data");
        assert_eq!(value["from"], "client");
        assert_eq!(value["sample"]["sensorType"], "accelerometer");
        assert!(value.get("serverTimestamp").is_none());

        let decoded = message_from_value(value).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_system_roster_shape() {
        let message = Message::system(SystemEvent::ClientLeft {
            client_id: "c1".to_string(),
        });
        let value = message.to_json().unwrap();
        assert_eq!(value["event"]["kind"], "clientLeft");
        assert_eq!(value["event"]["clientId"], "c1");
        assert_eq!(value["from"], "server");
    }

    #[test]
    fn test_privileged_kinds() {
        assert!(MessageKind::Control.is_privileged());
        assert!(MessageKind::Media.is_privileged());
        assert!(MessageKind::Plugin.is_privileged());
        assert!(!MessageKind::Data.is_privileged());
        assert!(!MessageKind::System.is_privileged());
    }

    #[test]
    fn test_media_requires_url_for_play() {
        let value = json!({
            "type": "media",
            "version": PROTOCOL_VERSION,
            "from": "manager",
            "clientTimestamp": 0.0,
            "target": {"mode": "group", "groupId": "audio"},
            "mediaType": "audio",
            "action": "play"
        });
        assert!(message_from_value(value).is_err());
    }

    #[test]
    fn test_hex_color() {
        assert!(is_hex_color("#fff"));
        assert!(is_hex_color("#00FFaa"));
        assert!(!is_hex_color("fff"));
        assert!(!is_hex_color("#ffff"));
        assert!(!is_hex_color("#ggg"));
    }

    #[test]
    fn test_execute_at_ignored_on_data() {
        let message = Message::data(DataSample::Custom {
            name: "tap".to_string(),
            value: json!(1),
        })
        .with_execute_at(10.0);
        assert_eq!(message.execute_at(), None);
    }

    #[test]
    fn test_execute_at_must_be_a_plausible_time() {
        let mut far = control_json();
        far["executeAt"] = json!(1e300);
        assert!(matches!(message_from_value(far), Err(ProtocolError::InvalidPayload(_))));

        let mut negative = control_json();
        negative["executeAt"] = json!(-1.0);
        assert!(message_from_value(negative).is_err());

        let message = Message::control(Origin::Manager, TargetSelector::All, ControlAction::StopSound)
            .with_execute_at(f64::NAN);
        assert!(message.validate().is_err());
        assert!(message_from_value(control_json()).is_ok());
    }
}
