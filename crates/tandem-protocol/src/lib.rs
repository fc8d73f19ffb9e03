//! Wire protocol shared by the tandem server, managers and clients
//!
//! - [`message`]: typed envelopes and edge validation
//! - [`target`]: target selectors and the matching predicate
//! - [`connection`]: per-socket records kept by the server
//! - [`clock`]: round-trip clock offset estimation and scheduling
//! - [`frame`]: websocket text frame codec

pub mod clock;
pub mod connection;
pub mod constants;
pub mod error;
pub mod frame;
pub mod message;
pub mod target;

pub use clock::{
    calculate_execution_delay, calculate_time_sync, get_server_time, now_ms, schedule_at_server_time,
    server_time_at, update_time_sync_state, ClockSyncConfig, ScheduledExecution, TimeSyncResult, TimeSyncState,
};
pub use connection::{ClientId, ClientSummary, ConnectionRecord, Origin, Role, SocketId};
pub use constants::PROTOCOL_VERSION;
pub use error::{ProtocolError, Result};
pub use frame::{Frame, SelectClients, TimePing, TimePong};
pub use message::{
    check_message, is_valid_message, message_from_value, parse_message, ControlAction, ControlMessage, DataMessage,
    DataSample, Envelope, FlashlightMode, MediaAction, MediaMessage, MediaType, Message, MessageKind, PluginMessage,
    ScreenMode, SystemEvent, SystemMessage,
};
pub use target::{matches_target, TargetSelector};
