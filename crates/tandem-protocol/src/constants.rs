//! Protocol-wide constants
//!
//! Single source of truth for protocol versioning, timing defaults and
//! bookkeeping limits shared by the server, the manager and the clients.

/// Envelope version every peer must speak. Anything else is dropped.
pub const PROTOCOL_VERSION: u32 = 1;

/// Clock synchronization defaults
pub mod clock {
    /// Size of the offset/rtt sample rings
    pub const MAX_SAMPLES: usize = 10;
    /// Largest offset adjustment adopted per update (ms)
    pub const MAX_OFFSET_STEP_MS: f64 = 100.0;
    /// Smallest timer delay handed to the scheduler (ms)
    pub const MIN_DELAY_MS: f64 = 0.0;
    /// Below this many valid rtt/offset pairs the plain median is used
    pub const MIN_VALID_PAIRS: usize = 3;
    /// Fraction of lowest-rtt pairs considered once enough history exists
    pub const BEST_RTT_FRACTION: f64 = 0.25;
    /// Latest accepted `executeAt` (ms since the epoch, the JavaScript date limit)
    pub const MAX_EXECUTE_AT_MS: f64 = 8.64e15;
}

/// Node executor plugin defaults
pub mod executor {
    /// Plugin id carried in `plugin` envelopes for node executor commands
    pub const PLUGIN_ID: &str = "node-executor";
    /// How long a deploy may stay pending before it is presumed lost (ms)
    pub const DEPLOY_TIMEOUT_MS: u64 = 8000;
    /// Status events retained per client
    pub const EVENT_LOG_LIMIT: usize = 30;
}

/// Wire frame event names
pub mod events {
    pub const MESSAGE: &str = "message";
    pub const TIME_PING: &str = "time:ping";
    pub const TIME_PONG: &str = "time:pong";
    pub const SELECT_CLIENTS: &str = "select:clients";
}
