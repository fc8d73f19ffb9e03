//! Timing and bookkeeping knobs for deployment and playback

use std::time::Duration;

use tandem_protocol::constants::executor::{DEPLOY_TIMEOUT_MS, EVENT_LOG_LIMIT};

/// Manager-side deploy settings
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// How long a deploy may wait for its acknowledgement
    pub pending_timeout: Duration,
    /// Status events kept per client
    pub event_log_limit: usize,
    /// Send `start` as soon as a loop reports `deployed`
    pub auto_start: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::from_millis(DEPLOY_TIMEOUT_MS),
            event_log_limit: EVENT_LOG_LIMIT,
            auto_start: true,
        }
    }
}

/// Client-side playback settings
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Interval between ticks of running loops
    pub tick_interval: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_micros(16_667), // ~60 Hz
        }
    }
}
