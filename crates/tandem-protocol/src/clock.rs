//! Round-trip clock offset estimation
//!
//! The non-authoritative side pings the server with its local send time; the
//! pong carries the server time. Each exchange yields one `(rtt, offset)`
//! sample under the midpoint assumption. Samples are kept in two parallel
//! bounded rings and reduced to a single offset:
//!
//! - Fewer than three valid pairs: median of all offsets.
//! - Otherwise: the lowest-rtt quarter (at least three) of the valid pairs,
//!   median of their offsets. Low rtt means a more symmetric path.
//!
//! Adoption is rate limited so one noisy sample cannot jump the offset by
//! more than [`MAX_OFFSET_STEP_MS`](crate::constants::clock::MAX_OFFSET_STEP_MS).

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::constants::clock as defaults;
use crate::frame::TimePong;

/// Local wall clock in milliseconds since the Unix epoch
pub fn now_ms() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1000.0
}

/// Tunables for the offset estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSyncConfig {
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_max_offset_step")]
    pub max_offset_step_ms: f64,
    #[serde(default)]
    pub min_delay_ms: f64,
}

fn default_max_samples() -> usize {
    defaults::MAX_SAMPLES
}

fn default_max_offset_step() -> f64 {
    defaults::MAX_OFFSET_STEP_MS
}

impl Default for ClockSyncConfig {
    fn default() -> Self {
        Self {
            max_samples: defaults::MAX_SAMPLES,
            max_offset_step_ms: defaults::MAX_OFFSET_STEP_MS,
            min_delay_ms: defaults::MIN_DELAY_MS,
        }
    }
}

/// Outcome of a single ping/pong exchange
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSyncResult {
    pub rtt: f64,
    pub offset: f64,
    pub server_timestamp: f64,
}

/// Compute rtt and offset for one exchange
///
/// `offset = server_time - (client_send + rtt / 2)`
pub fn calculate_time_sync(client_send: f64, server_time: f64, client_receive: f64) -> TimeSyncResult {
    let rtt = client_receive - client_send;
    let offset = server_time - (client_send + rtt / 2.0);
    TimeSyncResult {
        rtt,
        offset,
        server_timestamp: server_time,
    }
}

/// Per-connection estimator state
///
/// `samples.len() == rtt_samples.len() <= config.max_samples` after every
/// update.
#[derive(Debug, Clone)]
pub struct TimeSyncState {
    offset: f64,
    samples: VecDeque<f64>,
    rtt_samples: VecDeque<f64>,
    initialized: bool,
    last_sync_time: Option<f64>,
    config: ClockSyncConfig,
}

impl TimeSyncState {
    pub fn new() -> Self {
        Self::with_config(ClockSyncConfig::default())
    }

    pub fn with_config(config: ClockSyncConfig) -> Self {
        Self {
            offset: 0.0,
            samples: VecDeque::with_capacity(config.max_samples),
            rtt_samples: VecDeque::with_capacity(config.max_samples),
            initialized: false,
            last_sync_time: None,
            config: ClockSyncConfig {
                max_samples: config.max_samples.max(1),
                ..config
            },
        }
    }

    /// Adopted offset (server time minus local time), in ms
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn samples(&self) -> &VecDeque<f64> {
        &self.samples
    }

    pub fn rtt_samples(&self) -> &VecDeque<f64> {
        &self.rtt_samples
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Local time of the last adopted sample
    pub fn last_sync_time(&self) -> Option<f64> {
        self.last_sync_time
    }

    pub fn config(&self) -> &ClockSyncConfig {
        &self.config
    }

    /// Forget all history; only done when the connection is re-established
    pub fn reset(&mut self) {
        let config = self.config;
        *self = Self::with_config(config);
    }

    /// Feed a pong received at local time `client_receive`
    pub fn apply_pong(&mut self, pong: &TimePong, client_receive: f64) -> TimeSyncResult {
        let result = calculate_time_sync(pong.client_timestamp, pong.server_timestamp, client_receive);
        update_time_sync_state(self, &result);
        result
    }
}

impl Default for TimeSyncState {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold one exchange into the estimator and adopt a new offset
pub fn update_time_sync_state(state: &mut TimeSyncState, result: &TimeSyncResult) {
    update_time_sync_state_at(state, result, now_ms());
}

/// [`update_time_sync_state`] with an explicit local clock reading
pub fn update_time_sync_state_at(state: &mut TimeSyncState, result: &TimeSyncResult, local_now: f64) {
    let max = state.config.max_samples;

    // Older history may be shorter on the rtt side; pad so indices line up.
    while state.rtt_samples.len() < state.samples.len() {
        state.rtt_samples.push_front(f64::INFINITY);
    }
    while state.rtt_samples.len() > state.samples.len() {
        state.rtt_samples.pop_front();
    }

    state.samples.push_back(result.offset);
    state.rtt_samples.push_back(result.rtt);
    while state.samples.len() > max {
        state.samples.pop_front();
        state.rtt_samples.pop_front();
    }

    let Some(target) = estimate_offset(&state.samples, &state.rtt_samples) else {
        log::debug!("No finite offset samples yet; keeping {}", state.offset);
        return;
    };

    if state.initialized {
        let step = state.config.max_offset_step_ms;
        state.offset += (target - state.offset).clamp(-step, step);
    } else {
        state.offset = target;
        state.initialized = true;
    }
    state.last_sync_time = Some(local_now);
}

/// Reduce the sample rings to a target offset
fn estimate_offset(samples: &VecDeque<f64>, rtts: &VecDeque<f64>) -> Option<f64> {
    let mut valid: Vec<(f64, f64)> = samples
        .iter()
        .zip(rtts.iter())
        .filter(|(offset, rtt)| offset.is_finite() && rtt.is_finite() && **rtt >= 0.0)
        .map(|(offset, rtt)| (*rtt, *offset))
        .collect();

    if valid.len() < defaults::MIN_VALID_PAIRS {
        let offsets: Vec<f64> = samples.iter().copied().filter(|o| o.is_finite()).collect();
        return median(offsets);
    }

    valid.sort_by(|a, b| a.0.total_cmp(&b.0));
    let best = ((valid.len() as f64 * defaults::BEST_RTT_FRACTION).ceil() as usize)
        .max(defaults::MIN_VALID_PAIRS)
        .min(valid.len());
    median(valid[..best].iter().map(|(_, offset)| *offset).collect())
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Estimated server time now
pub fn get_server_time(state: &TimeSyncState) -> f64 {
    server_time_at(state, now_ms())
}

/// Estimated server time at local time `local_now`
pub fn server_time_at(state: &TimeSyncState, local_now: f64) -> f64 {
    local_now + state.offset
}

/// Milliseconds until `execute_at` in the server time domain
///
/// Negative means the deadline already passed; callers execute immediately
/// instead of arming a timer.
pub fn calculate_execution_delay(execute_at: f64, state: &TimeSyncState) -> f64 {
    calculate_execution_delay_at(execute_at, state, now_ms())
}

pub fn calculate_execution_delay_at(execute_at: f64, state: &TimeSyncState, local_now: f64) -> f64 {
    execute_at - server_time_at(state, local_now)
}

/// A timer armed by [`schedule_at_server_time`]
#[derive(Debug)]
pub struct ScheduledExecution {
    /// Unclamped delay; negative when the deadline had already passed
    pub raw_delay_ms: f64,
    /// Delay actually handed to the timer
    pub timer_delay_ms: f64,
    /// False when the delay could not be armed and the action was dropped
    pub armed: bool,
    pub handle: JoinHandle<()>,
}

impl ScheduledExecution {
    /// Whether the deadline was already in the past when scheduled
    pub fn is_late(&self) -> bool {
        self.raw_delay_ms < 0.0
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}

/// Run `action` at server time `execute_at`
///
/// The timer delay is clamped to `min_delay_ms`; the raw delay is returned so
/// the caller can tell "on time" from "already late". A delay too large for a
/// timer drops the action instead of arming it. Must be called inside a
/// tokio runtime.
pub fn schedule_at_server_time<F, Fut>(execute_at: f64, state: &TimeSyncState, action: F) -> ScheduledExecution
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let raw_delay_ms = calculate_execution_delay(execute_at, state);
    let timer_delay_ms = raw_delay_ms.max(state.config.min_delay_ms).max(0.0);
    let (armed, handle) = match Duration::try_from_secs_f64(timer_delay_ms / 1000.0) {
        Ok(delay) => {
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                action().await;
            });
            (true, handle)
        }
        Err(e) => {
            log::warn!("Dropping action scheduled for executeAt {}: {}", execute_at, e);
            (false, tokio::spawn(async {}))
        }
    };
    ScheduledExecution {
        raw_delay_ms,
        timer_delay_ms,
        armed,
        handle,
    }
}
