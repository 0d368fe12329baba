use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection lifecycle to the paired wearable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Relay and session tuning. Millisecond fields keep the TOML surface flat,
/// matching how the detector expresses its timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub heartbeat_interval_ms: u64,
    /// Consecutive missed pongs that force a disconnect.
    pub missed_heartbeat_limit: u32,
    pub ack_timeout_ms: u64,
    /// Total transmissions (first send + retries) before an alert is
    /// dropped as undeliverable.
    pub max_delivery_attempts: u32,
    pub max_pending_alerts: usize,
    pub reconnect_backoff_base_ms: u64,
    pub reconnect_backoff_max_ms: u64,
    pub connect_timeout_ms: u64,
    /// Grace given to flush pending alerts on shutdown.
    pub flush_grace_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            missed_heartbeat_limit: 2,
            ack_timeout_ms: 2_000,
            max_delivery_attempts: 3,
            max_pending_alerts: 64,
            reconnect_backoff_base_ms: 1_000,
            reconnect_backoff_max_ms: 30_000,
            connect_timeout_ms: 5_000,
            flush_grace_ms: 2_000,
        }
    }
}

impl RelayConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn flush_grace(&self) -> Duration {
        Duration::from_millis(self.flush_grace_ms)
    }

    /// Exponential reconnect backoff, capped: base × 2^attempt.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let base = self.reconnect_backoff_base_ms.max(1);
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(base.saturating_mul(factor).min(self.reconnect_backoff_max_ms))
    }

    /// Ack-timeout backoff for delivery retries: timeout × 2^(attempts-1).
    pub fn retry_deadline(&self, attempts: u32) -> Duration {
        let factor = 1u64 << attempts.saturating_sub(1).min(16);
        Duration::from_millis(self.ack_timeout_ms.saturating_mul(factor))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval_ms == 0 {
            return Err("heartbeat_interval_ms must be positive".into());
        }
        if self.missed_heartbeat_limit == 0 {
            return Err("missed_heartbeat_limit must be positive".into());
        }
        if self.max_delivery_attempts == 0 {
            return Err("max_delivery_attempts must be positive".into());
        }
        if self.max_pending_alerts == 0 {
            return Err("max_pending_alerts must be positive".into());
        }
        if self.reconnect_backoff_max_ms < self.reconnect_backoff_base_ms {
            return Err("reconnect_backoff_max_ms below base".into());
        }
        Ok(())
    }
}

/// Tracks session state, heartbeat misses, and reconnect attempts. The
/// relay task drives it; all transitions are logged in one place.
pub struct SessionTracker {
    state: SessionState,
    missed_pongs: u32,
    awaiting_pong: bool,
    reconnect_attempts: u32,
    ever_connected: bool,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            missed_pongs: 0,
            awaiting_pong: false,
            reconnect_attempts: 0,
            ever_connected: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn begin_connect(&mut self) {
        self.set_state(SessionState::Connecting);
    }

    /// Returns true when this is a re-connection rather than the first.
    pub fn connected(&mut self) -> bool {
        self.set_state(SessionState::Connected);
        self.missed_pongs = 0;
        self.awaiting_pong = false;
        self.reconnect_attempts = 0;
        let reconnect = self.ever_connected;
        self.ever_connected = true;
        reconnect
    }

    pub fn connect_failed(&mut self) {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        self.set_state(SessionState::Disconnected);
    }

    pub fn disconnected(&mut self) {
        self.reconnect_attempts = 0;
        self.awaiting_pong = false;
        self.missed_pongs = 0;
        self.set_state(SessionState::Disconnected);
    }

    pub fn pong_received(&mut self) {
        self.awaiting_pong = false;
        self.missed_pongs = 0;
    }

    /// A heartbeat interval elapsed. Returns false when the miss budget is
    /// spent and the link must be torn down; true when a ping should go out.
    pub fn heartbeat_due(&mut self, missed_limit: u32) -> bool {
        if self.awaiting_pong {
            self.missed_pongs += 1;
            tracing::warn!(missed = self.missed_pongs, "heartbeat pong missing");
            if self.missed_pongs >= missed_limit {
                return false;
            }
        }
        self.awaiting_pong = true;
        true
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            tracing::info!("Session state: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
