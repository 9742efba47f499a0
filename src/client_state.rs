/// file: src/client_state.rs
/// description: connection lifecycle state machine and reconnect backoff, kept apart from socket I/O
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Exponential reconnect delay: `floor * multiplier^failures`, capped at `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub floor: Duration,
    pub ceiling: Duration,
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            floor: Duration::from_millis(1_000),
            ceiling: Duration::from_millis(30_000),
            multiplier: 1.5,
        }
    }
}

impl Backoff {
    pub fn delay_after(&self, failures: u32) -> Duration {
        let floor = self.floor.as_millis() as f64;
        let ceiling = self.ceiling.as_millis() as f64;
        let millis = (floor * self.multiplier.powi(failures as i32)).min(ceiling);
        Duration::from_millis(millis.round() as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

impl ConnectionPhase {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionPhase::Idle => "IDLE",
            ConnectionPhase::Connecting => "CONNECTING",
            ConnectionPhase::Open => "CONNECTED",
            ConnectionPhase::Closed => "DISCONNECTED",
            ConnectionPhase::Failed => "FAILED",
        }
    }
}

/// What the driver should do after the transport closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp,
    Stopped,
}

#[derive(Debug)]
pub struct ConnectionState {
    pub connection_id: String,
    pub phase: ConnectionPhase,
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub max_attempts: u32,
    pub reconnect_delay: Duration,
    pub scanning: bool,
    pub backoff: Backoff,
    pub stopped: bool,
    pub offline: bool,
    pub last_message_time: Option<Instant>,
    pub total_messages_received: u64,
    pub malformed_frames: u64,
    pub last_disconnection_time: Option<Instant>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(10, Backoff::default())
    }
}

impl ConnectionState {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            phase: ConnectionPhase::Idle,
            connected: false,
            reconnect_attempts: 0,
            max_attempts,
            reconnect_delay: backoff.floor,
            scanning: false,
            backoff,
            stopped: false,
            offline: false,
            last_message_time: None,
            total_messages_received: 0,
            malformed_frames: 0,
            last_disconnection_time: None,
        }
    }

    pub fn start(&mut self) {
        self.reset_backoff();
        self.stopped = false;
        self.phase = ConnectionPhase::Connecting;
    }

    /// Operator-requested reconnect. The only way out of `Failed`.
    pub fn manual_reconnect(&mut self) {
        self.reset_backoff();
        self.stopped = false;
        self.offline = false;
        self.connected = false;
        self.phase = ConnectionPhase::Connecting;
    }

    pub fn on_open(&mut self) {
        self.connection_id = uuid::Uuid::new_v4().to_string();
        self.phase = ConnectionPhase::Open;
        self.connected = true;
        self.offline = false;
        self.last_message_time = Some(Instant::now());
        self.reset_backoff();
    }

    /// Transport closed or failed to open. Schedules the next attempt or gives up.
    pub fn on_close(&mut self) -> ReconnectDecision {
        self.mark_disconnected();

        if self.stopped {
            return ReconnectDecision::Stopped;
        }

        if self.reconnect_attempts >= self.max_attempts {
            self.phase = ConnectionPhase::Failed;
            return ReconnectDecision::GiveUp;
        }

        let delay = self.reconnect_delay;
        self.reconnect_attempts += 1;
        self.reconnect_delay = self.backoff.delay_after(self.reconnect_attempts);
        ReconnectDecision::Retry {
            attempt: self.reconnect_attempts,
            delay,
        }
    }

    /// Retry timer fired.
    pub fn begin_retry(&mut self) {
        if self.phase == ConnectionPhase::Closed && !self.stopped && !self.offline {
            self.phase = ConnectionPhase::Connecting;
        }
    }

    /// Manual disconnect; never followed by an automatic retry.
    pub fn shutdown(&mut self) {
        self.stopped = true;
        self.mark_disconnected();
    }

    /// Returns true when the caller should start connecting now.
    pub fn on_visible(&mut self) -> bool {
        self.wake()
    }

    /// Returns true when the caller should start connecting now.
    pub fn on_online(&mut self) -> bool {
        self.offline = false;
        self.wake()
    }

    pub fn on_offline(&mut self) {
        self.offline = true;
        self.mark_disconnected();
    }

    pub fn can_send(&self) -> bool {
        self.phase == ConnectionPhase::Open
    }

    pub fn record_message(&mut self) {
        self.last_message_time = Some(Instant::now());
        self.total_messages_received += 1;
    }

    pub fn record_malformed(&mut self) {
        self.malformed_frames += 1;
    }

    pub fn snapshot(&self) -> ConnectionStatus {
        ConnectionStatus {
            connection_id: self.connection_id.clone(),
            phase: self.phase,
            connected: self.connected,
            reconnect_attempts: self.reconnect_attempts,
            max_attempts: self.max_attempts,
            reconnect_delay_ms: self.reconnect_delay.as_millis() as u64,
            scanning: self.scanning,
            total_messages_received: self.total_messages_received,
            malformed_frames: self.malformed_frames,
        }
    }

    fn wake(&mut self) -> bool {
        let idle = matches!(self.phase, ConnectionPhase::Closed | ConnectionPhase::Idle);
        if idle && !self.stopped && !self.offline {
            self.phase = ConnectionPhase::Connecting;
            return true;
        }
        false
    }

    fn mark_disconnected(&mut self) {
        if self.connected {
            self.last_disconnection_time = Some(Instant::now());
        }
        self.connected = false;
        if self.phase != ConnectionPhase::Failed {
            self.phase = ConnectionPhase::Closed;
        }
    }

    fn reset_backoff(&mut self) {
        self.reconnect_attempts = 0;
        self.reconnect_delay = self.backoff.floor;
    }
}

/// Point-in-time view of the connection, safe to hand to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub connection_id: String,
    pub phase: ConnectionPhase,
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub max_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub scanning: bool,
    pub total_messages_received: u64,
    pub malformed_frames: u64,
}

pub type SharedConnectionState = Arc<Mutex<ConnectionState>>;

pub fn shared(state: ConnectionState) -> SharedConnectionState {
    Arc::new(Mutex::new(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECTED_MS: [u64; 11] = [
        1_000, 1_500, 2_250, 3_375, 5_063, 7_594, 11_391, 17_086, 25_629, 30_000, 30_000,
    ];

    #[test]
    fn test_backoff_curve() {
        let backoff = Backoff::default();
        for (k, expected) in EXPECTED_MS.iter().enumerate() {
            assert_eq!(backoff.delay_after(k as u32).as_millis() as u64, *expected);
        }
    }

    #[test]
    fn test_delay_grows_per_failure_then_fails() {
        let mut state = ConnectionState::default();
        state.start();
        assert_eq!(state.phase, ConnectionPhase::Connecting);

        for k in 1..=10u32 {
            let decision = state.on_close();
            assert_eq!(
                decision,
                ReconnectDecision::Retry {
                    attempt: k,
                    delay: Duration::from_millis(EXPECTED_MS[(k - 1) as usize]),
                }
            );
            assert_eq!(
                state.reconnect_delay.as_millis() as u64,
                EXPECTED_MS[k as usize]
            );
            assert_eq!(state.phase, ConnectionPhase::Closed);
            state.begin_retry();
            assert_eq!(state.phase, ConnectionPhase::Connecting);
        }

        assert_eq!(state.on_close(), ReconnectDecision::GiveUp);
        assert_eq!(state.phase, ConnectionPhase::Failed);

        // no automatic escape from Failed
        state.begin_retry();
        assert!(!state.on_visible());
        assert!(!state.on_online());
        assert_eq!(state.phase, ConnectionPhase::Failed);

        state.manual_reconnect();
        assert_eq!(state.phase, ConnectionPhase::Connecting);
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(state.reconnect_delay, Duration::from_millis(1_000));
    }

    #[test]
    fn test_open_resets_backoff() {
        let mut state = ConnectionState::default();
        state.start();
        state.on_close();
        state.on_close();
        assert_eq!(state.reconnect_attempts, 2);

        let previous_id = state.connection_id.clone();
        state.begin_retry();
        state.on_open();
        assert!(state.connected);
        assert!(state.can_send());
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(state.reconnect_delay, Duration::from_millis(1_000));
        assert_ne!(state.connection_id, previous_id);
    }

    #[test]
    fn test_shutdown_never_retries() {
        let mut state = ConnectionState::default();
        state.start();
        state.on_open();
        state.shutdown();
        assert!(!state.can_send());
        assert_eq!(state.on_close(), ReconnectDecision::Stopped);
        assert_eq!(state.phase, ConnectionPhase::Closed);
        assert!(!state.on_visible());
    }

    #[test]
    fn test_offline_suspends_until_online() {
        let mut state = ConnectionState::default();
        state.start();
        state.on_open();
        state.on_offline();
        assert!(!state.connected);
        assert_eq!(state.phase, ConnectionPhase::Closed);

        state.begin_retry();
        assert_eq!(state.phase, ConnectionPhase::Closed);
        assert!(!state.on_visible());

        assert!(state.on_online());
        assert_eq!(state.phase, ConnectionPhase::Connecting);
        // already connecting, nothing more to do
        assert!(!state.on_visible());
    }

    #[test]
    fn test_message_counters() {
        let mut state = ConnectionState::default();
        state.record_message();
        state.record_malformed();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.total_messages_received, 1);
        assert_eq!(snapshot.malformed_frames, 1);
        assert_eq!(snapshot.phase, ConnectionPhase::Idle);
    }
}
