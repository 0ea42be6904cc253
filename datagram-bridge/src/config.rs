//! Tunable parameters for the connection and the step bridge.
//!
//! Both structs implement [`Default`] with the values the bridge was tuned
//! for; the diagnostic binary overrides individual fields from CLI flags.

use std::time::Duration;

use crate::error::BridgeError;

/// Default number of datagrams kept before the oldest is overwritten.
pub const DEFAULT_BUFFER_CAPACITY: usize = 2;
/// Default size of the OS receive buffer for a single datagram.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1024;
/// Default socket receive timeout; also bounds worst-case stop latency.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_millis(500);
/// Extra time `close()` waits for the worker beyond one socket timeout.
pub const DEFAULT_SHUTDOWN_SLACK: Duration = Duration::from_millis(250);
/// Default wait between sending an action and draining the buffer.
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_millis(10);
/// Default multiplier applied to each action before accumulation.
pub const DEFAULT_SCALE_FACTOR: f32 = 0.1;

/// Parameters of one [`crate::connection::ConnectionManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Maximum datagrams held between drains (≥ 1).
    pub buffer_capacity: usize,
    /// Bytes read per `recv_from`; longer datagrams are truncated by the OS.
    pub recv_buffer_size: usize,
    /// Read timeout on the socket (> 0).
    pub socket_timeout: Duration,
    /// Added to `socket_timeout` to bound the join in `close()`.
    pub shutdown_slack: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            shutdown_slack: DEFAULT_SHUTDOWN_SLACK,
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.buffer_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "buffer_capacity must be at least 1".into(),
            ));
        }
        if self.recv_buffer_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "recv_buffer_size must be at least 1".into(),
            ));
        }
        // std rejects a zero read timeout.
        if self.socket_timeout.is_zero() {
            return Err(BridgeError::InvalidConfig(
                "socket_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Upper bound on how long `close()` waits for the worker to exit.
    pub fn join_timeout(&self) -> Duration {
        self.socket_timeout + self.shutdown_slack
    }
}

/// What [`crate::bridge::StepBridge::step`] yields when no datagram arrived
/// during the tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyObservationPolicy {
    /// Report `observation: None`.
    #[default]
    Propagate,
    /// Re-yield the last datagram ever seen, marked as not fresh.
    HoldLast,
}

/// Parameters of a [`crate::bridge::StepBridge`].
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Peer host name or IPv4 literal.
    pub host: String,
    pub port: u16,
    pub settle_interval: Duration,
    pub scale_factor: f32,
    pub empty_policy: EmptyObservationPolicy,
    pub connection: ConnectionConfig,
}

impl BridgeConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            settle_interval: DEFAULT_SETTLE_INTERVAL,
            scale_factor: DEFAULT_SCALE_FACTOR,
            empty_policy: EmptyObservationPolicy::default(),
            connection: ConnectionConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if !self.scale_factor.is_finite() {
            return Err(BridgeError::InvalidConfig(format!(
                "scale_factor must be finite, got {}",
                self.scale_factor
            )));
        }
        self.connection.validate()
    }
}
