//! Control-loop bridge.
//!
//! [`StepBridge::step`] turns one action into one tick of network exchange:
//!
//! 1. accumulate `action * scale_factor` into the state and clamp to `[-1, 1]`;
//! 2. send the state as a 24-byte frame (see [`crate::frame`]);
//! 3. sleep for the settling interval so the peer can answer;
//! 4. drain the buffer and keep only the newest datagram;
//! 5. return it as this tick's observation.
//!
//! The settling sleep is rate limiting, not an acknowledgement: a reply that
//! arrives later simply shows up on a later tick.  The bridge never signals
//! termination or truncation; that belongs to the control loop above it.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BridgeConfig, EmptyObservationPolicy};
use crate::connection::ConnectionManager;
use crate::diagnostics::{Diagnostics, LogDiagnostics};
use crate::error::BridgeError;
use crate::frame::{encode_state, STATE_DIM};
use crate::socket::Datagram;

/// The raw observation payload of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub datagram: Datagram,
    /// `false` when re-yielded under [`EmptyObservationPolicy::HoldLast`].
    pub fresh: bool,
}

impl Observation {
    pub fn payload(&self) -> &[u8] {
        &self.datagram.payload
    }
}

/// Auxiliary per-tick information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepInfo {
    /// Datagrams drained this tick (all but the newest are discarded).
    pub datagrams: usize,
    /// Whether the observation arrived this tick.  `false` both for a held
    /// observation and for none at all.
    pub fresh: bool,
}

/// Result of one [`StepBridge::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: Option<Observation>,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

/// Add `action * scale` to `state`, clamping each component to `[-1, 1]`.
///
/// NaN components of `action` leave the matching state component unchanged.
pub fn accumulate(state: &mut [f32; STATE_DIM], action: &[f32; STATE_DIM], scale: f32) {
    for (s, a) in state.iter_mut().zip(action) {
        let next = *s + a * scale;
        if !next.is_nan() {
            *s = next.clamp(-1.0, 1.0);
        }
    }
}

/// Owns the connection and the accumulated state of one control loop.
pub struct StepBridge {
    conn: ConnectionManager,
    state: [f32; STATE_DIM],
    scale_factor: f32,
    settle_interval: Duration,
    empty_policy: EmptyObservationPolicy,
    last: Option<Datagram>,
}

impl StepBridge {
    /// Connect to `config.host:config.port` and start listening.
    pub fn open(config: BridgeConfig) -> Result<Self, BridgeError> {
        Self::open_with_diagnostics(config, Arc::new(LogDiagnostics::for_connection()))
    }

    pub fn open_with_diagnostics(
        config: BridgeConfig,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let mut conn = ConnectionManager::with_diagnostics(config.connection.clone(), diagnostics)?;
        conn.connect(&config.host, config.port)?;
        conn.listen()?;
        Ok(Self::with_connection(conn, &config))
    }

    /// Wrap an already open, listening connection.
    pub fn with_connection(conn: ConnectionManager, config: &BridgeConfig) -> Self {
        Self {
            conn,
            state: [0.0; STATE_DIM],
            scale_factor: config.scale_factor,
            settle_interval: config.settle_interval,
            empty_policy: config.empty_policy,
            last: None,
        }
    }

    /// Run one tick.  A send failure is returned as-is; the state update
    /// has already happened and is re-sent on the next tick.
    pub fn step(&mut self, action: &[f32; STATE_DIM]) -> Result<StepOutcome, BridgeError> {
        accumulate(&mut self.state, action, self.scale_factor);
        let (observation, datagrams) = self.exchange()?;
        let fresh = observation.as_ref().is_some_and(|o| o.fresh);
        Ok(StepOutcome {
            observation,
            reward: 0.0,
            terminated: false,
            truncated: false,
            info: StepInfo { datagrams, fresh },
        })
    }

    /// Zero the state, drop anything stale, and fetch a first observation.
    pub fn reset(&mut self) -> Result<Option<Observation>, BridgeError> {
        self.state = [0.0; STATE_DIM];
        self.last = None;
        let stale = self.conn.get_data();
        if !stale.is_empty() {
            log::debug!("reset discarded {} stale datagram(s)", stale.len());
        }
        Ok(self.exchange()?.0)
    }

    fn exchange(&mut self) -> Result<(Option<Observation>, usize), BridgeError> {
        self.conn.send(&encode_state(&self.state), None)?;
        std::thread::sleep(self.settle_interval);

        let mut data = self.conn.get_data();
        let drained = data.len();
        let observation = match data.pop() {
            Some(newest) => {
                self.last = Some(newest.clone());
                Some(Observation {
                    datagram: newest,
                    fresh: true,
                })
            }
            None => match self.empty_policy {
                EmptyObservationPolicy::Propagate => None,
                EmptyObservationPolicy::HoldLast => self.last.clone().map(|datagram| Observation {
                    datagram,
                    fresh: false,
                }),
            },
        };
        if observation.is_none() && !self.conn.healthy() {
            log::warn!("no observation and receiver is {}", self.conn.receiver_state());
        }
        Ok((observation, drained))
    }

    pub fn state(&self) -> &[f32; STATE_DIM] {
        &self.state
    }

    /// See [`ConnectionManager::healthy`].
    pub fn healthy(&self) -> bool {
        self.conn.healthy()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    pub fn close(&mut self) -> Result<(), BridgeError> {
        self.conn.close()
    }
}

impl std::fmt::Debug for StepBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepBridge")
            .field("conn", &self.conn)
            .field("state", &self.state)
            .finish()
    }
}
