//! Fault-injecting datagram source for deterministic testing.
//!
//! Real networks drop and duplicate datagrams, and sockets occasionally die.
//! [`SimulatedSource`] implements [`DatagramSource`] over an in-memory queue
//! fed through a [`SimulatorHandle`], applying a seeded fault model:
//!
//! | Fault        | Description                                          |
//! |--------------|------------------------------------------------------|
//! | Loss         | Drop a queued datagram with probability `loss_rate`. |
//! | Duplication  | Deliver a datagram twice with `duplicate_rate`.      |
//! | Fatal error  | Fail every receive after `fail_after` deliveries.    |
//!
//! The same seed always produces the same fault sequence.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::BridgeError;
use crate::socket::{Datagram, DatagramSource};

/// Fault model.  Probabilities are clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    /// Deliveries before every further receive fails (`None` = never).
    pub fail_after: Option<u64>,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // Transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            fail_after: None,
            seed: 0,
        }
    }
}

type Queue = Arc<Mutex<VecDeque<(Vec<u8>, SocketAddr)>>>;

/// Feeds datagrams into a [`SimulatedSource`] from any thread.
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    queue: Queue,
}

impl SimulatorHandle {
    pub fn inject(&self, payload: impl Into<Vec<u8>>, sender: SocketAddr) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((payload.into(), sender));
    }

    /// Datagrams injected but not yet consumed by the source.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// In-memory [`DatagramSource`] with injected faults.
#[derive(Debug)]
pub struct SimulatedSource {
    config: SimulatorConfig,
    rng: StdRng,
    queue: Queue,
    duplicate: Option<(Vec<u8>, SocketAddr)>,
    delivered: u64,
    next_seq: u64,
}

impl SimulatedSource {
    pub fn new(mut config: SimulatorConfig) -> (Self, SimulatorHandle) {
        config.loss_rate = config.loss_rate.clamp(0.0, 1.0);
        config.duplicate_rate = config.duplicate_rate.clamp(0.0, 1.0);
        let queue: Queue = Arc::default();
        let source = Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            queue: Arc::clone(&queue),
            duplicate: None,
            delivered: 0,
            next_seq: 0,
        };
        (source, SimulatorHandle { queue })
    }

    fn deliver(&mut self, payload: Vec<u8>, sender: SocketAddr) -> Datagram {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.delivered += 1;
        Datagram {
            payload,
            sender,
            seq,
        }
    }
}

impl DatagramSource for SimulatedSource {
    fn receive_one(&mut self, timeout: Duration) -> Result<Option<Datagram>, BridgeError> {
        if self.config.fail_after.is_some_and(|n| self.delivered >= n) {
            return Err(BridgeError::Transport(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated socket failure",
            )));
        }

        if let Some((payload, sender)) = self.duplicate.take() {
            return Ok(Some(self.deliver(payload, sender)));
        }

        let next = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some((payload, sender)) = next else {
            // Behave like a socket read timeout, but do not stall tests for
            // the full interval.
            std::thread::sleep(timeout.min(Duration::from_millis(5)));
            return Ok(None);
        };

        if self.rng.random_bool(self.config.loss_rate) {
            return Ok(None);
        }
        if self.rng.random_bool(self.config.duplicate_rate) {
            self.duplicate = Some((payload.clone(), sender));
        }
        Ok(Some(self.deliver(payload, sender)))
    }
}
