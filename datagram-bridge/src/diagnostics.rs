//! Logging collaborator injected into each connection.
//!
//! Components never log through a process-wide handle of their own; they
//! report [`Event`]s to the [`Diagnostics`] they were constructed with.
//! [`LogDiagnostics`] forwards to the `log` facade (so `env_logger` or any
//! other backend picks them up), [`MemoryDiagnostics`] keeps them for
//! inspection in tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::Level;

/// Something worth reporting about a connection's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Socket bound or connected.
    Opened {
        local: SocketAddr,
        peer: Option<SocketAddr>,
    },
    ReceiverStarted,
    /// Worker left its loop after a stop request.
    ReceiverStopped,
    /// Worker left its loop because of a fatal OS error.
    ReceiverFailed { kind: std::io::ErrorKind, message: String },
    /// ICMP feedback on a connected socket; the peer is not up yet.
    PeerUnreachable { kind: std::io::ErrorKind },
    /// A buffered datagram was overwritten before anyone drained it.
    Evicted { seq: u64 },
    /// `close()` gave up waiting for the worker.
    ShutdownTimeout(Duration),
    Closed,
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Self::ReceiverFailed { .. } | Self::ShutdownTimeout(_) => Level::Error,
            Self::PeerUnreachable { .. } => Level::Warn,
            Self::Opened { .. } | Self::ReceiverStarted | Self::ReceiverStopped | Self::Closed => {
                Level::Info
            }
            Self::Evicted { .. } => Level::Trace,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened {
                local,
                peer: Some(peer),
            } => write!(f, "socket open on {local}, peer {peer}"),
            Self::Opened { local, peer: None } => write!(f, "socket bound on {local}"),
            Self::ReceiverStarted => write!(f, "receiver started"),
            Self::ReceiverStopped => write!(f, "receiver stopped"),
            Self::ReceiverFailed { kind, message } => {
                write!(f, "exception in receiver thread ({kind:?}): {message}")
            }
            Self::PeerUnreachable { kind } => write!(f, "peer unreachable ({kind:?})"),
            Self::Evicted { seq } => write!(f, "evicted datagram #{seq}"),
            Self::ShutdownTimeout(waited) => {
                write!(f, "receiver still running after {waited:?}; detaching")
            }
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

/// Sink for connection events.  Shared between the caller's thread and the
/// receiver worker, hence `Send + Sync`.
pub trait Diagnostics: Send + Sync {
    fn record(&self, event: Event);
}

/// Root of every target [`LogDiagnostics`] logs under.
pub const LOG_TARGET: &str = "datagram_bridge";

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Forwards events to the `log` facade under a fixed target.
#[derive(Debug, Clone)]
pub struct LogDiagnostics {
    target: String,
}

impl LogDiagnostics {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// A fresh `datagram_bridge::connN` target, unique within the process.
    /// `RUST_LOG=datagram_bridge` still matches all of them.
    pub fn for_connection() -> Self {
        let id = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self::new(format!("{LOG_TARGET}::conn{id}"))
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Default for LogDiagnostics {
    fn default() -> Self {
        Self::new(LOG_TARGET)
    }
}

impl Diagnostics for LogDiagnostics {
    fn record(&self, event: Event) {
        log::log!(target: self.target.as_str(), event.level(), "{event}");
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    events: Mutex<Vec<Event>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, pred: impl Fn(&Event) -> bool) -> bool {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(pred)
    }
}

impl Diagnostics for MemoryDiagnostics {
    fn record(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
