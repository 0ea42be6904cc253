//! `datagram-bridge`: a fixed-tick control loop talking to a remote peer
//! over UDP, favouring the freshest datagram over complete history.
//!
//! # Architecture
//!
//! ```text
//!  control loop
//!      │ step(action)
//!  ┌───▼────────────┐  encode + send   ┌──────────────┐
//!  │   StepBridge   │─────────────────▶│              │
//!  └───┬────────────┘                  │  Transport   │──▶ peer
//!      │ get_data()                    │ (UdpSocket)  │◀── peer
//!  ┌───▼─────────────────┐             └──────┬───────┘
//!  │  ConnectionManager  │                    │ receive_one(timeout)
//!  │  ┌───────────────┐  │   push      ┌──────▼─────────────┐
//!  │  │ BoundedBuffer │◀─┼─────────────│ BackgroundReceiver │
//!  │  └───────────────┘  │             │  (worker thread)   │
//!  └─────────────────────┘             └────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`socket`]      — blocking UDP transport and the [`socket::Datagram`] type
//! - [`buffer`]      — bounded overwrite-on-full FIFO shared between threads
//! - [`state`]       — receiver finite-state machine
//! - [`receiver`]    — background worker draining the socket into the buffer
//! - [`connection`]  — facade owning socket, buffer and worker lifecycle
//! - [`frame`]       — wire frames (24-byte state, opaque observations)
//! - [`bridge`]      — one control-loop tick: act, settle, observe
//! - [`config`]      — tunable parameters and their defaults
//! - [`diagnostics`] — logging collaborator injected into each connection
//! - [`error`]       — error taxonomy
//! - [`simulator`]   — lossy/failing datagram source for tests

pub mod bridge;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod receiver;
pub mod simulator;
pub mod socket;
pub mod state;

pub use bridge::{Observation, StepBridge, StepInfo, StepOutcome};
pub use config::{BridgeConfig, ConnectionConfig, EmptyObservationPolicy};
pub use connection::ConnectionManager;
pub use error::{BridgeError, FrameError};
pub use socket::Datagram;
