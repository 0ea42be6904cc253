//! Error taxonomy for the datagram bridge.
//!
//! Setup-time failures (bad address, operations called out of order) are
//! returned synchronously to the caller.  Runtime receive failures never
//! surface here: they are confined to the receiver worker, which logs them
//! and stops (see [`crate::receiver`]).

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by [`crate::socket::Transport`],
/// [`crate::connection::ConnectionManager`] and [`crate::bridge::StepBridge`].
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host/port could not be resolved, bound, or connected.
    #[error("address error for {addr}: {source}")]
    Address {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// `send` / `listen` called before `bind` or `connect`.
    #[error("socket is not connected; call bind() or connect() first")]
    NotConnected,

    /// `bind` / `connect` called on a connection that is already open.
    #[error("socket is already open on {0}")]
    AlreadyOpen(SocketAddr),

    /// `listen` called while a receiver worker already exists.
    #[error("receiver is already listening")]
    AlreadyListening,

    /// Any operation on a connection after `close`.
    #[error("connection has been closed and cannot be reused")]
    Closed,

    /// `send` without an explicit address on a bound (not connected) socket.
    #[error("no default peer: socket was bound, pass an explicit address")]
    NoDefaultPeer,

    /// OS-level send failure.  Not fatal; the next tick may retry.
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    /// OS-level receive failure other than a timeout.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// The receiver worker did not stop within the bounded join interval.
    /// The thread is detached and will exit on its next timeout.
    #[error("receiver did not stop within {0:?}; worker thread leaked")]
    ShutdownTimeout(Duration),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeError {
    /// `true` for errors caused by calling operations in the wrong order.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::AlreadyOpen(_)
                | Self::AlreadyListening
                | Self::Closed
                | Self::NoDefaultPeer
        )
    }
}

/// Errors produced when decoding a state frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("state frame must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("payload length {0} is not a multiple of 4")]
    Misaligned(usize),
}
