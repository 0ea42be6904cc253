//! Connection facade.
//!
//! A [`ConnectionManager`] composes one [`Transport`], one shared
//! [`BoundedBuffer`] and at most one [`BackgroundReceiver`], and owns their
//! lifecycle:
//!
//! ```ignore
//! let mut conn = ConnectionManager::new(ConnectionConfig::default())?;
//! conn.connect("192.168.1.100", 12345)?;
//! conn.listen()?;
//! conn.send(b"hello", None)?;
//! let fresh = conn.get_data();        // oldest → newest, possibly empty
//! conn.close()?;                      // also runs on drop
//! ```
//!
//! Only the buffer is touched by both threads.  The socket is written from
//! the caller's thread and read from the worker's.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::buffer::{BoundedBuffer, BufferStats};
use crate::config::ConnectionConfig;
use crate::diagnostics::{Diagnostics, Event, LogDiagnostics};
use crate::error::BridgeError;
use crate::receiver::BackgroundReceiver;
use crate::socket::{Datagram, DatagramSource, Transport};
use crate::state::ReceiverState;

/// Socket + overwrite buffer + receiver worker for one peer.
pub struct ConnectionManager {
    config: ConnectionConfig,
    transport: Transport,
    buffer: Arc<BoundedBuffer>,
    receiver: BackgroundReceiver,
    diagnostics: Arc<dyn Diagnostics>,
}

impl ConnectionManager {
    /// A manager that logs through the `log` facade under its own
    /// `datagram_bridge::connN` target.
    pub fn new(config: ConnectionConfig) -> Result<Self, BridgeError> {
        Self::with_diagnostics(config, Arc::new(LogDiagnostics::for_connection()))
    }

    pub fn with_diagnostics(
        config: ConnectionConfig,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        Ok(Self {
            transport: Transport::new(config.recv_buffer_size),
            buffer: Arc::new(BoundedBuffer::new(config.buffer_capacity)),
            receiver: BackgroundReceiver::new(config.socket_timeout),
            config,
            diagnostics,
        })
    }

    fn opened(&self, local: SocketAddr) -> SocketAddr {
        self.diagnostics.record(Event::Opened {
            local,
            peer: self.transport.peer_addr(),
        });
        local
    }

    /// Bind as a receiver on `host:port` (port 0 picks an ephemeral port).
    pub fn bind(&mut self, host: &str, port: u16) -> Result<SocketAddr, BridgeError> {
        let local = self.transport.bind(host, port)?;
        Ok(self.opened(local))
    }

    /// Open a socket whose default destination is `host:port`.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<SocketAddr, BridgeError> {
        let local = self.transport.connect(host, port)?;
        Ok(self.opened(local))
    }

    /// Start the background receiver.  Requires a prior `bind` or `connect`.
    pub fn listen(&mut self) -> Result<(), BridgeError> {
        let source = self.transport.source()?;
        self.listen_with(source)
    }

    /// Start the receiver on an arbitrary source, e.g. a
    /// [`crate::simulator::SimulatedSource`].  The same ordering rules as
    /// [`listen`](Self::listen) apply.
    pub fn listen_with<S>(&mut self, source: S) -> Result<(), BridgeError>
    where
        S: DatagramSource + 'static,
    {
        if self.transport.is_closed() {
            return Err(BridgeError::Closed);
        }
        if !self.transport.is_open() {
            return Err(BridgeError::NotConnected);
        }
        self.receiver
            .start(source, Arc::clone(&self.buffer), Arc::clone(&self.diagnostics))
    }

    /// Send `data` to `addr`, or to the connected peer when `None`.
    ///
    /// Usable whether or not the receiver is running.
    pub fn send(&self, data: &[u8], addr: Option<SocketAddr>) -> Result<usize, BridgeError> {
        self.transport.send(data, addr)
    }

    /// Everything received since the last call, oldest first.
    pub fn get_data(&self) -> Vec<Datagram> {
        self.buffer.drain_all()
    }

    /// `true` while the receiver worker is running.
    ///
    /// Lets callers tell "no new data yet" (healthy, empty `get_data`) from
    /// "the receiver died" (unhealthy).
    pub fn healthy(&self) -> bool {
        !self.transport.is_closed() && self.receiver.is_running()
    }

    pub fn receiver_state(&self) -> ReceiverState {
        self.receiver.state()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.transport.peer_addr()
    }

    pub fn stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Stop the receiver, wait for it (bounded), then release the socket.
    ///
    /// Safe before `listen` and safe to call repeatedly; only the first call
    /// does anything.  If the worker outlives the join bound the socket is
    /// still closed and [`BridgeError::ShutdownTimeout`] is returned.
    pub fn close(&mut self) -> Result<(), BridgeError> {
        if self.transport.is_closed() {
            return Ok(());
        }

        self.receiver.stop();
        let joined = self.receiver.join(self.config.join_timeout());
        if let Err(BridgeError::ShutdownTimeout(waited)) = &joined {
            self.diagnostics.record(Event::ShutdownTimeout(*waited));
        }

        if self.transport.close() {
            self.diagnostics.record(Event::Closed);
        }
        joined
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // A shutdown timeout has already been reported by `close`.
        let _ = self.close();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("local", &self.transport.local_addr())
            .field("peer", &self.transport.peer_addr())
            .field("receiver", &self.receiver.state())
            .field("buffer", &self.buffer)
            .finish()
    }
}
