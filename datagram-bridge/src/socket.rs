//! Blocking UDP transport.
//!
//! [`Transport`] owns the raw `std::net::UdpSocket` and exposes only byte
//! I/O: bind-or-connect, send, timeout-bounded receive, close.  No buffering
//! and no threads live here.  The receive half handed to the background
//! worker is a [`UdpSource`], which shares the socket through an `Arc` so the
//! caller's thread stays the single writer and the worker the single reader.

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use crate::config::DEFAULT_RECV_BUFFER_SIZE;
use crate::error::BridgeError;

// ---------------------------------------------------------------------------
// Datagram
// ---------------------------------------------------------------------------

/// One received datagram.  Immutable once buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub sender: SocketAddr,
    /// Arrival order assigned by the source that received it, starting at 0.
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// DatagramSource
// ---------------------------------------------------------------------------

/// Anything the background receiver can pull datagrams from.
pub trait DatagramSource: Send {
    /// Block for at most `timeout`.
    ///
    /// `Ok(None)` means nothing arrived in time; it is not an error.
    fn receive_one(&mut self, timeout: Duration) -> Result<Option<Datagram>, BridgeError>;
}

/// Timeout-class errors: the receive simply produced nothing.
pub(crate) fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

/// ICMP feedback surfaced on a connected socket while the peer is not up.
pub fn is_peer_unreachable(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
    )
}

/// Receive half of a [`Transport`], owned by the receiver worker.
#[derive(Debug)]
pub struct UdpSource {
    socket: Arc<UdpSocket>,
    buf: Vec<u8>,
    timeout: Option<Duration>,
    next_seq: u64,
}

impl UdpSource {
    fn new(socket: Arc<UdpSocket>, recv_buffer_size: usize) -> Self {
        Self {
            socket,
            buf: vec![0u8; recv_buffer_size.max(1)],
            timeout: None,
            next_seq: 0,
        }
    }
}

impl DatagramSource for UdpSource {
    fn receive_one(&mut self, timeout: Duration) -> Result<Option<Datagram>, BridgeError> {
        if self.timeout != Some(timeout) {
            self.socket
                .set_read_timeout(Some(timeout))
                .map_err(BridgeError::Transport)?;
            self.timeout = Some(timeout);
        }

        match self.socket.recv_from(&mut self.buf) {
            // Zero-length datagrams carry nothing for the control loop.
            Ok((0, _)) => Ok(None),
            Ok((n, sender)) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                Ok(Some(Datagram {
                    payload: self.buf[..n].to_vec(),
                    sender,
                    seq,
                }))
            }
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(BridgeError::Transport(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Resolve `host:port`, preferring an IPv4 address.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, BridgeError> {
    let display = format!("{host}:{port}");
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| BridgeError::Address {
            addr: display.clone(),
            source,
        })?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| BridgeError::Address {
            addr: display,
            source: std::io::Error::new(ErrorKind::NotFound, "host resolved to no addresses"),
        })
}

/// The single datagram socket of one connection.
///
/// Lifecycle: `new` → exactly one of `bind` / `connect` → any number of
/// `send` / `receive_one` → `close`.  A closed transport cannot be reopened.
#[derive(Debug)]
pub struct Transport {
    socket: Option<Arc<UdpSocket>>,
    local: Option<SocketAddr>,
    /// Default destination, set only by `connect`.
    peer: Option<SocketAddr>,
    direct: Option<UdpSource>,
    recv_buffer_size: usize,
    closed: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(DEFAULT_RECV_BUFFER_SIZE)
    }
}

impl Transport {
    pub fn new(recv_buffer_size: usize) -> Self {
        Self {
            socket: None,
            local: None,
            peer: None,
            direct: None,
            recv_buffer_size,
            closed: false,
        }
    }

    fn ensure_unopened(&self) -> Result<(), BridgeError> {
        if self.closed {
            return Err(BridgeError::Closed);
        }
        match self.local {
            Some(local) => Err(BridgeError::AlreadyOpen(local)),
            None => Ok(()),
        }
    }

    fn socket(&self) -> Result<&Arc<UdpSocket>, BridgeError> {
        match &self.socket {
            Some(socket) => Ok(socket),
            None if self.closed => Err(BridgeError::Closed),
            None => Err(BridgeError::NotConnected),
        }
    }

    fn install(&mut self, socket: UdpSocket, peer: Option<SocketAddr>) -> Result<SocketAddr, BridgeError> {
        let local = socket.local_addr().map_err(BridgeError::Transport)?;
        let socket = Arc::new(socket);
        self.direct = Some(UdpSource::new(Arc::clone(&socket), self.recv_buffer_size));
        self.socket = Some(socket);
        self.local = Some(local);
        self.peer = peer;
        Ok(local)
    }

    /// Bind as a receiver on `host:port`.  Returns the bound address, which
    /// differs from the request when `port` is 0.
    pub fn bind(&mut self, host: &str, port: u16) -> Result<SocketAddr, BridgeError> {
        self.ensure_unopened()?;
        let addr = resolve(host, port)?;
        let socket = UdpSocket::bind(addr).map_err(|source| BridgeError::Address {
            addr: addr.to_string(),
            source,
        })?;
        self.install(socket, None)
    }

    /// Open an ephemeral socket whose default destination is `host:port`.
    ///
    /// A connected UDP socket also filters inbound datagrams to that peer.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<SocketAddr, BridgeError> {
        self.ensure_unopened()?;
        let peer = resolve(host, port)?;
        let any: SocketAddr = if peer.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(any).map_err(|source| BridgeError::Address {
            addr: any.to_string(),
            source,
        })?;
        socket.connect(peer).map_err(|source| BridgeError::Address {
            addr: peer.to_string(),
            source,
        })?;
        self.install(socket, Some(peer))
    }

    /// Send one datagram to `addr`, or to the connected peer when `None`.
    pub fn send(&self, data: &[u8], addr: Option<SocketAddr>) -> Result<usize, BridgeError> {
        let socket = self.socket()?;
        match (addr, self.peer) {
            (Some(dest), _) => socket.send_to(data, dest).map_err(BridgeError::Send),
            (None, Some(_)) => socket.send(data).map_err(BridgeError::Send),
            (None, None) => Err(BridgeError::NoDefaultPeer),
        }
    }

    /// Receive on the caller's thread, without a background worker.
    ///
    /// Must not be mixed with a running [`crate::receiver::BackgroundReceiver`]
    /// on the same transport: the socket has exactly one reader.
    pub fn receive_one(&mut self, timeout: Duration) -> Result<Option<Datagram>, BridgeError> {
        if self.socket.is_none() {
            return Err(if self.closed {
                BridgeError::Closed
            } else {
                BridgeError::NotConnected
            });
        }
        match self.direct.as_mut() {
            Some(direct) => direct.receive_one(timeout),
            None => Err(BridgeError::NotConnected),
        }
    }

    /// A receive half for the background worker.
    pub fn source(&self) -> Result<UdpSource, BridgeError> {
        let socket = self.socket()?;
        Ok(UdpSource::new(Arc::clone(socket), self.recv_buffer_size))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release this handle on the socket.  Returns `false` if it was
    /// already closed (or never opened) and nothing was released.
    ///
    /// The OS socket itself is freed once the worker's [`UdpSource`] is
    /// dropped as well.
    pub fn close(&mut self) -> bool {
        self.closed = true;
        self.direct = None;
        self.peer = None;
        self.socket.take().is_some()
    }
}
