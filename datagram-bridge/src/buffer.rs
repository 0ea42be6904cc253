//! Fixed-capacity overwrite-on-full datagram buffer.
//!
//! The only structure shared between the receiver worker (pushing) and the
//! caller's thread (draining).  Every access takes the single mutex for the
//! duration of one mutation; nothing blocks while holding it.
//!
//! Invariants:
//! - `len() <= capacity()` at all times;
//! - insertion order is preserved;
//! - pushing into a full buffer evicts exactly the oldest element;
//! - each pushed datagram ends up in at most one drain snapshot.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::socket::Datagram;

/// Counters kept alongside the buffer contents.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    pub pushed: u64,
    pub evicted: u64,
    pub drained: u64,
}

struct Inner {
    items: VecDeque<Datagram>,
    stats: BufferStats,
}

/// Mutex-guarded FIFO that drops its oldest entry instead of growing.
pub struct BoundedBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl BoundedBuffer {
    /// Create an empty buffer.
    ///
    /// Panics if `capacity` is 0; [`crate::config::ConnectionConfig::validate`]
    /// rejects that before a buffer is ever built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "buffer capacity must be at least 1");
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                stats: BufferStats::default(),
            }),
            capacity,
        }
    }

    // A panic while holding the lock cannot leave `Inner` half-mutated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `datagram`, evicting and returning the oldest entry if full.
    pub fn push(&self, datagram: Datagram) -> Option<Datagram> {
        let mut inner = self.lock();
        let evicted = if inner.items.len() >= self.capacity {
            inner.stats.evicted += 1;
            inner.items.pop_front()
        } else {
            None
        };
        inner.items.push_back(datagram);
        inner.stats.pushed += 1;
        evicted
    }

    /// Take everything currently buffered, oldest first, leaving it empty.
    pub fn drain_all(&self) -> Vec<Datagram> {
        let mut inner = self.lock();
        let drained: Vec<Datagram> = inner.items.drain(..).collect();
        inner.stats.drained += drained.len() as u64;
        drained
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BufferStats {
        self.lock().stats
    }
}

impl std::fmt::Debug for BoundedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn dg(seq: u64) -> Datagram {
        Datagram {
            payload: vec![seq as u8],
            sender: SocketAddr::from(([127, 0, 0, 1], 4000)),
            seq,
        }
    }

    fn seqs(items: &[Datagram]) -> Vec<u64> {
        items.iter().map(|d| d.seq).collect()
    }

    #[test]
    fn overwrite_keeps_newest_in_order() {
        let buf = BoundedBuffer::new(2);
        assert!(buf.push(dg(1)).is_none());
        assert!(buf.push(dg(2)).is_none());
        let evicted = buf.push(dg(3)).expect("full buffer evicts");
        assert_eq!(evicted.seq, 1);

        assert_eq!(seqs(&buf.drain_all()), vec![2, 3]);
    }

    #[test]
    fn drain_clears() {
        let buf = BoundedBuffer::new(4);
        buf.push(dg(1));
        buf.push(dg(2));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.drain_all().len(), 2);
        assert!(buf.is_empty());
        assert!(buf.drain_all().is_empty());
    }

    #[test]
    fn capacity_one_holds_latest() {
        let buf = BoundedBuffer::new(1);
        for i in 0..10 {
            buf.push(dg(i));
            assert_eq!(buf.len(), 1);
        }
        assert_eq!(seqs(&buf.drain_all()), vec![9]);
    }

    #[test]
    fn stats_track_pushes_evictions_and_drains() {
        let buf = BoundedBuffer::new(2);
        for i in 0..5 {
            buf.push(dg(i));
        }
        buf.drain_all();
        assert_eq!(
            buf.stats(),
            BufferStats {
                pushed: 5,
                evicted: 3,
                drained: 2
            }
        );
    }

    #[test]
    #[should_panic(expected = "buffer capacity must be at least 1")]
    fn zero_capacity_panics() {
        let _ = BoundedBuffer::new(0);
    }
}
