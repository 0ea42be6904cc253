//! Property and concurrency tests for the bounded overwrite buffer.
//!
//! No network: datagrams are built in-process and pushed directly, from one
//! or more threads, while another thread drains.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use datagram_bridge::buffer::BoundedBuffer;
use datagram_bridge::Datagram;
use proptest::prelude::*;
use rand::Rng;

fn dg(seq: u64) -> Datagram {
    Datagram {
        payload: seq.to_le_bytes().to_vec(),
        sender: SocketAddr::from(([127, 0, 0, 1], 9000)),
        seq,
    }
}

// ---------------------------------------------------------------------------
// Capacity invariant
// ---------------------------------------------------------------------------

proptest! {
    /// After N pushes into capacity C the buffer holds exactly the last
    /// min(N, C) datagrams, in push order.
    #[test]
    fn holds_the_most_recent_min_n_c(capacity in 1usize..16, n in 0u64..64) {
        let buf = BoundedBuffer::new(capacity);
        for i in 0..n {
            buf.push(dg(i));
            prop_assert!(buf.len() <= capacity);
        }

        let kept = n.min(capacity as u64);
        let got: Vec<u64> = buf.drain_all().iter().map(|d| d.seq).collect();
        let want: Vec<u64> = (n - kept..n).collect();
        prop_assert_eq!(got, want);
        prop_assert_eq!(buf.stats().evicted, n - kept);
    }

    /// Interleaving drains with pushes never loses or repeats a datagram
    /// that was not evicted.
    #[test]
    fn interleaved_drains_partition_the_pushes(
        capacity in 1usize..8,
        ops in proptest::collection::vec(any::<bool>(), 0..128),
    ) {
        let buf = BoundedBuffer::new(capacity);
        let mut next = 0u64;
        let mut seen = Vec::new();
        for push in ops {
            if push {
                buf.push(dg(next));
                next += 1;
            } else {
                seen.extend(buf.drain_all().into_iter().map(|d| d.seq));
            }
        }
        seen.extend(buf.drain_all().into_iter().map(|d| d.seq));

        prop_assert!(seen.windows(2).all(|w| w[0] < w[1]), "order violated: {:?}", seen);
        prop_assert_eq!(seen.len() as u64 + buf.stats().evicted, next);
    }
}

#[test]
fn overwrite_scenario_d1_d2_d3() {
    let buf = BoundedBuffer::new(2);
    buf.push(dg(1));
    buf.push(dg(2));
    buf.push(dg(3));
    assert_eq!(buf.drain_all(), vec![dg(2), dg(3)]);
}

// ---------------------------------------------------------------------------
// Drain atomicity under contention
// ---------------------------------------------------------------------------

/// One pusher, one drainer running concurrently: every drained datagram is
/// unique, drained datagrams plus evictions account for every push, and
/// each snapshot is in push order.
#[test]
fn concurrent_push_and_drain_never_duplicates_or_loses() {
    let mut rng = rand::rng();
    let capacity = rng.random_range(1..=8);
    let total: u64 = rng.random_range(2_000..=10_000);

    let buf = Arc::new(BoundedBuffer::new(capacity));
    let done = Arc::new(AtomicBool::new(false));

    let pusher = {
        let buf = Arc::clone(&buf);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..total {
                buf.push(dg(i));
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut seen = HashSet::new();
    let mut last_seq: Option<u64> = None;
    loop {
        let finished = done.load(Ordering::Acquire);
        for d in buf.drain_all() {
            assert!(seen.insert(d.seq), "datagram {} drained twice", d.seq);
            if let Some(prev) = last_seq {
                assert!(d.seq > prev, "{} after {}", d.seq, prev);
            }
            last_seq = Some(d.seq);
        }
        if finished {
            break;
        }
        thread::yield_now();
    }
    pusher.join().unwrap();
    seen.extend(buf.drain_all().into_iter().map(|d| d.seq));

    let stats = buf.stats();
    assert_eq!(stats.pushed, total);
    assert_eq!(seen.len() as u64 + stats.evicted, total);
    assert_eq!(stats.drained, seen.len() as u64);
    // The newest datagram can never have been evicted.
    assert!(seen.contains(&(total - 1)));
}
