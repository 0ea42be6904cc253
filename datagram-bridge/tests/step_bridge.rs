//! Integration tests for the control-loop bridge.
//!
//! Each test runs a stand-in peer on its own thread: a bound `Transport`
//! that records every state frame it receives and answers the first
//! `replies` of them with a 12-float observation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use datagram_bridge::frame::{decode_f32s, decode_state, encode_f32s, encode_state, OBSERVATION_DIM};
use datagram_bridge::socket::Transport;
use datagram_bridge::{
    BridgeConfig, BridgeError, ConnectionConfig, EmptyObservationPolicy, StepBridge,
};

// ---------------------------------------------------------------------------
// Stand-in peer
// ---------------------------------------------------------------------------

struct Peer {
    port: u16,
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Peer {
    fn spawn(replies: usize) -> Self {
        let mut transport = Transport::default();
        let port = transport.bind("127.0.0.1", 0).expect("bind peer").port();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let frames = Arc::clone(&frames);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut answered = 0;
                while !stop.load(Ordering::Acquire) {
                    let Ok(Some(dg)) = transport.receive_one(Duration::from_millis(20)) else {
                        continue;
                    };
                    frames.lock().unwrap().push(dg.payload.clone());
                    if answered < replies {
                        let state = decode_state(&dg.payload).expect("state frame");
                        let mut obs = state.to_vec();
                        obs.resize(OBSERVATION_DIM, 0.5);
                        transport
                            .send(&encode_f32s(&obs), Some(dg.sender))
                            .expect("reply");
                        answered += 1;
                    }
                }
            })
        };

        Self {
            port,
            frames,
            stop,
            handle: Some(handle),
        }
    }

    fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn bridge_config(port: u16, scale_factor: f32, policy: EmptyObservationPolicy) -> BridgeConfig {
    BridgeConfig {
        settle_interval: Duration::from_millis(100),
        scale_factor,
        empty_policy: policy,
        connection: ConnectionConfig {
            socket_timeout: Duration::from_millis(50),
            ..Default::default()
        },
        ..BridgeConfig::new("127.0.0.1", port)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// A saturating action clamps the state to +1 and the frame on the wire
/// carries exactly that vector.
#[test]
fn step_clamps_state_and_sends_it() {
    let peer = Peer::spawn(usize::MAX);
    let mut bridge =
        StepBridge::open(bridge_config(peer.port, 1.0, EmptyObservationPolicy::Propagate)).unwrap();

    bridge.step(&[10.0; 6]).unwrap();
    assert_eq!(bridge.state(), &[1.0f32; 6]);

    let frames = peer.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0], encode_state(&[1.0; 6]).to_vec());
    assert_eq!(decode_state(&frames[0]).unwrap(), [1.0; 6]);
}

/// The peer's reply becomes the tick's observation; the bridge never ends
/// the episode on its own.
#[test]
fn step_returns_fresh_reply() {
    let peer = Peer::spawn(usize::MAX);
    let mut bridge =
        StepBridge::open(bridge_config(peer.port, 0.5, EmptyObservationPolicy::Propagate)).unwrap();

    let outcome = bridge.step(&[1.0, -1.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
    assert!(!outcome.terminated);
    assert!(!outcome.truncated);
    assert_eq!(outcome.reward, 0.0);
    assert_eq!(outcome.info.datagrams, 1);
    assert!(outcome.info.fresh);

    let obs = outcome.observation.expect("peer replied within the settle interval");
    assert!(obs.fresh);
    let values = decode_f32s(obs.payload()).unwrap();
    assert_eq!(values.len(), OBSERVATION_DIM);
    assert_eq!(&values[..6], &[0.5f32, -0.5, 0.0, 0.0, 0.0, 0.0]);
    assert!(bridge.healthy());
}

/// A silent peer yields no observation under the default policy.
#[test]
fn silent_peer_propagates_emptiness() {
    let peer = Peer::spawn(0);
    let mut bridge =
        StepBridge::open(bridge_config(peer.port, 0.1, EmptyObservationPolicy::Propagate)).unwrap();

    let outcome = bridge.step(&[1.0; 6]).unwrap();
    assert!(outcome.observation.is_none());
    assert_eq!(outcome.info.datagrams, 0);
    assert!(!outcome.info.fresh);
    assert_eq!(peer.frames().len(), 1, "the frame was still sent");
}

/// Under `HoldLast` a quiet tick re-yields the previous datagram, marked
/// stale.
#[test]
fn hold_last_reuses_previous_observation() {
    let peer = Peer::spawn(1);
    let mut bridge =
        StepBridge::open(bridge_config(peer.port, 0.1, EmptyObservationPolicy::HoldLast)).unwrap();

    let first = bridge.step(&[1.0; 6]).unwrap().observation.expect("first reply");
    assert!(first.fresh);

    let held = bridge.step(&[1.0; 6]).unwrap();
    assert_eq!(held.info.datagrams, 0);
    assert!(!held.info.fresh);
    let second = held.observation.expect("held observation");
    assert!(!second.fresh);
    assert_eq!(second.datagram, first.datagram);
}

/// `reset` zeroes the accumulated state and sends the zero frame.
#[test]
fn reset_zeroes_state() {
    let peer = Peer::spawn(usize::MAX);
    let mut bridge =
        StepBridge::open(bridge_config(peer.port, 1.0, EmptyObservationPolicy::Propagate)).unwrap();

    bridge.step(&[0.3; 6]).unwrap();
    let obs = bridge.reset().unwrap().expect("reply to reset frame");
    assert_eq!(bridge.state(), &[0.0f32; 6]);
    assert_eq!(&decode_f32s(obs.payload()).unwrap()[..6], &[0.0f32; 6]);
    assert_eq!(peer.frames().last().unwrap(), &encode_state(&[0.0; 6]).to_vec());
}

/// After `close` every further step is rejected instead of silently
/// talking to a released socket.
#[test]
fn step_after_close_fails() {
    let peer = Peer::spawn(usize::MAX);
    let mut bridge =
        StepBridge::open(bridge_config(peer.port, 1.0, EmptyObservationPolicy::Propagate)).unwrap();

    bridge.close().unwrap();
    bridge.close().unwrap();
    assert!(!bridge.healthy());
    assert!(matches!(bridge.step(&[0.0; 6]), Err(BridgeError::Closed)));
}
