//! Background receiver worker.
//!
//! One OS thread per open connection loops on
//! [`DatagramSource::receive_one`] with a fixed timeout and pushes every
//! datagram into the shared [`BoundedBuffer`]:
//!
//! - datagram → push (an eviction is reported, never blocks);
//! - timeout → loop again immediately;
//! - peer unreachable (ICMP on a connected socket) → report, loop again;
//! - any other error → report, leave the loop, state becomes `Stopped`.
//!
//! Stopping is cooperative.  [`StopHandle::stop`] only raises a flag, so a
//! pending receive is never interrupted and the worst-case stop latency is
//! one receive timeout.  [`BackgroundReceiver::join`] waits for the worker
//! with a bound and reports a leak instead of hanging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::buffer::BoundedBuffer;
use crate::diagnostics::{Diagnostics, Event};
use crate::error::BridgeError;
use crate::socket::{is_peer_unreachable, DatagramSource};
use crate::state::{ReceiverState, SharedState};

/// Cloneable, thread-safe handle that asks the worker to stop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Idempotent.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Marks the receiver `Stopped` however the worker exits, panics included.
/// Dropping it also drops `_done`, which wakes a pending `join`.
struct ExitGuard {
    state: Arc<SharedState>,
    _done: mpsc::SyncSender<()>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.state.stop();
    }
}

/// The single receiver worker of a connection.
#[derive(Debug)]
pub struct BackgroundReceiver {
    state: Arc<SharedState>,
    stop: StopHandle,
    timeout: Duration,
    handle: Option<JoinHandle<()>>,
    done: Option<mpsc::Receiver<()>>,
}

impl BackgroundReceiver {
    /// An idle receiver whose worker will use `timeout` per receive.
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Arc::new(SharedState::new()),
            stop: StopHandle::default(),
            timeout,
            handle: None,
            done: None,
        }
    }

    /// Spawn the worker (`Idle → Running`).
    pub fn start<S>(
        &mut self,
        source: S,
        buffer: Arc<BoundedBuffer>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<(), BridgeError>
    where
        S: DatagramSource + 'static,
    {
        if !self.state.start() {
            return Err(BridgeError::AlreadyListening);
        }

        let (done_tx, done_rx) = mpsc::sync_channel(1);
        let guard = ExitGuard {
            state: Arc::clone(&self.state),
            _done: done_tx,
        };
        let stop = self.stop.clone();
        let timeout = self.timeout;

        let spawned = std::thread::Builder::new()
            .name("datagram-rx".into())
            .spawn(move || {
                let _guard = guard;
                run(source, &buffer, &stop, diagnostics.as_ref(), timeout);
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.done = Some(done_rx);
                Ok(())
            }
            Err(e) => {
                // The closure (and its guard) was dropped, so the state is
                // already `Stopped`.
                Err(BridgeError::Transport(e))
            }
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Signal the worker to stop.  Safe from any thread; idempotent.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait up to `within` for the worker to exit.
    ///
    /// Returns `Ok` immediately if no worker was ever started or it was
    /// already joined.  On timeout the thread is detached and
    /// [`BridgeError::ShutdownTimeout`] is returned.
    pub fn join(&mut self, within: Duration) -> Result<(), BridgeError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let done = self.done.take();

        let finished = match done {
            Some(done) => !matches!(done.recv_timeout(within), Err(RecvTimeoutError::Timeout)),
            None => true,
        };

        if !finished {
            drop(handle);
            return Err(BridgeError::ShutdownTimeout(within));
        }

        if handle.join().is_err() {
            log::error!("receiver thread panicked");
        }
        Ok(())
    }

    pub fn state(&self) -> ReceiverState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state.get() == ReceiverState::Running
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Worker loop body.  Returns when stopped or on a fatal error.
fn run<S: DatagramSource>(
    mut source: S,
    buffer: &BoundedBuffer,
    stop: &StopHandle,
    diagnostics: &dyn Diagnostics,
    timeout: Duration,
) {
    diagnostics.record(Event::ReceiverStarted);

    while !stop.is_stopped() {
        match source.receive_one(timeout) {
            Ok(Some(datagram)) => {
                if let Some(old) = buffer.push(datagram) {
                    diagnostics.record(Event::Evicted { seq: old.seq });
                }
            }
            Ok(None) => continue,
            // Unlike a blanket stop-on-any-error, ICMP refusals only mean the
            // connected peer is not up yet.
            Err(BridgeError::Transport(e)) if is_peer_unreachable(&e) => {
                diagnostics.record(Event::PeerUnreachable { kind: e.kind() });
            }
            Err(e) => {
                let kind = match &e {
                    BridgeError::Transport(io) => io.kind(),
                    _ => std::io::ErrorKind::Other,
                };
                diagnostics.record(Event::ReceiverFailed {
                    kind,
                    message: e.to_string(),
                });
                return;
            }
        }
    }

    diagnostics.record(Event::ReceiverStopped);
}
