//! Receiver finite-state machine.
//!
//! ```text
//!  IDLE ──start()──▶ RUNNING ──stop() / fatal recv error──▶ STOPPED
//! ```
//!
//! `Stopped` is terminal: a stopped receiver is never restarted.  The state
//! is read from the caller's thread (liveness queries) while the worker
//! writes it, so it lives in a [`SharedState`] atomic rather than behind the
//! buffer mutex.

use std::sync::atomic::{AtomicU8, Ordering};

/// All states a [`crate::receiver::BackgroundReceiver`] can occupy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ReceiverState {
    /// No worker has been spawned.
    #[default]
    Idle = 0,
    /// Worker is looping on the socket.
    Running = 1,
    /// Worker has exited, either on request or after a fatal error.
    Stopped = 2,
}

impl ReceiverState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Atomic cell holding a [`ReceiverState`].
#[derive(Debug, Default)]
pub struct SharedState(AtomicU8);

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ReceiverState {
        ReceiverState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// `Idle → Running`.  Returns `false` from any other state.
    pub fn start(&self) -> bool {
        self.0
            .compare_exchange(
                ReceiverState::Idle as u8,
                ReceiverState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to the terminal state.  Returns the previous state.
    pub fn stop(&self) -> ReceiverState {
        ReceiverState::from_u8(self.0.swap(ReceiverState::Stopped as u8, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        let s = SharedState::new();
        assert_eq!(s.get(), ReceiverState::Idle);
        assert!(s.start());
        assert_eq!(s.get(), ReceiverState::Running);
        assert!(!s.start(), "already running");
        assert_eq!(s.stop(), ReceiverState::Running);
        assert_eq!(s.get(), ReceiverState::Stopped);
    }

    #[test]
    fn stopped_is_terminal() {
        let s = SharedState::new();
        s.stop();
        assert!(!s.start());
        assert_eq!(s.stop(), ReceiverState::Stopped);
        assert_eq!(s.get(), ReceiverState::Stopped);
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(ReceiverState::Running.to_string(), "running");
    }
}
