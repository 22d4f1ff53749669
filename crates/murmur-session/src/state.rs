//! Recording-session state machine.
//!
//! Connectivity is represented entirely by which of the five states the
//! session occupies; there is no separate "connected" flag, so impossible
//! combinations like "recording while disconnected" are unrepresentable.
//!
//! Legal transitions:
//! - Disconnected -> Connecting (connect requested)
//! - Connecting -> Idle, Disconnected -> Idle (transport confirmed ready)
//! - Idle -> Recording (start recording)
//! - Recording -> Processing (stop recording, awaiting transcript)
//! - Processing -> Idle (transcript received)
//! - any non-Disconnected state -> Disconnected (transport dropped)
//!
//! Illegal transitions are silent rejections signalled by a `false` return,
//! never errors: recording controls are advisory gestures from the UI and
//! hotkey layer, not guaranteed commands.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Operational state of the dictation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No connection to the transcription server.
    Disconnected,
    /// A connect attempt is in flight (possibly retrying).
    Connecting,
    /// Connected and ready; not capturing audio.
    Idle,
    /// Microphone is live and audio is streaming to the server.
    Recording,
    /// Capture stopped; waiting for the server's transcript.
    Processing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Recording => write!(f, "Recording"),
            SessionState::Processing => write!(f, "Processing"),
        }
    }
}

impl SessionState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Disconnected, SessionState::Connecting)
                | (SessionState::Connecting, SessionState::Idle)
                | (SessionState::Disconnected, SessionState::Idle)
                | (SessionState::Idle, SessionState::Recording)
                | (SessionState::Recording, SessionState::Processing)
                | (SessionState::Processing, SessionState::Idle)
                // Transport drop, legal from every connected state
                | (SessionState::Connecting, SessionState::Disconnected)
                | (SessionState::Idle, SessionState::Disconnected)
                | (SessionState::Recording, SessionState::Disconnected)
                | (SessionState::Processing, SessionState::Disconnected)
        )
    }

    /// Whether a disconnect in this state interrupts an in-flight recording
    /// round-trip.
    pub fn is_mid_session(&self) -> bool {
        matches!(self, SessionState::Recording | SessionState::Processing)
    }
}

/// Thread-safe state machine for session state transitions.
///
/// Wraps `SessionState` in an `Arc<Mutex<>>` to allow safe concurrent access.
/// All transitions are validated before being applied; this is the sole
/// point of invariant enforcement — no other component sets the state.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: Arc<Mutex<SessionState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine initialized to `Disconnected`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> SessionState {
        *self.state.lock().expect("state mutex poisoned")
    }

    /// Attempt to transition to the target state.
    ///
    /// Returns `true` if the transition was applied. An illegal transition
    /// leaves the state untouched and returns `false`.
    pub fn transition(&self, target: SessionState) -> bool {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if state.can_transition_to(&target) {
            tracing::debug!("Session state: {} -> {}", *state, target);
            *state = target;
            true
        } else {
            tracing::debug!("Session state: {} -> {} rejected", *state, target);
            false
        }
    }

    /// Transition to `target` only if the current state is exactly `from`.
    ///
    /// The check and the write happen under one lock, so racing callers
    /// (transcript handler vs. response watchdog, disconnect handler vs.
    /// watchdog) resolve to exactly one winner; the loser's call is a no-op.
    pub fn transition_from(&self, from: SessionState, target: SessionState) -> bool {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if *state == from && state.can_transition_to(&target) {
            tracing::debug!("Session state: {} -> {}", *state, target);
            *state = target;
            true
        } else {
            tracing::debug!(
                "Session state: {} -> {} rejected (expected {})",
                *state,
                target,
                from
            );
            false
        }
    }
}
