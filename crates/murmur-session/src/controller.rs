//! Session controller binding the connection manager, the transport client,
//! and the state machine together.
//!
//! All session mutation goes through the state machine; the controller
//! requests transitions in response to user gestures and transport events,
//! and performs the side effects (control messages, microphone toggles,
//! watchdog arming) only when a transition is granted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use murmur_core::config::MurmurConfig;
use murmur_core::events::SessionEvent;
use murmur_core::protocol::{ControlMessage, ServerMessage};
use murmur_core::types::{ServerUrl, Timestamp};

use crate::backoff::BackoffPolicy;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::state::{SessionState, StateMachine};
use crate::transport::{TransportClient, TransportEvent};
use crate::watchdog::ResponseWatchdog;

/// Retry progress surfaced to the UI while the manager is backing off.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryStatus {
    pub attempt: u32,
    pub next_delay: Duration,
}

/// Tracks one recording round-trip, from microphone-on to transcript.
#[derive(Debug, Clone)]
struct RecordingSession {
    id: Uuid,
    started_at: Timestamp,
}

impl RecordingSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Timestamp::now(),
        }
    }

    fn elapsed_secs(&self) -> i64 {
        Timestamp::now().0 - self.started_at.0
    }
}

/// Coordinates the dictation session.
///
/// Owns the state machine, the response watchdog, and (while connecting)
/// a connection manager. Observers receive [`SessionEvent`]s on the channel
/// supplied at construction; the UI layer renders them, this core never
/// surfaces raw errors to the user.
pub struct SessionController {
    state: StateMachine,
    transport: Arc<dyn TransportClient>,
    server_url: ServerUrl,
    policy: BackoffPolicy,
    response_timeout: Duration,
    manager: Mutex<Option<ConnectionManager>>,
    connection_events: UnboundedSender<ConnectionEvent>,
    watchdog: ResponseWatchdog,
    observers: UnboundedSender<SessionEvent>,
    retry_status: Mutex<Option<RetryStatus>>,
    recording: Arc<Mutex<Option<RecordingSession>>>,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn TransportClient>,
        server_url: ServerUrl,
        policy: BackoffPolicy,
        response_timeout: Duration,
        observers: UnboundedSender<SessionEvent>,
        connection_events: UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            state: StateMachine::new(),
            transport,
            server_url,
            policy,
            response_timeout,
            manager: Mutex::new(None),
            connection_events,
            watchdog: ResponseWatchdog::new(),
            observers,
            retry_status: Mutex::new(None),
            recording: Arc::new(Mutex::new(None)),
        }
    }

    /// Build a controller from the loaded configuration.
    pub fn from_config(
        config: &MurmurConfig,
        transport: Arc<dyn TransportClient>,
        observers: UnboundedSender<SessionEvent>,
        connection_events: UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self::new(
            transport,
            ServerUrl::new(config.connection.server_url.clone()),
            BackoffPolicy::from_config(&config.connection),
            Duration::from_secs(config.session.response_timeout_secs),
            observers,
            connection_events,
        )
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    /// Retry progress, present only while the manager is backing off.
    pub fn retry_status(&self) -> Option<RetryStatus> {
        self.retry_status
            .lock()
            .expect("retry status mutex poisoned")
            .clone()
    }

    /// Begin connecting to the server.
    ///
    /// Returns `false` when no server address is configured or the session
    /// is not in a state that allows connecting.
    pub fn start_connecting(&self) -> bool {
        if self.server_url.is_empty() {
            tracing::warn!("Cannot connect: no server URL configured");
            return false;
        }
        if !self
            .state
            .transition_from(SessionState::Disconnected, SessionState::Connecting)
        {
            return false;
        }

        let manager = ConnectionManager::new(
            Arc::clone(&self.transport),
            self.server_url.clone(),
            self.policy.clone(),
            self.connection_events.clone(),
        );
        manager.start();

        let mut slot = self.manager.lock().expect("manager mutex poisoned");
        if let Some(previous) = slot.replace(manager) {
            previous.stop();
        }
        true
    }

    /// Cancel the connect loop and the response watchdog.
    ///
    /// Pure cleanup: idempotent, no observable effect when nothing is
    /// pending, and never closes an open connection itself. A connect still
    /// in flight is abandoned and the session returns to `Disconnected`.
    /// Called on teardown before the transport reference is released.
    pub fn stop(&self) {
        if let Some(manager) = self
            .manager
            .lock()
            .expect("manager mutex poisoned")
            .take()
        {
            manager.stop();
        }
        self.watchdog.cancel();
        self.clear_retry_status();

        // With the manager gone no connected signal will ever resolve a
        // pending connect; release the state so a later start_connecting()
        // is possible.
        if self
            .state
            .transition_from(SessionState::Connecting, SessionState::Disconnected)
        {
            self.emit(SessionEvent::Disconnected {
                timestamp: Timestamp::now(),
            });
        }
    }

    /// Start a recording round-trip.
    ///
    /// Succeeds only from `Idle`. On success the server is told to buffer
    /// and the microphone is enabled; transport failures on either call are
    /// logged and never propagated to the caller.
    pub async fn start_recording(&self) -> bool {
        if !self
            .state
            .transition_from(SessionState::Idle, SessionState::Recording)
        {
            tracing::debug!(state = %self.state.current(), "Recording request ignored");
            return false;
        }

        let session = RecordingSession::new();
        tracing::info!(session_id = %session.id, "Recording started");
        *self.recording.lock().expect("recording mutex poisoned") = Some(session);

        if let Err(e) = self
            .transport
            .send_control(ControlMessage::start_recording())
            .await
        {
            tracing::warn!(error = %e, "Failed to send start-recording");
        }
        if let Err(e) = self.transport.set_microphone(true).await {
            tracing::warn!(error = %e, "Failed to enable microphone");
        }

        self.emit(SessionEvent::RecordingStarted {
            timestamp: Timestamp::now(),
        });
        true
    }

    /// Stop capturing and wait for the server's transcript.
    ///
    /// Succeeds only from `Recording`. Arms the response watchdog: if no
    /// transcript arrives within the configured window, the session forces
    /// a disconnect instead of hanging in `Processing` forever.
    pub async fn stop_recording(&self) -> bool {
        if !self
            .state
            .transition_from(SessionState::Recording, SessionState::Processing)
        {
            tracing::debug!(state = %self.state.current(), "Stop request ignored");
            return false;
        }

        if let Err(e) = self.transport.set_microphone(false).await {
            tracing::warn!(error = %e, "Failed to disable microphone");
        }
        if let Err(e) = self
            .transport
            .send_control(ControlMessage::stop_recording())
            .await
        {
            tracing::warn!(error = %e, "Failed to send stop-recording");
        }

        self.watchdog.arm(
            self.response_timeout,
            Self::response_timeout_task(
                self.state.clone(),
                Arc::clone(&self.transport),
                Arc::clone(&self.recording),
                self.observers.clone(),
            ),
        );

        self.emit(SessionEvent::RecordingStopped {
            timestamp: Timestamp::now(),
        });
        true
    }

    /// Handle the server's response for the current round-trip.
    ///
    /// No-op unless the session is in `Processing`.
    pub fn handle_response(&self) {
        self.complete_processing();
    }

    /// Transport-confirmed readiness: the manager's job is done.
    ///
    /// Stops the retry loop, clears any surfaced retry status, and moves
    /// the session to `Idle`. A duplicate connected signal while already
    /// idle, or while a round-trip is in flight, is a harmless no-op.
    pub fn handle_connected(&self) {
        if let Some(manager) = self
            .manager
            .lock()
            .expect("manager mutex poisoned")
            .take()
        {
            manager.stop();
        }
        self.clear_retry_status();

        // Only the connecting/disconnected edges accept a connected signal.
        // A transport re-emitting readiness mid-round-trip must not yank a
        // Recording or Processing session back to Idle.
        let applied = self
            .state
            .transition_from(SessionState::Connecting, SessionState::Idle)
            || self
                .state
                .transition_from(SessionState::Disconnected, SessionState::Idle);
        if applied {
            self.emit(SessionEvent::Connected {
                timestamp: Timestamp::now(),
            });
        } else {
            tracing::debug!(state = %self.state.current(), "Connected signal ignored");
        }
    }

    /// Transport-reported disconnect.
    ///
    /// If the session was mid-recording or awaiting a transcript, the
    /// mid-session observer is notified before the state is cleared so the
    /// UI can reset its visual state. Safe to call when already
    /// disconnected. Reconnecting is the composition layer's decision.
    pub fn handle_disconnected(&self) {
        let prior = self.state.current();
        if prior == SessionState::Disconnected {
            tracing::debug!("Disconnect signal while already disconnected");
            return;
        }

        if prior.is_mid_session() {
            Self::discard_recording(&self.recording);
            self.emit(SessionEvent::SessionInterrupted {
                timestamp: Timestamp::now(),
            });
        }

        self.state.transition(SessionState::Disconnected);
        self.watchdog.cancel();
        self.emit(SessionEvent::Disconnected {
            timestamp: Timestamp::now(),
        });
    }

    /// Route a connection-manager event.
    pub fn handle_connection_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connecting => {
                self.emit(SessionEvent::Connecting {
                    timestamp: Timestamp::now(),
                });
            }
            ConnectionEvent::Connected => self.handle_connected(),
            ConnectionEvent::RetryFailed { attempt, reason } => {
                self.emit(SessionEvent::RetryFailed {
                    attempt,
                    reason,
                    timestamp: Timestamp::now(),
                });
            }
            ConnectionEvent::RetryScheduled { attempt, delay } => {
                *self
                    .retry_status
                    .lock()
                    .expect("retry status mutex poisoned") = Some(RetryStatus {
                    attempt,
                    next_delay: delay,
                });
                self.emit(SessionEvent::RetryScheduled {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    timestamp: Timestamp::now(),
                });
            }
        }
    }

    /// Route a transport event.
    pub fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.handle_connected(),
            TransportEvent::Disconnected => self.handle_disconnected(),
            TransportEvent::Transcript(text) => self.finish_with_transcript(text),
            TransportEvent::ServerMessage(value) => match ServerMessage::parse(&value) {
                Some(ServerMessage::Transcript { text }) => self.finish_with_transcript(text),
                Some(ServerMessage::Other) | None => {
                    tracing::debug!("Ignoring unrecognized server message");
                }
            },
        }
    }

    fn finish_with_transcript(&self, text: String) {
        if self.complete_processing() {
            self.emit(SessionEvent::TranscriptReceived {
                text,
                timestamp: Timestamp::now(),
            });
        } else {
            tracing::debug!(state = %self.state.current(), "Transcript ignored");
        }
    }

    /// Processing -> Idle, disarming the watchdog. Returns whether the
    /// session was actually awaiting a response.
    fn complete_processing(&self) -> bool {
        if !self
            .state
            .transition_from(SessionState::Processing, SessionState::Idle)
        {
            return false;
        }
        self.watchdog.cancel();
        Self::discard_recording(&self.recording);
        true
    }

    fn clear_retry_status(&self) {
        *self
            .retry_status
            .lock()
            .expect("retry status mutex poisoned") = None;
    }

    fn discard_recording(recording: &Arc<Mutex<Option<RecordingSession>>>) {
        if let Some(session) = recording
            .lock()
            .expect("recording mutex poisoned")
            .take()
        {
            tracing::info!(
                session_id = %session.id,
                elapsed_secs = session.elapsed_secs(),
                "Recording session ended"
            );
        }
    }

    /// Fallback when no server response arrives in time: force a disconnect,
    /// treated identically to a transport-reported one. The compare-and-
    /// transition makes this safe to race against the transcript handler
    /// and the disconnect handler — whichever fires first wins, the others
    /// are no-ops.
    async fn response_timeout_task(
        state: StateMachine,
        transport: Arc<dyn TransportClient>,
        recording: Arc<Mutex<Option<RecordingSession>>>,
        observers: UnboundedSender<SessionEvent>,
    ) {
        if !state.transition_from(SessionState::Processing, SessionState::Disconnected) {
            return;
        }
        tracing::warn!("No server response within timeout, forcing disconnect");

        Self::discard_recording(&recording);
        let _ = observers.send(SessionEvent::ResponseTimedOut {
            timestamp: Timestamp::now(),
        });
        let _ = observers.send(SessionEvent::SessionInterrupted {
            timestamp: Timestamp::now(),
        });
        let _ = observers.send(SessionEvent::Disconnected {
            timestamp: Timestamp::now(),
        });

        // Cleanup must always complete; a failed close never propagates.
        match transport.disconnect().await {
            Ok(()) => {}
            Err(murmur_core::MurmurError::NotConnected) => {
                tracing::debug!("Timeout disconnect: transport was never fully open");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Timeout disconnect failed");
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        tracing::debug!(event = event.event_name(), "Session event");
        // Observer may have gone away during shutdown; not an error.
        let _ = self.observers.send(event);
    }
}
