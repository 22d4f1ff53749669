use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Session lifecycle events emitted to observers.
///
/// Events are emitted by the session controller after state changes and
/// consumed by:
/// - The overlay UI layer (status display, retry countdown)
/// - The event log (for debugging)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SessionEvent {
    /// A connection attempt to the transcription server began.
    Connecting { timestamp: Timestamp },

    /// The transport confirmed the connection is ready.
    Connected { timestamp: Timestamp },

    /// The transport reported a disconnect, or one was forced locally.
    Disconnected { timestamp: Timestamp },

    /// Audio capture started and the server was told to buffer.
    RecordingStarted { timestamp: Timestamp },

    /// Audio capture stopped; waiting on the server's transcript.
    RecordingStopped { timestamp: Timestamp },

    /// A final transcript arrived from the server.
    TranscriptReceived { text: String, timestamp: Timestamp },

    /// A failed connect attempt scheduled a retry.
    RetryScheduled {
        attempt: u32,
        delay_ms: u64,
        timestamp: Timestamp,
    },

    /// A connect attempt failed.
    RetryFailed {
        attempt: u32,
        reason: String,
        timestamp: Timestamp,
    },

    /// No server response arrived within the timeout window.
    ResponseTimedOut { timestamp: Timestamp },

    /// The connection dropped while recording or awaiting a transcript.
    /// The UI uses this to reset its visual state.
    SessionInterrupted { timestamp: Timestamp },
}

impl SessionEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            SessionEvent::Connecting { timestamp }
            | SessionEvent::Connected { timestamp }
            | SessionEvent::Disconnected { timestamp }
            | SessionEvent::RecordingStarted { timestamp }
            | SessionEvent::RecordingStopped { timestamp }
            | SessionEvent::TranscriptReceived { timestamp, .. }
            | SessionEvent::RetryScheduled { timestamp, .. }
            | SessionEvent::RetryFailed { timestamp, .. }
            | SessionEvent::ResponseTimedOut { timestamp }
            | SessionEvent::SessionInterrupted { timestamp } => *timestamp,
        }
    }

    /// Returns a human-readable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::Connecting { .. } => "connecting",
            SessionEvent::Connected { .. } => "connected",
            SessionEvent::Disconnected { .. } => "disconnected",
            SessionEvent::RecordingStarted { .. } => "recording_started",
            SessionEvent::RecordingStopped { .. } => "recording_stopped",
            SessionEvent::TranscriptReceived { .. } => "transcript_received",
            SessionEvent::RetryScheduled { .. } => "retry_scheduled",
            SessionEvent::RetryFailed { .. } => "retry_failed",
            SessionEvent::ResponseTimedOut { .. } => "response_timed_out",
            SessionEvent::SessionInterrupted { .. } => "session_interrupted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_timestamp() {
        let ts = Timestamp::now();
        let event = SessionEvent::Connected { timestamp: ts };
        assert_eq!(event.timestamp(), ts);
    }

    #[test]
    fn test_event_name() {
        let event = SessionEvent::RetryScheduled {
            attempt: 3,
            delay_ms: 4000,
            timestamp: Timestamp::now(),
        };
        assert_eq!(event.event_name(), "retry_scheduled");
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let ts = Timestamp::now();
        let events: Vec<SessionEvent> = vec![
            SessionEvent::Connecting { timestamp: ts },
            SessionEvent::Connected { timestamp: ts },
            SessionEvent::Disconnected { timestamp: ts },
            SessionEvent::RecordingStarted { timestamp: ts },
            SessionEvent::RecordingStopped { timestamp: ts },
            SessionEvent::TranscriptReceived {
                text: "hello".to_string(),
                timestamp: ts,
            },
            SessionEvent::RetryScheduled {
                attempt: 1,
                delay_ms: 1000,
                timestamp: ts,
            },
            SessionEvent::RetryFailed {
                attempt: 1,
                reason: "refused".to_string(),
                timestamp: ts,
            },
            SessionEvent::ResponseTimedOut { timestamp: ts },
            SessionEvent::SessionInterrupted { timestamp: ts },
        ];

        for event in &events {
            let json = serde_json::to_string(event).unwrap();
            let rt: SessionEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(event.timestamp(), rt.timestamp());
            assert_eq!(event.event_name(), rt.event_name());
        }
    }

    #[test]
    fn test_transcript_event_preserves_text() {
        let event = SessionEvent::TranscriptReceived {
            text: "dictated text".to_string(),
            timestamp: Timestamp::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let rt: SessionEvent = serde_json::from_str(&json).unwrap();
        if let SessionEvent::TranscriptReceived { text, .. } = rt {
            assert_eq!(text, "dictated text");
        } else {
            panic!("Expected TranscriptReceived variant");
        }
    }
}
