//! Wire-level contract shared with the transcription server.
//!
//! The control-message names are part of the external protocol and must
//! match the server byte-for-byte. Transport framing and the audio codec
//! live in the transport implementation, not here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control message telling the server to start buffering audio.
pub const START_RECORDING: &str = "start-recording";

/// Control message telling the server to stop buffering and transcribe.
pub const STOP_RECORDING: &str = "stop-recording";

/// Out-of-band instruction sent to the server over the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Protocol message name (e.g. `start-recording`).
    pub name: String,
    /// Message payload. Both recording control messages carry none.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl ControlMessage {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// The `start-recording` control message (empty payload).
    pub fn start_recording() -> Self {
        Self::new(START_RECORDING, Value::Null)
    }

    /// The `stop-recording` control message (empty payload).
    pub fn stop_recording() -> Self {
        Self::new(STOP_RECORDING, Value::Null)
    }
}

/// Inbound server payload.
///
/// A `{"type": "transcript", "text": ...}` message is treated identically
/// to the transport's native transcript event. Anything else is tolerated
/// and ignored by the session layer.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Transcript { text: String },
    #[serde(other)]
    Other,
}

impl ServerMessage {
    /// Parse a raw server payload, returning `None` for malformed JSON
    /// shapes (non-objects, missing `type`).
    pub fn parse(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
