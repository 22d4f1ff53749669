//! Transport client boundary.
//!
//! The actual wire transport (socket, codec, audio framing) lives outside
//! this crate. The session layer consumes it through [`TransportClient`]
//! and reacts to its [`TransportEvent`] stream.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use murmur_core::error::{MurmurError, Result};
use murmur_core::protocol::{ControlMessage, STOP_RECORDING};
use murmur_core::types::ServerUrl;

/// Asynchronous connect/disconnect/message channel to the remote server.
///
/// Implementations emit [`TransportEvent`]s on the channel supplied at
/// construction. `connect` resolving means the connect call succeeded;
/// full readiness is signalled separately via `TransportEvent::Connected`.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Open a logical connection to the server.
    async fn connect(&self, url: &ServerUrl) -> Result<()>;

    /// Close the connection. Returns [`MurmurError::NotConnected`] when
    /// there is nothing to close.
    async fn disconnect(&self) -> Result<()>;

    /// Send an out-of-band control message to the server.
    async fn send_control(&self, message: ControlMessage) -> Result<()>;

    /// Enable or disable microphone capture on the transport.
    async fn set_microphone(&self, enabled: bool) -> Result<()>;
}

/// Lifecycle and server events emitted by a transport client.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// The transport is fully ready for control messages and audio.
    Connected,
    /// The connection dropped (remote close, network error, or forced).
    Disconnected,
    /// An arbitrary server payload; `{"type": "transcript", ...}` shapes
    /// are treated as transcripts by the session layer.
    ServerMessage(Value),
    /// The final transcript for the last recording round-trip.
    Transcript(String),
}

/// In-process transport used by tests and as the app's stand-in while no
/// real server transport is wired in.
///
/// Connect attempts can be scripted to fail a fixed number of times, and
/// every control message is recorded. After a `stop-recording` message it
/// echoes a canned transcript, which makes the full recording round-trip
/// exercisable without a server.
pub struct LoopbackTransport {
    events: UnboundedSender<TransportEvent>,
    connected: AtomicBool,
    failures_remaining: AtomicU32,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    mic_enabled: AtomicBool,
    sent: Mutex<Vec<ControlMessage>>,
    transcript: Mutex<String>,
}

impl LoopbackTransport {
    pub fn new(events: UnboundedSender<TransportEvent>) -> Self {
        Self {
            events,
            connected: AtomicBool::new(false),
            failures_remaining: AtomicU32::new(0),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            mic_enabled: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            transcript: Mutex::new("loopback transcript".to_string()),
        }
    }

    /// Script the next `count` connect attempts to fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Set the transcript echoed after a `stop-recording` message.
    pub fn set_transcript(&self, text: impl Into<String>) {
        *self.transcript.lock().expect("transcript mutex poisoned") = text.into();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn mic_enabled(&self) -> bool {
        self.mic_enabled.load(Ordering::SeqCst)
    }

    /// Control messages sent so far, in order.
    pub fn sent_messages(&self) -> Vec<ControlMessage> {
        self.sent.lock().expect("sent mutex poisoned").clone()
    }

    fn emit(&self, event: TransportEvent) {
        // Receiver may be gone during shutdown; nothing to do about it.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl TransportClient for LoopbackTransport {
    async fn connect(&self, url: &ServerUrl) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if url.is_empty() {
            return Err(MurmurError::Transport("empty server url".to_string()));
        }

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(MurmurError::Transport(format!(
                "connection refused: {}",
                url
            )));
        }

        self.connected.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Err(MurmurError::NotConnected);
        }
        self.mic_enabled.store(false, Ordering::SeqCst);
        self.emit(TransportEvent::Disconnected);
        Ok(())
    }

    async fn send_control(&self, message: ControlMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(MurmurError::NotConnected);
        }
        let is_stop = message.name == STOP_RECORDING;
        self.sent
            .lock()
            .expect("sent mutex poisoned")
            .push(message);

        if is_stop {
            let text = self
                .transcript
                .lock()
                .expect("transcript mutex poisoned")
                .clone();
            self.emit(TransportEvent::Transcript(text));
        }
        Ok(())
    }

    async fn set_microphone(&self, enabled: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(MurmurError::NotConnected);
        }
        self.mic_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_loopback_connect_emits_connected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = LoopbackTransport::new(tx);

        transport
            .connect(&ServerUrl::new("ws://localhost:7860"))
            .await
            .unwrap();
        assert!(transport.is_connected());
        assert!(matches!(rx.recv().await, Some(TransportEvent::Connected)));
    }

    #[tokio::test]
    async fn test_loopback_scripted_failures() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = LoopbackTransport::new(tx);
        transport.fail_next_connects(2);

        let url = ServerUrl::new("ws://localhost:7860");
        assert!(transport.connect(&url).await.is_err());
        assert!(transport.connect(&url).await.is_err());
        assert!(transport.connect(&url).await.is_ok());
        assert_eq!(transport.connect_calls(), 3);
    }

    #[tokio::test]
    async fn test_loopback_rejects_empty_url() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = LoopbackTransport::new(tx);
        assert!(transport.connect(&ServerUrl::new("")).await.is_err());
    }

    #[tokio::test]
    async fn test_loopback_disconnect_when_never_opened() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = LoopbackTransport::new(tx);
        let err = transport.disconnect().await.unwrap_err();
        assert!(matches!(err, MurmurError::NotConnected));
    }

    #[tokio::test]
    async fn test_loopback_stop_recording_echoes_transcript() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = LoopbackTransport::new(tx);
        transport.set_transcript("hello overlay");
        transport
            .connect(&ServerUrl::new("ws://localhost:7860"))
            .await
            .unwrap();
        let _ = rx.recv().await; // Connected

        transport
            .send_control(ControlMessage::start_recording())
            .await
            .unwrap();
        transport
            .send_control(ControlMessage::stop_recording())
            .await
            .unwrap();

        match rx.recv().await {
            Some(TransportEvent::Transcript(text)) => assert_eq!(text, "hello overlay"),
            other => panic!("Expected transcript event, got {:?}", other),
        }
        assert_eq!(transport.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_loopback_control_requires_connection() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = LoopbackTransport::new(tx);
        let err = transport
            .send_control(ControlMessage::start_recording())
            .await
            .unwrap_err();
        assert!(matches!(err, MurmurError::NotConnected));
    }

    #[tokio::test]
    async fn test_loopback_microphone_toggle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = LoopbackTransport::new(tx);
        transport
            .connect(&ServerUrl::new("ws://localhost:7860"))
            .await
            .unwrap();

        transport.set_microphone(true).await.unwrap();
        assert!(transport.mic_enabled());
        transport.set_microphone(false).await.unwrap();
        assert!(!transport.mic_enabled());
    }
}
