//! Resilient connection manager.
//!
//! Owns the connect/retry loop against the transport client: attempt,
//! back off with jitter, retry, until either the connect call succeeds or
//! `stop()` cancels the loop. The manager does not re-arm itself after a
//! later disconnect; recreating it is the composition layer's decision.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

use murmur_core::types::ServerUrl;

use crate::backoff::BackoffPolicy;
use crate::transport::TransportClient;

/// Lifecycle phases reported by the connection manager.
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    /// A connect attempt is starting.
    Connecting,
    /// The connect call resolved successfully. Full transport readiness is
    /// signalled separately by the transport's own event stream.
    Connected,
    /// A connect attempt failed.
    RetryFailed { attempt: u32, reason: String },
    /// A retry timer was armed after a failed attempt.
    RetryScheduled { attempt: u32, delay: Duration },
}

/// Automatic connect with exponential-backoff retry and clean cancellation.
///
/// `start()` and `stop()` are both idempotent. The cancellation contract:
/// once `stop()` returns, no further connect attempt begins — the stop flag
/// is checked before every attempt and again after every backoff sleep, so
/// a retry timer that was mid-flight cannot connect a stale client.
pub struct ConnectionManager {
    transport: Arc<dyn TransportClient>,
    server_url: ServerUrl,
    policy: BackoffPolicy,
    events: UnboundedSender<ConnectionEvent>,
    shutdown: Mutex<Arc<Notify>>,
    stopped: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn TransportClient>,
        server_url: ServerUrl,
        policy: BackoffPolicy,
        events: UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            transport,
            server_url,
            policy,
            events,
            shutdown: Mutex::new(Arc::new(Notify::new())),
            stopped: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Begin the connect loop. Calling while already running is a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Connection manager already running");
            return;
        }
        self.stopped.store(false, Ordering::SeqCst);

        // Fresh Notify per run: a permit stored by an earlier stop() must
        // not cancel this run's first backoff sleep.
        let shutdown = Arc::new(Notify::new());
        *self.shutdown.lock().expect("shutdown mutex poisoned") = Arc::clone(&shutdown);

        let transport = Arc::clone(&self.transport);
        let server_url = self.server_url.clone();
        let policy = self.policy.clone();
        let events = self.events.clone();
        let stopped = Arc::clone(&self.stopped);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            Self::run(transport, server_url, policy, events, shutdown, stopped).await;
            running.store(false, Ordering::SeqCst);
        });
    }

    async fn run(
        transport: Arc<dyn TransportClient>,
        server_url: ServerUrl,
        policy: BackoffPolicy,
        events: UnboundedSender<ConnectionEvent>,
        shutdown: Arc<Notify>,
        stopped: Arc<AtomicBool>,
    ) {
        let mut attempt: u32 = 0;
        loop {
            if stopped.load(Ordering::SeqCst) {
                return;
            }

            let _ = events.send(ConnectionEvent::Connecting);
            match transport.connect(&server_url).await {
                Ok(()) => {
                    tracing::info!(url = %server_url, "Connected to transcription server");
                    let _ = events.send(ConnectionEvent::Connected);
                    return;
                }
                Err(e) => {
                    // stop() landed during the in-flight attempt: no retry.
                    if stopped.load(Ordering::SeqCst) {
                        return;
                    }
                    attempt += 1;
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Connect failed, retry scheduled"
                    );
                    let _ = events.send(ConnectionEvent::RetryFailed {
                        attempt,
                        reason: e.to_string(),
                    });
                    let _ = events.send(ConnectionEvent::RetryScheduled { attempt, delay });

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.notified() => return,
                    }
                }
            }
        }
    }

    /// Cancel any pending retry and stop scheduling new attempts.
    ///
    /// Does not close an already-open connection; that is the caller's
    /// responsibility. Safe to call repeatedly and from an inactive state.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.shutdown
            .lock()
            .expect("shutdown mutex poisoned")
            .notify_one();
    }

    /// Whether the connect loop is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LoopbackTransport, TransportEvent};
    use tokio::sync::mpsc;

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            jitter: 0.0,
        }
    }

    fn setup(
        failures: u32,
    ) -> (
        Arc<LoopbackTransport>,
        ConnectionManager,
        mpsc::UnboundedReceiver<ConnectionEvent>,
        mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(LoopbackTransport::new(transport_tx));
        transport.fail_next_connects(failures);

        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(
            Arc::clone(&transport) as Arc<dyn TransportClient>,
            ServerUrl::new("ws://localhost:7860"),
            fast_policy(),
            conn_tx,
        );
        (transport, manager, conn_rx, transport_rx)
    }

    #[tokio::test]
    async fn test_connects_first_try() {
        let (transport, manager, mut conn_rx, _t) = setup(0);
        manager.start();

        assert!(matches!(
            conn_rx.recv().await,
            Some(ConnectionEvent::Connecting)
        ));
        assert!(matches!(
            conn_rx.recv().await,
            Some(ConnectionEvent::Connected)
        ));
        assert!(transport.is_connected());
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success_with_increasing_attempts() {
        let (transport, manager, mut conn_rx, _t) = setup(2);
        manager.start();

        let mut attempts = Vec::new();
        let mut delays = Vec::new();
        loop {
            match conn_rx.recv().await.expect("event stream ended early") {
                ConnectionEvent::Connected => break,
                ConnectionEvent::RetryFailed { attempt, .. } => attempts.push(attempt),
                ConnectionEvent::RetryScheduled { delay, .. } => delays.push(delay),
                ConnectionEvent::Connecting => {}
            }
        }

        assert_eq!(attempts, vec![1, 2]);
        // No jitter configured: each delay is >= the previous one.
        assert!(delays.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(transport.connect_calls(), 3);
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_retry() {
        let (transport, manager, mut conn_rx, _t) = setup(u32::MAX);
        manager.start();

        // Wait for the first failure so a retry timer is armed.
        loop {
            if let Some(ConnectionEvent::RetryScheduled { .. }) = conn_rx.recv().await {
                break;
            }
        }
        manager.stop();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let calls_after_stop = transport.connect_calls();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.connect_calls(), calls_after_stop);
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (_transport, manager, mut conn_rx, _t) = setup(u32::MAX);
        manager.start();
        let _ = conn_rx.recv().await;

        manager.stop();
        manager.stop();
        manager.stop();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let (_transport, manager, _conn_rx, _t) = setup(0);
        manager.stop();
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_running() {
        let (transport, manager, mut conn_rx, _t) = setup(0);
        manager.start();
        manager.start();
        manager.start();

        loop {
            if let Some(ConnectionEvent::Connected) = conn_rx.recv().await {
                break;
            }
        }
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_restart_after_stop_survives_first_backoff() {
        let (transport, manager, mut conn_rx, _t) = setup(1);
        // A stop with no retry sleep pending stores a notify permit; it
        // must not cancel the next run's first backoff sleep.
        manager.stop();
        manager.start();

        loop {
            if let Some(ConnectionEvent::Connected) = conn_rx.recv().await {
                break;
            }
        }
        assert!(transport.is_connected());
        assert_eq!(transport.connect_calls(), 2);
    }

    #[tokio::test]
    async fn test_loop_ends_after_success() {
        let (_transport, manager, mut conn_rx, _t) = setup(0);
        manager.start();

        loop {
            if let Some(ConnectionEvent::Connected) = conn_rx.recv().await {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!manager.is_running());
    }
}
