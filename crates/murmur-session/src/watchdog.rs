//! Cancellable single-shot timer.
//!
//! The mechanism behind the response timeout: arm it when the session
//! enters `Processing`, cancel it when the transcript arrives. At most one
//! timer is active; arming replaces (and aborts) any previous one.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Single-shot watchdog that runs a fallback action if it is not cancelled
/// within the armed window.
#[derive(Debug, Default)]
pub struct ResponseWatchdog {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ResponseWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the watchdog: after `duration`, run `on_expiry`.
    ///
    /// Any previously armed timer is aborted first, preserving the
    /// at-most-one-active invariant.
    pub fn arm<F>(&self, duration: Duration, on_expiry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            on_expiry.await;
        });

        let mut guard = self.handle.lock().expect("watchdog mutex poisoned");
        if let Some(previous) = guard.replace(task) {
            previous.abort();
        }
    }

    /// Cancel the pending timer, if any. Safe to call repeatedly and when
    /// nothing is armed.
    pub fn cancel(&self) {
        let mut guard = self.handle.lock().expect("watchdog mutex poisoned");
        if let Some(task) = guard.take() {
            task.abort();
        }
    }

    /// Whether a timer is currently armed and has not yet run or been
    /// cancelled.
    pub fn is_armed(&self) -> bool {
        let guard = self.handle.lock().expect("watchdog mutex poisoned");
        guard.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ResponseWatchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
