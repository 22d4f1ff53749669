//! Murmur session crate - connection lifecycle and recording-session
//! coordination.
//!
//! One logical dictation session is kept consistent across an unreliable,
//! asynchronously-connecting transport, user start/stop gestures that can
//! race with connect/disconnect, and a server round-trip that must complete
//! or time out before the session returns to idle. The state machine in
//! [`state`] is the single source of truth; everything else requests
//! transitions and reacts to the outcome.

pub mod backoff;
pub mod connection;
pub mod controller;
pub mod state;
pub mod transport;
pub mod watchdog;

pub use backoff::BackoffPolicy;
pub use connection::{ConnectionEvent, ConnectionManager};
pub use controller::{RetryStatus, SessionController};
pub use state::{SessionState, StateMachine};
pub use transport::{LoopbackTransport, TransportClient, TransportEvent};
pub use watchdog::ResponseWatchdog;
