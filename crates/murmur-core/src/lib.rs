pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod types;

pub use config::MurmurConfig;
pub use error::{MurmurError, Result};
pub use events::SessionEvent;
pub use protocol::{ControlMessage, ServerMessage};
pub use types::*;
