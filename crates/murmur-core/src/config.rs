use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MurmurError, Result};

/// Top-level configuration for the Murmur overlay.
///
/// Loaded from `~/.murmur/config.toml` by default. Each section corresponds
/// to one subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MurmurConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl MurmurConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MurmurConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MurmurError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check connection parameters for values the retry loop cannot work with.
    ///
    /// An empty server URL is allowed here; it is rejected at connect time
    /// instead, so a fresh install can still start up and show the overlay.
    pub fn validate(&self) -> Result<()> {
        let conn = &self.connection;
        if conn.base_delay_ms == 0 {
            return Err(MurmurError::Config(
                "connection.base_delay_ms must be greater than zero".to_string(),
            ));
        }
        if conn.max_delay_ms < conn.base_delay_ms {
            return Err(MurmurError::Config(format!(
                "connection.max_delay_ms ({}) must be >= base_delay_ms ({})",
                conn.max_delay_ms, conn.base_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&conn.jitter) {
            return Err(MurmurError::Config(format!(
                "connection.jitter ({}) must be within [0.0, 1.0]",
                conn.jitter
            )));
        }
        if self.session.response_timeout_secs == 0 {
            return Err(MurmurError::Config(
                "session.response_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Server connection and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Address of the remote transcription server.
    pub server_url: String,
    /// First retry delay in milliseconds.
    pub base_delay_ms: u64,
    /// Retry delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Randomization applied to each retry delay, as a fraction (0.2 = ±20%).
    pub jitter: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter: 0.2,
        }
    }
}

/// Recording-session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for the server's transcript before forcing a
    /// disconnect.
    pub response_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: 10,
        }
    }
}
