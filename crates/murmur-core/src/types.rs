use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unix timestamp in seconds.
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }
}

/// Address of the remote transcription server.
///
/// Set once per session lifetime; immutable during an active connection
/// attempt. An empty URL is representable but rejected at connect time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerUrl(pub String);

impl ServerUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServerUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_now_is_recent() {
        let ts = Timestamp::now();
        let dt = ts.to_datetime();
        let delta = (Utc::now() - dt).num_seconds();
        assert!((0..5).contains(&delta));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Timestamp(1_700_000_000);
        let rt = Timestamp::from_datetime(ts.to_datetime());
        assert_eq!(ts, rt);
    }

    #[test]
    fn test_timestamp_serde_round_trip() {
        let ts = Timestamp::now();
        let json = serde_json::to_string(&ts).unwrap();
        let rt: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, rt);
    }

    #[test]
    fn test_server_url_empty() {
        assert!(ServerUrl::new("").is_empty());
        assert!(ServerUrl::new("   ").is_empty());
        assert!(!ServerUrl::new("ws://localhost:7860").is_empty());
    }

    #[test]
    fn test_server_url_display() {
        let url = ServerUrl::new("ws://localhost:7860");
        assert_eq!(url.to_string(), "ws://localhost:7860");
        assert_eq!(url.as_str(), "ws://localhost:7860");
    }
}
