//! Session configuration
//!
//! All durations are milliseconds. Every field has a default, so a JSON
//! config only needs the values it overrides:
//!
//! ```rust
//! use cowrite_core::SessionConfig;
//!
//! let config = SessionConfig::from_json(r#"{ "peer_timeout_ms": 60000 }"#).unwrap();
//! assert_eq!(config.peer_timeout_ms, 60_000);
//! assert_eq!(config.heartbeat_interval_ms, 10_000);
//! ```

use crate::awareness::{DEFAULT_TIMEOUT, HEARTBEAT_INTERVAL, THROTTLE_INTERVAL};
use crate::error::{Result, SyncError};
use crate::Millis;
use serde::{Deserialize, Serialize};

/// Public signaling relays used when none are configured
pub const DEFAULT_RELAY_URLS: [&str; 2] = [
    "wss://signaling.yjs.dev",
    "wss://y-webrtc-signaling-eu.herokuapp.com",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Signaling relays, tried in order with rotation on failure
    pub relay_urls: Vec<String>,
    pub awareness_throttle_ms: Millis,
    pub heartbeat_interval_ms: Millis,
    /// Silence after which a peer is considered gone
    pub peer_timeout_ms: Millis,
    /// How long buffered operations may wait for dependencies before a resync
    pub causal_gap_timeout_ms: Millis,
    /// Consecutive relay failures before the user is notified
    pub max_relay_attempts: u32,
    pub reconnect_base_ms: Millis,
    pub reconnect_max_ms: Millis,
    /// Local updates held while no peer is reachable
    pub offline_queue_limit: usize,
    /// Collect tombstones once every connected peer has seen the deletion
    pub gc_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            relay_urls: DEFAULT_RELAY_URLS.iter().map(|s| s.to_string()).collect(),
            awareness_throttle_ms: THROTTLE_INTERVAL,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL,
            peer_timeout_ms: DEFAULT_TIMEOUT,
            causal_gap_timeout_ms: 5_000,
            max_relay_attempts: 5,
            reconnect_base_ms: 500,
            reconnect_max_ms: 30_000,
            offline_queue_limit: 1024,
            gc_enabled: true,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.relay_urls.is_empty() {
            return Err(SyncError::Config("at least one relay URL is required".into()));
        }
        if let Some(bad) = self
            .relay_urls
            .iter()
            .find(|url| !(url.starts_with("ws://") || url.starts_with("wss://")))
        {
            return Err(SyncError::Config(format!(
                "relay URL must use ws:// or wss://: {}",
                bad
            )));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(SyncError::Config("heartbeat_interval_ms must be positive".into()));
        }
        if self.peer_timeout_ms <= self.heartbeat_interval_ms {
            return Err(SyncError::Config(format!(
                "peer_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.peer_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        if self.reconnect_base_ms == 0 || self.reconnect_base_ms > self.reconnect_max_ms {
            return Err(SyncError::Config(
                "reconnect_base_ms must be positive and not exceed reconnect_max_ms".into(),
            ));
        }
        if self.max_relay_attempts == 0 {
            return Err(SyncError::Config("max_relay_attempts must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.relay_urls.len(), 2);
        assert_eq!(config.awareness_throttle_ms, 80);
        assert_eq!(config.causal_gap_timeout_ms, 5_000);
    }

    #[test]
    fn test_partial_json() {
        let config =
            SessionConfig::from_json(r#"{"relay_urls": ["ws://localhost:4444"], "gc_enabled": false}"#)
                .unwrap();
        assert_eq!(config.relay_urls, vec!["ws://localhost:4444".to_string()]);
        assert!(!config.gc_enabled);
        assert_eq!(config.peer_timeout_ms, 30_000);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            SessionConfig::from_json(r#"{"relay_urls": []}"#),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{"relay_urls": ["http://example.com"]}"#),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{"peer_timeout_ms": 5000}"#),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_json("{"),
            Err(SyncError::Json(_))
        ));
    }
}
