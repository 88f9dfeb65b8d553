//! Configuration types for the conference session

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a conference session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// WebSocket relay URL (ws:// or wss://)
    pub signaling_url: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Attach an outbound audio track to each peer connection
    pub enable_audio: bool,

    /// Attach an outbound video track to each peer connection
    pub enable_video: bool,

    /// Client metadata sent with the join request (user agent analog)
    pub client_meta: Option<String>,

    /// Relay reconnect policy
    pub reconnect: ReconnectPolicy,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Reconnect-with-backoff policy for the signaling transport.
///
/// Attempt `k` (1-indexed) waits `base_secs^k` seconds before retrying.
/// After `max_retries` failed retries the transport gives up with a fatal
/// connect error. This is the only time-bounded retry policy in the
/// system; negotiation steps have no timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Maximum number of retries after the initial attempt (default: 5)
    pub max_retries: u32,

    /// Exponential base in seconds (default: 2, giving 2/4/8/16/32)
    pub base_secs: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_secs: 2,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff delay before retry `attempt` (1-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.base_secs.saturating_pow(attempt))
    }

    /// Check if retry `attempt` (1-indexed) is still allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080/ws".to_string(),
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            turn_servers: Vec::new(),
            enable_audio: true,
            enable_video: true,
            client_meta: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a ws:// or wss:// URL
    /// - `stun_servers` is empty
    /// - `reconnect.base_secs` is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.reconnect.base_secs == 0 {
            return Err(Error::InvalidConfig(
                "reconnect.base_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
