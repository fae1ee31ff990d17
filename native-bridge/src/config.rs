//! Bridge configuration types
//!
//! Both sides of one bridge must agree on the scheme and the reserved keys, so a
//! single `BridgeConfig` is shared by the queue and the dispatcher.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the dispatch loop decides the in-flight slot is free again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckMode {
    /// Free the slot as soon as the transport accepted the address.
    /// A slow host may still be handling the previous call.
    Immediate,
    /// Wait for the host to acknowledge the emission token
    #[default]
    Explicit,
}

/// Configuration shared by the bridge queue and the host dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Reserved address scheme (default: "native")
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Parameter key carrying the callback identifier (default: "callback")
    #[serde(default = "default_callback_key")]
    pub callback_key: String,

    /// Parameter key carrying the cache-busting token (default: "_dummy_")
    #[serde(default = "default_cache_buster_key")]
    pub cache_buster_key: String,

    /// Slot release policy
    #[serde(default)]
    pub ack_mode: AckMode,

    /// How long an explicit acknowledgment may take before the slot is
    /// released anyway (default: 2000ms)
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_ms: u64,

    /// Expiry of a pending callback (default: 30000ms)
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_ms: u64,
}

fn default_scheme() -> String {
    "native".to_string()
}

fn default_callback_key() -> String {
    "callback".to_string()
}

fn default_cache_buster_key() -> String {
    "_dummy_".to_string()
}

fn default_ack_timeout() -> u64 {
    2000
}

fn default_callback_timeout() -> u64 {
    30_000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            callback_key: default_callback_key(),
            cache_buster_key: default_cache_buster_key(),
            ack_mode: AckMode::default(),
            ack_timeout_ms: default_ack_timeout(),
            callback_timeout_ms: default_callback_timeout(),
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the reserved scheme
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Builder method: set the callback-identifier key
    pub fn with_callback_key(mut self, key: impl Into<String>) -> Self {
        self.callback_key = key.into();
        self
    }

    /// Builder method: set the acknowledgment policy
    pub fn with_ack_mode(mut self, mode: AckMode) -> Self {
        self.ack_mode = mode;
        self
    }

    /// Builder method: set the acknowledgment timeout
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: set the pending callback expiry
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    /// Check whether a parameter key is reserved by the protocol
    pub fn is_reserved_key(&self, key: &str) -> bool {
        key == self.callback_key || key == self.cache_buster_key
    }
}
