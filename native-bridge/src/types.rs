//! Core types for the native call bridge
//!
//! This module defines the values that travel between the content context and the
//! host: call requests, their ordered parameter mapping, callback identifiers and
//! the error type shared by both sides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result payload delivered back to a content-side callback
pub type Payload = serde_json::Value;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// What a one-shot callback receives: the host's payload, or why there is none
pub type CallbackResult = Result<Payload>;

/// Boxed one-shot callback stored in the pending callback registry
pub type Callback = Box<dyn FnOnce(CallbackResult) + Send + 'static>;

/// Boxed persistent listener for named host events
pub type EventListener = Box<dyn FnMut(Payload) + Send + 'static>;

/// Insertion-ordered string parameters of a call
///
/// Order matters: the encoder emits parameters in the order they were inserted.
/// Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.0.push((key, value));
                None
            }
        }
    }

    /// Builder form of [`Params::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required parameter lookup for handlers
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| BridgeError::InvalidParameter {
            name: key.to_string(),
            reason: "missing".to_string(),
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// One serialized invocation of a named operation on a named capability group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Capability group on the host (e.g. "SpeechSynthesizer")
    pub component: String,
    /// Operation within the group (e.g. "speak")
    pub operation: String,
    /// String parameters, in insertion order
    pub params: Params,
}

impl CallRequest {
    pub fn new(component: impl Into<String>, operation: impl Into<String>, params: Params) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            params,
        }
    }
}

/// Correlation identifier for a call expecting a response
///
/// Allocated from a counter owned by one bridge queue, so identifiers never
/// collide within the life of that queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallbackId(pub u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CallbackId {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u64>()
            .map(CallbackId)
            .map_err(|_| BridgeError::InvalidParameter {
                name: "callback".to_string(),
                reason: format!("not a callback id: {s:?}"),
            })
    }
}

/// Lifecycle of a call registered with a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Callback stored, request waiting in the queue
    Created,
    /// Request emitted to the transport, awaiting the host
    InFlight,
    /// Host re-entered and the callback ran with a payload
    Resolved,
    /// Host re-entered with a failure
    Failed,
    /// Deadline passed before the host responded
    TimedOut,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Resolved | CallState::Failed | CallState::TimedOut)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Created => write!(f, "Created"),
            CallState::InFlight => write!(f, "InFlight"),
            CallState::Resolved => write!(f, "Resolved"),
            CallState::Failed => write!(f, "Failed"),
            CallState::TimedOut => write!(f, "TimedOut"),
        }
    }
}

/// Errors that can occur on either side of the bridge
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("Malformed bridge address: {0}")]
    MalformedAddress(String),

    #[error("Unknown capability: {component}/{operation}")]
    UnknownCapability { component: String, operation: String },

    #[error("Callback {0} timed out waiting for the host")]
    Timeout(CallbackId),

    #[error("Host operation failed: {0}")]
    HostFailure(String),

    #[error("Value breaks the address grammar: {0}")]
    EncodingViolation(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Bridge is closed")]
    BridgeClosed,
}
