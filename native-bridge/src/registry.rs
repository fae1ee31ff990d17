//! Pending callback registry
//!
//! Correlates a later host re-entry with the callback registered when the call
//! was enqueued. Every entry carries a deadline; whichever comes first, the
//! host's resolution or the deadline, removes the entry and runs the callback.
//! Nothing else can run it, so a callback fires at most once.

use crate::types::{BridgeError, CallState, Callback, CallbackId, CallbackResult};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

struct PendingCallback {
    /// "component/operation", for log lines
    label: String,
    callback: Callback,
    deadline: Instant,
    state: CallState,
}

/// Registry of callbacks awaiting a host response
pub struct CallbackRegistry {
    entries: HashMap<CallbackId, PendingCallback>,
    next_id: u64,
    timeout: Duration,
}

impl CallbackRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
            timeout,
        }
    }

    /// Store a callback and allocate its correlation id
    pub fn register(
        &mut self,
        label: impl Into<String>,
        callback: Callback,
        now: Instant,
    ) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;

        self.entries.insert(
            id,
            PendingCallback {
                label: label.into(),
                callback,
                deadline: now + self.timeout,
                state: CallState::Created,
            },
        );
        id
    }

    /// Record that the request carrying `id` was handed to the transport
    pub fn mark_in_flight(&mut self, id: CallbackId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.state = CallState::InFlight;
        }
    }

    /// Current state of a pending entry (None once settled)
    pub fn state(&self, id: CallbackId) -> Option<CallState> {
        self.entries.get(&id).map(|e| e.state)
    }

    /// Settle an entry with the host's outcome
    ///
    /// Returns false when the id is unknown or was already settled; the
    /// result is dropped in that case.
    pub fn resolve(&mut self, id: CallbackId, result: CallbackResult) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            if id.0 < self.next_id {
                log::debug!("Late resolution for callback {id} ignored (already settled)");
            } else {
                log::warn!("Resolution for unknown callback {id} ignored");
            }
            return false;
        };

        let state = if result.is_ok() {
            CallState::Resolved
        } else {
            CallState::Failed
        };
        log::debug!("Callback {id} ({}) {} -> {}", entry.label, entry.state, state);
        (entry.callback)(result);
        true
    }

    /// Time out every entry whose deadline is not after `now`
    ///
    /// Returns the number of callbacks that received a `Timeout`.
    pub fn expire(&mut self, now: Instant) -> usize {
        let due: Vec<CallbackId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &due {
            if let Some(entry) = self.entries.remove(id) {
                log::warn!(
                    "Callback {id} ({}) {} -> {}: host never responded",
                    entry.label,
                    entry.state,
                    CallState::TimedOut
                );
                (entry.callback)(Err(BridgeError::Timeout(*id)));
            }
        }
        due.len()
    }

    /// Earliest deadline among pending entries
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.deadline).min()
    }

    /// Fail every pending entry, used when the bridge shuts down
    pub fn close(&mut self) {
        for (_, entry) in self.entries.drain() {
            (entry.callback)(Err(BridgeError::BridgeClosed));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<CallbackResult>>>;

    fn recorder() -> (Seen, impl Fn() -> Callback) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let make = move || -> Callback {
            let sink = sink.clone();
            Box::new(move |r| sink.lock().unwrap().push(r))
        };
        (seen, make)
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let (_, make) = recorder();
        let mut registry = CallbackRegistry::new(Duration::from_secs(1));
        let now = Instant::now();

        let a = registry.register("A/a", make(), now);
        let b = registry.register("A/a", make(), now);
        assert!(b > a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_resolve_fires_once() {
        let (seen, make) = recorder();
        let mut registry = CallbackRegistry::new(Duration::from_secs(1));
        let id = registry.register("SpeechSynthesizer/isSpeaking", make(), Instant::now());
        registry.mark_in_flight(id);
        assert_eq!(registry.state(id), Some(CallState::InFlight));

        assert!(registry.resolve(id, Ok(json!(true))));
        assert!(!registry.resolve(id, Ok(json!(false))));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], Ok(json!(true)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_expire_only_due_entries() {
        let (seen, make) = recorder();
        let mut registry = CallbackRegistry::new(Duration::from_millis(100));
        let start = Instant::now();

        let early = registry.register("A/a", make(), start);
        let late = registry.register("A/a", make(), start + Duration::from_millis(50));
        assert_eq!(registry.next_deadline(), Some(start + Duration::from_millis(100)));

        assert_eq!(registry.expire(start + Duration::from_millis(100)), 1);
        assert_eq!(registry.state(early), None);
        assert_eq!(registry.state(late), Some(CallState::Created));
        assert_eq!(seen.lock().unwrap()[0], Err(BridgeError::Timeout(early)));

        // A resolution arriving after expiry changes nothing
        assert!(!registry.resolve(early, Ok(json!("late"))));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_close_fails_everything() {
        let (seen, make) = recorder();
        let mut registry = CallbackRegistry::new(Duration::from_secs(1));
        registry.register("A/a", make(), Instant::now());
        registry.register("B/b", make(), Instant::now());

        registry.close();

        assert!(registry.is_empty());
        assert!(seen
            .lock()
            .unwrap()
            .iter()
            .all(|r| *r == Err(BridgeError::BridgeClosed)));
    }
}
