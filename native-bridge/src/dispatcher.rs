//! Host dispatcher
//!
//! Sits behind the content surface's navigation callback. Addresses using the
//! bridge scheme are decoded and routed to the handler registered for their
//! component/operation pair; everything else is left to load normally.

use crate::codec::{AddressCodec, DecodedCall};
use crate::config::{AckMode, BridgeConfig};
use crate::reentry::Reentry;
use crate::types::{BridgeError, CallbackId, Params, Payload, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A native operation callable from the content context
///
/// Closures of the form `Fn(&Params, Responder) -> Result<()>` are handlers.
pub trait Handler: Send + Sync {
    fn call(&self, params: &Params, responder: Responder) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Params, Responder) -> Result<()> + Send + Sync,
{
    fn call(&self, params: &Params, responder: Responder) -> Result<()> {
        self(params, responder)
    }
}

/// Reply path for one intercepted call
///
/// Handlers may reply synchronously or move the responder into whatever
/// completes the operation later. If the caller registered no callback the
/// replies are no-ops.
pub struct Responder {
    callback: Option<CallbackId>,
    reentry: Arc<dyn Reentry>,
}

impl Responder {
    pub fn callback(&self) -> Option<CallbackId> {
        self.callback
    }

    pub fn expects_reply(&self) -> bool {
        self.callback.is_some()
    }

    /// Resolve the caller's callback with a payload
    pub fn respond(self, payload: Payload) {
        if let Some(id) = self.callback {
            self.reentry.resolve(id, Ok(payload));
        }
    }

    /// Resolve the caller's callback with a host failure
    pub fn fail(self, message: impl Into<String>) {
        if let Some(id) = self.callback {
            self.reentry
                .resolve(id, Err(BridgeError::HostFailure(message.into())));
        }
    }

    /// Deliver a payload to a persistent content-side listener
    pub fn emit_event(&self, name: &str, payload: Payload) {
        self.reentry.emit_event(name, payload);
    }

    /// Keep the re-entry path for events pushed after this call completes
    pub fn reentry(&self) -> Arc<dyn Reentry> {
        Arc::clone(&self.reentry)
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where handler invocations run
pub enum HostExecutor {
    /// On the thread that intercepted the navigation
    Inline,
    /// On whichever task runs the paired [`HostLoop`]
    Channel(mpsc::UnboundedSender<Job>),
}

impl HostExecutor {
    /// Executor that marshals handlers onto a [`HostLoop`]
    pub fn channel() -> (HostExecutor, HostLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HostExecutor::Channel(tx), HostLoop { rx })
    }

    fn execute(&self, job: Job) {
        match self {
            HostExecutor::Inline => job(),
            HostExecutor::Channel(tx) => {
                if tx.send(job).is_err() {
                    log::warn!("Host loop stopped; handler invocation dropped");
                }
            }
        }
    }
}

/// Runs marshalled handler invocations on the task that owns native state
pub struct HostLoop {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl HostLoop {
    /// Run jobs until the dispatcher is dropped
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
    }

    /// Run every job already posted, without waiting
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            count += 1;
        }
        count
    }
}

/// Routes intercepted bridge addresses to registered native handlers
pub struct HostDispatcher {
    codec: AddressCodec,
    ack_mode: AckMode,
    handlers: HashMap<String, HashMap<String, Arc<dyn Handler>>>,
    reentry: Arc<dyn Reentry>,
    executor: HostExecutor,
}

impl HostDispatcher {
    pub fn new(config: &BridgeConfig, reentry: Arc<dyn Reentry>) -> Self {
        Self {
            codec: AddressCodec::new(config),
            ack_mode: config.ack_mode,
            handlers: HashMap::new(),
            reentry,
            executor: HostExecutor::Inline,
        }
    }

    /// Builder method: set where handlers run
    pub fn with_executor(mut self, executor: HostExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Register a handler for one operation of one component
    ///
    /// A later registration for the same pair replaces the earlier one.
    pub fn register<H>(
        &mut self,
        component: impl Into<String>,
        operation: impl Into<String>,
        handler: H,
    ) where
        H: Handler + 'static,
    {
        let component = component.into();
        let operation = operation.into();
        log::debug!("Registering handler {component}/{operation}");
        self.handlers
            .entry(component)
            .or_default()
            .insert(operation, Arc::new(handler));
    }

    pub fn has_capability(&self, component: &str, operation: &str) -> bool {
        self.handlers
            .get(component)
            .is_some_and(|ops| ops.contains_key(operation))
    }

    /// Registered (component, operation) pairs, sorted
    pub fn capabilities(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .handlers
            .iter()
            .flat_map(|(c, ops)| ops.keys().map(move |o| (c.clone(), o.clone())))
            .collect();
        pairs.sort();
        pairs
    }

    /// Navigation-policy entry point
    ///
    /// Returns true when the navigation must be suppressed because it was a
    /// bridge call, false when the surface should load `address` normally.
    pub fn intercept(&self, address: &str) -> bool {
        match self.dispatch(address) {
            Ok(_) => true,
            Err(BridgeError::MalformedAddress(reason)) => {
                if self.codec.matches(address) {
                    log::warn!("Malformed bridge address not handled: {reason}");
                } else {
                    log::trace!("Not a bridge address: {address}");
                }
                false
            }
            Err(e) => {
                log::warn!("Bridge call dropped: {e}");
                true
            }
        }
    }

    /// Decode and route one address
    ///
    /// Fails with `MalformedAddress` for anything that is not a bridge address,
    /// and with `UnknownCapability` when nothing is registered for the call.
    /// Unknown calls are not retried and their caller is not notified.
    pub fn dispatch(&self, address: &str) -> Result<DecodedCall> {
        let decoded = self.codec.decode(address)?;
        let routed = self.route(&decoded);

        if self.ack_mode == AckMode::Explicit {
            if let Some(token) = &decoded.token {
                self.reentry.acknowledge(token);
            }
        }

        routed.map(|_| decoded)
    }

    fn route(&self, decoded: &DecodedCall) -> Result<()> {
        let request = &decoded.request;
        let handler = self
            .handlers
            .get(&request.component)
            .and_then(|ops| ops.get(&request.operation))
            .cloned()
            .ok_or_else(|| BridgeError::UnknownCapability {
                component: request.component.clone(),
                operation: request.operation.clone(),
            })?;

        log::debug!(
            "Intercepted {}/{} ({} params{})",
            request.component,
            request.operation,
            request.params.len(),
            decoded
                .callback
                .map(|id| format!(", callback {id}"))
                .unwrap_or_default()
        );

        let label = format!("{}/{}", request.component, request.operation);
        let params = request.params.clone();
        let callback = decoded.callback;
        let reentry = Arc::clone(&self.reentry);

        self.executor.execute(Box::new(move || {
            let responder = Responder {
                callback,
                reentry: Arc::clone(&reentry),
            };
            if let Err(e) = handler.call(&params, responder) {
                log::warn!("{label} failed: {e}");
                if let Some(id) = callback {
                    reentry.resolve(id, Err(BridgeError::HostFailure(e.to_string())));
                }
            }
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallbackResult;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingReentry {
        acks: Mutex<Vec<String>>,
        resolved: Mutex<Vec<(CallbackId, CallbackResult)>>,
        events: Mutex<Vec<(String, Payload)>>,
    }

    impl Reentry for RecordingReentry {
        fn acknowledge(&self, token: &str) {
            self.acks.lock().unwrap().push(token.to_string());
        }

        fn resolve(&self, id: CallbackId, result: CallbackResult) {
            self.resolved.lock().unwrap().push((id, result));
        }

        fn emit_event(&self, name: &str, payload: Payload) {
            self.events.lock().unwrap().push((name.to_string(), payload));
        }
    }

    fn dispatcher() -> (Arc<RecordingReentry>, HostDispatcher) {
        let reentry = Arc::new(RecordingReentry::default());
        let dispatcher = HostDispatcher::new(&BridgeConfig::new(), reentry.clone());
        (reentry, dispatcher)
    }

    #[test]
    fn test_foreign_scheme_not_intercepted() {
        let (reentry, dispatcher) = dispatcher();

        assert!(!dispatcher.intercept("https://hulop.example/map.html"));
        assert!(!dispatcher.intercept("native:///speak?x=1"));
        assert!(reentry.acks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handler_receives_decoded_params() {
        let (reentry, mut dispatcher) = dispatcher();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher.register(
            "SpeechSynthesizer",
            "speak",
            move |params: &Params, _r: Responder| -> Result<()> {
                sink.lock().unwrap().push(params.clone());
                Ok(())
            },
        );

        let address = "native://SpeechSynthesizer/speak?text=hello%20world&flush=true&_dummy_=1-1";
        assert!(dispatcher.intercept(address));

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], Params::new().with("text", "hello world").with("flush", "true"));
        assert_eq!(*reentry.acks.lock().unwrap(), vec!["1-1".to_string()]);
    }

    #[test]
    fn test_unknown_capability_dropped_but_suppressed() {
        let (reentry, dispatcher) = dispatcher();

        let err = dispatcher
            .dispatch("native://Camera/capture?callback=3&_dummy_=1-1")
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::UnknownCapability {
                component: "Camera".into(),
                operation: "capture".into()
            }
        );
        assert!(dispatcher.intercept("native://Camera/capture?_dummy_=1-2"));

        // The slot is still released, the caller is never notified
        assert_eq!(reentry.acks.lock().unwrap().len(), 2);
        assert!(reentry.resolved.lock().unwrap().is_empty());
    }

    #[test]
    fn test_responder_resolves_callback() {
        let (reentry, mut dispatcher) = dispatcher();
        dispatcher.register(
            "SpeechSynthesizer",
            "isSpeaking",
            |_p: &Params, r: Responder| -> Result<()> {
                r.respond(json!(true));
                Ok(())
            },
        );

        dispatcher.intercept("native://SpeechSynthesizer/isSpeaking?callback=5&_dummy_=1-1");

        let resolved = reentry.resolved.lock().unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0], (CallbackId(5), Ok(json!(true))));
    }

    #[test]
    fn test_handler_error_becomes_host_failure() {
        let (reentry, mut dispatcher) = dispatcher();
        dispatcher.register("Property", "mapCenter", |p: &Params, _r: Responder| -> Result<()> {
            p.require("lat").map(|_| ())
        });

        assert!(dispatcher.intercept("native://Property/mapCenter?callback=9&_dummy_=1-1"));

        let resolved = reentry.resolved.lock().unwrap();
        assert!(matches!(
            &resolved[0],
            (CallbackId(9), Err(BridgeError::HostFailure(msg))) if msg.contains("lat")
        ));
    }

    #[test]
    fn test_immediate_mode_sends_no_acks() {
        let reentry = Arc::new(RecordingReentry::default());
        let config = BridgeConfig::new().with_ack_mode(AckMode::Immediate);
        let mut dispatcher = HostDispatcher::new(&config, reentry.clone());
        dispatcher.register(
            "AudioServices",
            "vibrate",
            |_p: &Params, _r: Responder| -> Result<()> {
                Ok(())
            },
        );

        assert!(dispatcher.intercept("native://AudioServices/vibrate?_dummy_=1-1"));
        assert!(reentry.acks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_channel_executor_defers_handlers() {
        let reentry = Arc::new(RecordingReentry::default());
        let (executor, mut host_loop) = HostExecutor::channel();
        let mut dispatcher =
            HostDispatcher::new(&BridgeConfig::new(), reentry.clone()).with_executor(executor);
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        dispatcher.register(
            "AudioServices",
            "vibrate",
            move |_p: &Params, _r: Responder| -> Result<()> {
                *counter.lock().unwrap() += 1;
                Ok(())
            },
        );

        assert!(dispatcher.intercept("native://AudioServices/vibrate?_dummy_=1-1"));
        assert_eq!(*calls.lock().unwrap(), 0);
        // Acknowledged at interception, before the handler ran
        assert_eq!(reentry.acks.lock().unwrap().len(), 1);

        assert_eq!(host_loop.run_pending(), 1);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_capabilities_listing() {
        let (_reentry, mut dispatcher) = dispatcher();
        dispatcher.register("System", "log", |_p: &Params, _r: Responder| -> Result<()> { Ok(()) });
        dispatcher.register(
            "AudioServices",
            "vibrate",
            |_p: &Params, _r: Responder| -> Result<()> {
                Ok(())
            },
        );

        assert!(dispatcher.has_capability("System", "log"));
        assert!(!dispatcher.has_capability("System", "vibrate"));
        assert_eq!(
            dispatcher.capabilities(),
            vec![
                ("AudioServices".to_string(), "vibrate".to_string()),
                ("System".to_string(), "log".to_string())
            ]
        );
    }
}
