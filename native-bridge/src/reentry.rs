//! Re-entry into the content context
//!
//! The host never touches the queue or the callback registry directly. Everything
//! it has to say to the content side (acknowledge an emission, resolve a callback,
//! push a named event) goes through a [`Reentry`] implementation, which serializes
//! it onto the content context's own event loop.

use crate::types::{CallbackId, CallbackResult, Payload};

/// The host's only way back into the content context
pub trait Reentry: Send + Sync {
    /// Release the dispatch slot held by the emission carrying `token`
    fn acknowledge(&self, token: &str);

    /// Settle the one-shot callback registered under `id`
    fn resolve(&self, id: CallbackId, result: CallbackResult);

    /// Deliver a payload to the persistent listener registered under `name`
    fn emit_event(&self, name: &str, payload: Payload);
}

/// Something that can evaluate a script expression inside a web surface
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(&self, script: &str);
}

impl<F> ScriptEvaluator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn evaluate(&self, script: &str) {
        self(script)
    }
}

/// Re-entry for a real web surface: renders JavaScript and evaluates it
///
/// The content script is expected to expose `resolve`, `fail`, `ack` and `emit`
/// on a namespace object (`window.$bridge` by default).
pub struct ScriptReentry<E> {
    evaluator: E,
    namespace: String,
}

impl<E: ScriptEvaluator> ScriptReentry<E> {
    pub fn new(evaluator: E) -> Self {
        Self::with_namespace(evaluator, "window.$bridge")
    }

    pub fn with_namespace(evaluator: E, namespace: impl Into<String>) -> Self {
        Self {
            evaluator,
            namespace: namespace.into(),
        }
    }

    pub fn render_resolve(&self, id: CallbackId, result: &CallbackResult) -> String {
        match result {
            Ok(payload) => format!("{}.resolve({}, {})", self.namespace, id, js_literal(payload)),
            Err(e) => format!(
                "{}.fail({}, {})",
                self.namespace,
                id,
                js_literal(&Payload::String(e.to_string()))
            ),
        }
    }

    pub fn render_ack(&self, token: &str) -> String {
        format!(
            "{}.ack({})",
            self.namespace,
            js_literal(&Payload::String(token.to_string()))
        )
    }

    pub fn render_event(&self, name: &str, payload: &Payload) -> String {
        format!(
            "{}.emit({}, {})",
            self.namespace,
            js_literal(&Payload::String(name.to_string())),
            js_literal(payload)
        )
    }
}

impl<E: ScriptEvaluator> Reentry for ScriptReentry<E> {
    fn acknowledge(&self, token: &str) {
        self.evaluator.evaluate(&self.render_ack(token));
    }

    fn resolve(&self, id: CallbackId, result: CallbackResult) {
        self.evaluator.evaluate(&self.render_resolve(id, &result));
    }

    fn emit_event(&self, name: &str, payload: Payload) {
        self.evaluator.evaluate(&self.render_event(name, &payload));
    }
}

/// JSON text that is also a valid JavaScript expression
///
/// JSON allows raw U+2028/U+2029 inside strings, older script engines do not.
fn js_literal(value: &Payload) -> String {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    json.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
}
