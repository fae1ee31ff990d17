//! Native capability contracts
//!
//! The host implements these traits on top of real device services (speech
//! synthesis, recognition, map state, haptics) and installs them on a
//! [`HostDispatcher`] with [`HostCapabilities`]. Each operation is reachable
//! under the component/operation names in [`names`].

use crate::dispatcher::{HostDispatcher, Responder};
use crate::reentry::Reentry;
use crate::types::{BridgeError, Params, Payload, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Component and operation names understood by the content script
pub mod names {
    pub const SPEECH_SYNTHESIZER: &str = "SpeechSynthesizer";
    pub const SPEAK: &str = "speak";
    pub const IS_SPEAKING: &str = "isSpeaking";

    pub const STT: &str = "STT";
    pub const START_RECOGNIZER: &str = "startRecognizer";

    pub const PROPERTY: &str = "Property";
    pub const MAP_CENTER: &str = "mapCenter";
    pub const CALLBACK: &str = "callback";

    pub const SYSTEM: &str = "System";
    pub const LOG: &str = "log";

    pub const AUDIO_SERVICES: &str = "AudioServices";
    pub const VIBRATE: &str = "vibrate";
}

/// Speech output
pub trait SpeechOutput: Send + Sync {
    /// Speak `text`, interrupting current speech first when `flush` is set
    fn speak(&self, text: &str, flush: bool) -> Result<()>;

    fn is_speaking(&self) -> bool;
}

/// Speech input
pub trait SpeechInput: Send + Sync {
    /// Start listening; `on_result` receives the recognized text whenever
    /// recognition finishes
    fn start_recognizer(&self, on_result: Box<dyn FnOnce(Result<String>) + Send>) -> Result<()>;
}

/// Map centering request from the content map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapCenter {
    pub lat: f64,
    pub lng: f64,
    pub floor: f64,
    /// Whether the native map should follow the content map
    pub sync: bool,
}

impl MapCenter {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            lat: parse_f64(params, "lat")?,
            lng: parse_f64(params, "lng")?,
            floor: parse_f64(params, "floor")?,
            sync: parse_bool(params, "sync")?,
        })
    }
}

/// Map / position state
pub trait MapPosition: Send + Sync {
    fn map_center(&self, center: MapCenter) -> Result<()>;
}

/// Haptic feedback
pub trait Haptics: Send + Sync {
    fn vibrate(&self) -> Result<()>;
}

/// Sink for log lines written by the content script
pub trait SystemLog: Send + Sync {
    fn log(&self, text: &str);
}

/// Forwards content log lines to the `log` facade under the `content` target
pub struct LogFacade;

impl SystemLog for LogFacade {
    fn log(&self, text: &str) {
        log::info!(target: "content", "{text}");
    }
}

/// Persistent event name registered by the content script
///
/// `Property/callback` stores the name; the host then pushes payloads to it
/// with [`PropertyStore::notify`] whenever native state changes.
#[derive(Default)]
pub struct PropertyStore {
    target: Mutex<Option<(String, Arc<dyn Reentry>)>>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, name: String, reentry: Arc<dyn Reentry>) {
        if let Ok(mut target) = self.target.lock() {
            *target = Some((name, reentry));
        }
    }

    /// Event name currently registered, if any
    pub fn event_name(&self) -> Option<String> {
        self.target
            .lock()
            .ok()
            .and_then(|t| t.as_ref().map(|(name, _)| name.clone()))
    }

    /// Push a payload to the registered event; false if none is registered
    pub fn notify(&self, payload: Payload) -> bool {
        let target = self
            .target
            .lock()
            .ok()
            .and_then(|t| t.as_ref().map(|(n, r)| (n.clone(), Arc::clone(r))));
        match target {
            Some((name, reentry)) => {
                reentry.emit_event(&name, payload);
                true
            }
            None => {
                log::debug!("No property callback registered, notification dropped");
                false
            }
        }
    }
}

/// Set of capabilities a host offers, installed in one go
#[derive(Default)]
pub struct HostCapabilities {
    speech_output: Option<Arc<dyn SpeechOutput>>,
    speech_input: Option<Arc<dyn SpeechInput>>,
    map: Option<Arc<dyn MapPosition>>,
    haptics: Option<Arc<dyn Haptics>>,
    system_log: Option<Arc<dyn SystemLog>>,
    property: Option<Arc<PropertyStore>>,
}

impl HostCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn speech_output(mut self, speech: Arc<dyn SpeechOutput>) -> Self {
        self.speech_output = Some(speech);
        self
    }

    pub fn speech_input(mut self, recognizer: Arc<dyn SpeechInput>) -> Self {
        self.speech_input = Some(recognizer);
        self
    }

    pub fn map(mut self, map: Arc<dyn MapPosition>) -> Self {
        self.map = Some(map);
        self
    }

    pub fn haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = Some(haptics);
        self
    }

    pub fn system_log(mut self, sink: Arc<dyn SystemLog>) -> Self {
        self.system_log = Some(sink);
        self
    }

    pub fn property(mut self, store: Arc<PropertyStore>) -> Self {
        self.property = Some(store);
        self
    }

    /// Register a handler for every capability provided
    pub fn install(self, dispatcher: &mut HostDispatcher) {
        use names::*;

        if let Some(speech) = self.speech_output {
            let s = Arc::clone(&speech);
            dispatcher.register(
                SPEECH_SYNTHESIZER,
                SPEAK,
                move |p: &Params, r: Responder| -> Result<()> {
                    let flush = match p.get("flush") {
                        Some(_) => parse_bool(p, "flush")?,
                        None => false,
                    };
                    s.speak(p.require("text")?, flush)?;
                    r.respond(Payload::Null);
                    Ok(())
                },
            );

            // Answers through the named event when given one, and through
            // the one-shot callback when the caller registered one.
            dispatcher.register(
                SPEECH_SYNTHESIZER,
                IS_SPEAKING,
                move |p: &Params, r: Responder| -> Result<()> {
                    let speaking = speech.is_speaking();
                    if let Some(name) = p.get("callbackname") {
                        r.emit_event(name, json!(speaking));
                    }
                    r.respond(json!(speaking));
                    Ok(())
                },
            );
        }

        if let Some(recognizer) = self.speech_input {
            dispatcher.register(
                STT,
                START_RECOGNIZER,
                move |p: &Params, r: Responder| -> Result<()> {
                    let name = p.require("callbackname")?.to_string();
                    let reentry = r.reentry();
                    recognizer.start_recognizer(Box::new(move |result| {
                        let payload = match result {
                            Ok(text) => json!({ "text": text }),
                            Err(e) => json!({ "error": e.to_string() }),
                        };
                        reentry.emit_event(&name, payload);
                    }))?;
                    r.respond(Payload::Null);
                    Ok(())
                },
            );
        }

        if let Some(map) = self.map {
            dispatcher.register(
                PROPERTY,
                MAP_CENTER,
                move |p: &Params, r: Responder| -> Result<()> {
                    map.map_center(MapCenter::from_params(p)?)?;
                    r.respond(Payload::Null);
                    Ok(())
                },
            );
        }

        if let Some(store) = self.property {
            dispatcher.register(PROPERTY, CALLBACK, move |p: &Params, r: Responder| -> Result<()> {
                let name = p.require("value")?;
                log::debug!("Property callback set to '{name}'");
                store.set(name.to_string(), r.reentry());
                r.respond(Payload::Null);
                Ok(())
            });
        }

        if let Some(haptics) = self.haptics {
            dispatcher.register(
                AUDIO_SERVICES,
                VIBRATE,
                move |_p: &Params, r: Responder| -> Result<()> {
                    haptics.vibrate()?;
                    r.respond(Payload::Null);
                    Ok(())
                },
            );
        }

        if let Some(sink) = self.system_log {
            dispatcher.register(SYSTEM, LOG, move |p: &Params, r: Responder| -> Result<()> {
                sink.log(p.get("text").unwrap_or_default());
                r.respond(Payload::Null);
                Ok(())
            });
        }
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> BridgeError {
    BridgeError::InvalidParameter {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Booleans arrive as the script's string conversion of a boolean or number
fn parse_bool(params: &Params, name: &str) -> Result<bool> {
    match params.require(name)? {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        other => Err(invalid(name, format!("not a boolean: {other:?}"))),
    }
}

fn parse_f64(params: &Params, name: &str) -> Result<f64> {
    let raw = params.require(name)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(name, format!("not a number: {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_center_from_params() {
        let params = Params::new()
            .with("lat", "35.6197")
            .with("lng", "139.7762")
            .with("floor", "3")
            .with("sync", "true");

        let center = MapCenter::from_params(&params).unwrap();
        assert_eq!(
            center,
            MapCenter {
                lat: 35.6197,
                lng: 139.7762,
                floor: 3.0,
                sync: true
            }
        );
    }

    #[test]
    fn test_map_center_rejects_garbage() {
        let params = Params::new()
            .with("lat", "undefined")
            .with("lng", "139.7")
            .with("floor", "1")
            .with("sync", "false");

        let err = MapCenter::from_params(&params).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidParameter { ref name, .. } if name == "lat"));
    }

    #[test]
    fn test_parse_bool_forms() {
        let params = Params::new().with("a", "1").with("b", "false").with("c", "yes");

        assert!(parse_bool(&params, "a").unwrap());
        assert!(!parse_bool(&params, "b").unwrap());
        assert!(parse_bool(&params, "c").is_err());
        assert!(parse_bool(&params, "missing").is_err());
    }

    #[test]
    fn test_property_store_without_registration() {
        let store = PropertyStore::new();

        assert_eq!(store.event_name(), None);
        assert!(!store.notify(json!({"floor": 2})));
    }
}
