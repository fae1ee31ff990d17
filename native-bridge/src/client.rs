//! Typed content-side facade over [`BridgeQueue`]
//!
//! One method per host capability, with the parameter names the host handlers
//! expect. Fire-and-forget unless stated otherwise.

use crate::capabilities::names::*;
use crate::queue::BridgeQueue;
use crate::types::{BridgeError, Params, Payload, Result};

#[derive(Clone)]
pub struct MobileBridge {
    queue: BridgeQueue,
}

impl MobileBridge {
    pub fn new(queue: BridgeQueue) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &BridgeQueue {
        &self.queue
    }

    pub fn speak(&self, text: &str, flush: bool) -> Result<()> {
        self.queue.enqueue_call(
            SPEECH_SYNTHESIZER,
            SPEAK,
            Params::new().with("text", text).with("flush", flush),
        )
    }

    /// Register `name` as the event the host pushes property changes to
    pub fn set_callback(&self, name: &str) -> Result<()> {
        self.queue
            .enqueue_call(PROPERTY, CALLBACK, Params::new().with("value", name))
    }

    /// Ask the host to report speech state to the event `name`
    pub fn is_speaking(&self, name: &str) -> Result<()> {
        self.queue.enqueue_call(
            SPEECH_SYNTHESIZER,
            IS_SPEAKING,
            Params::new().with("callbackname", name),
        )
    }

    /// Speech state as a direct answer instead of an event
    pub async fn query_speaking(&self) -> Result<bool> {
        match self
            .queue
            .call(SPEECH_SYNTHESIZER, IS_SPEAKING, Params::new())
            .await?
        {
            Payload::Bool(speaking) => Ok(speaking),
            other => Err(BridgeError::HostFailure(format!(
                "isSpeaking answered {other}"
            ))),
        }
    }

    /// Start recognition; the text arrives on the event `name`
    pub fn start_recognizer(&self, name: &str) -> Result<()> {
        self.queue.enqueue_call(
            STT,
            START_RECOGNIZER,
            Params::new().with("callbackname", name),
        )
    }

    pub fn map_center(&self, lat: f64, lng: f64, floor: f64, sync: bool) -> Result<()> {
        self.queue.enqueue_call(
            PROPERTY,
            MAP_CENTER,
            Params::new()
                .with("lat", lat)
                .with("lng", lng)
                .with("floor", floor)
                .with("sync", sync),
        )
    }

    pub fn log_text(&self, text: &str) -> Result<()> {
        self.queue
            .enqueue_call(SYSTEM, LOG, Params::new().with("text", text))
    }

    pub fn vibrate(&self) -> Result<()> {
        self.queue
            .enqueue_call(AUDIO_SERVICES, VIBRATE, Params::new())
    }
}
