//! Replay report
//!
//! Collects what a replay produced (emitted addresses, callback outcomes, host
//! events) and prints it as plain text or JSON.

use crate::config::OutputFormat;
use anyhow::Result;
use native_bridge::{BridgeError, CallbackResult, Payload};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Failed,
    Timeout,
    Closed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyRecord {
    /// Index of the call in the script
    pub call: usize,
    pub target: String,
    pub outcome: Outcome,
    pub payload: Payload,
}

impl ReplyRecord {
    pub fn new(call: usize, target: String, result: CallbackResult) -> Self {
        let (outcome, payload) = match result {
            Ok(payload) => (Outcome::Ok, payload),
            Err(BridgeError::Timeout(_)) => (Outcome::Timeout, Payload::Null),
            Err(BridgeError::BridgeClosed) => (Outcome::Closed, Payload::Null),
            Err(e) => (Outcome::Failed, Payload::String(e.to_string())),
        };
        Self {
            call,
            target,
            outcome,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub name: String,
    pub payload: Payload,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    pub addresses: Vec<String>,
    pub replies: Vec<ReplyRecord>,
    pub events: Vec<EventRecord>,
}

impl ReplayReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.replies.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Txt => Ok(self.render_txt()),
        }
    }

    fn render_txt(&self) -> String {
        let mut out = String::new();
        out.push_str("═══════════════════════════════════════════════\n");
        out.push_str("  Replay Summary\n");
        out.push_str("═══════════════════════════════════════════════\n");

        out.push_str(&format!("\n📤 Emitted addresses ({}):\n", self.addresses.len()));
        for (i, address) in self.addresses.iter().enumerate() {
            out.push_str(&format!("  {:>3}  {}\n", i + 1, address));
        }

        out.push_str(&format!(
            "\n📥 Replies: {} ok, {} failed, {} timed out\n",
            self.count(Outcome::Ok),
            self.count(Outcome::Failed),
            self.count(Outcome::Timeout)
        ));
        for reply in &self.replies {
            let mark = match reply.outcome {
                Outcome::Ok => "✓",
                _ => "✗",
            };
            out.push_str(&format!(
                "  {} #{} {} → {}\n",
                mark, reply.call, reply.target, reply.payload
            ));
        }

        out.push_str(&format!("\n📣 Events ({}):\n", self.events.len()));
        for event in &self.events {
            out.push_str(&format!("  {} {}\n", event.name, event.payload));
        }

        out
    }
}
