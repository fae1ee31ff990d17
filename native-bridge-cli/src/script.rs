//! Replay scripts
//!
//! A replay script is a TOML list of calls the content side would make, plus the
//! event names it listens on:
//!
//! ```toml
//! listen = ["onSpeaking"]
//!
//! [[call]]
//! component = "SpeechSynthesizer"
//! operation = "speak"
//! params = { text = "Welcome", flush = true }
//!
//! [[call]]
//! component = "SpeechSynthesizer"
//! operation = "isSpeaking"
//! reply = true
//! ```

use anyhow::{Context, Result};
use native_bridge::Params;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayScript {
    /// Event names to register listeners for before any call
    #[serde(default)]
    pub listen: Vec<String>,
    #[serde(default, rename = "call")]
    pub calls: Vec<ScriptCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptCall {
    pub component: String,
    pub operation: String,
    #[serde(default)]
    pub params: toml::Table,
    /// Register a one-shot callback and wait for it
    #[serde(default)]
    pub reply: bool,
}

impl ScriptCall {
    /// Parameters in document order, as the strings a script would pass
    pub fn params(&self) -> Params {
        self.params
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

pub fn load_script(path: &Path) -> Result<ReplayScript> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay script: {:?}", path))?;

    let script: ReplayScript = toml::from_str(&content)
        .with_context(|| format!("Failed to parse replay script: {:?}", path))?;

    Ok(script)
}
