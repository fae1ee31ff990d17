//! Configuration loading and parsing

use anyhow::{Context, Result};
use native_bridge::BridgeConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Behavior of the simulated console host
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// How long a simulated utterance keeps the synthesizer busy
    #[serde(default = "default_speaking_ms")]
    pub speaking_ms: u64,
    /// Text the simulated recognizer "hears"
    #[serde(default = "default_recognized_text")]
    pub recognized_text: String,
    /// Delay before the simulated recognizer answers
    #[serde(default = "default_recognizer_ms")]
    pub recognizer_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            speaking_ms: default_speaking_ms(),
            recognized_text: default_recognized_text(),
            recognizer_ms: default_recognizer_ms(),
        }
    }
}

fn default_speaking_ms() -> u64 {
    1500
}

fn default_recognized_text() -> String {
    "where is the nearest elevator".to_string()
}

fn default_recognizer_ms() -> u64 {
    300
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Txt,
    Json,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate(&config).with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

fn validate(config: &AppConfig) -> Result<()> {
    let bridge = &config.bridge;
    if bridge.scheme.is_empty() || !bridge.scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
        anyhow::bail!("bridge.scheme must be non-empty and alphanumeric: {:?}", bridge.scheme);
    }
    if bridge.callback_key == bridge.cache_buster_key {
        anyhow::bail!("bridge.callback_key and bridge.cache_buster_key must differ");
    }
    if bridge.callback_timeout_ms == 0 {
        anyhow::bail!("bridge.callback_timeout_ms must be positive");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use native_bridge::AckMode;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [bridge]
            ack_mode = "immediate"
            callback_timeout_ms = 5000

            [host]
            speaking_ms = 200

            [output]
            format = "json"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.bridge.ack_mode, AckMode::Immediate);
        assert_eq!(config.bridge.callback_timeout_ms, 5000);
        assert_eq!(config.bridge.scheme, "native");
        assert_eq!(config.host.speaking_ms, 200);
        assert_eq!(config.host.recognizer_ms, 300);
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[bridge]\nscheme = \"hulop\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.bridge.scheme, "hulop");
        assert_eq!(config.output.format, OutputFormat::Txt);
    }

    #[test]
    fn test_load_config_rejects_bad_scheme() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[bridge]\nscheme = \"na tive\"").unwrap();

        assert!(load_config(file.path()).is_err());
    }
}
