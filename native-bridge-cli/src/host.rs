//! Console host
//!
//! Stand-ins for the device services a real host wires to the bridge. Speech is
//! printed and kept "busy" for a configured duration, recognition answers with
//! canned text after a delay, haptics and map updates are printed.

use crate::config::HostConfig;
use native_bridge::{
    Haptics, HostCapabilities, LogFacade, MapCenter, MapPosition, PropertyStore, SpeechInput,
    SpeechOutput,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub struct ConsoleSpeech {
    duration: Duration,
    busy_until: Mutex<Option<Instant>>,
}

impl SpeechOutput for ConsoleSpeech {
    fn speak(&self, text: &str, flush: bool) -> native_bridge::Result<()> {
        let now = Instant::now();
        let mut busy = self
            .busy_until
            .lock()
            .map_err(|_| native_bridge::BridgeError::HostFailure("speech state poisoned".into()))?;

        // Without flush the utterance queues behind whatever is playing
        let start = match *busy {
            Some(until) if !flush && until > now => until,
            _ => now,
        };
        *busy = Some(start + self.duration);

        println!("  🔊 {}{}", if flush { "(flush) " } else { "" }, text);
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.busy_until
            .lock()
            .map(|busy| busy.is_some_and(|until| until > Instant::now()))
            .unwrap_or(false)
    }
}

pub struct ConsoleRecognizer {
    text: String,
    delay: Duration,
}

impl SpeechInput for ConsoleRecognizer {
    fn start_recognizer(
        &self,
        on_result: Box<dyn FnOnce(native_bridge::Result<String>) + Send>,
    ) -> native_bridge::Result<()> {
        let text = self.text.clone();
        let delay = self.delay;
        println!("  🎤 listening...");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            println!("  🎤 heard: {text}");
            on_result(Ok(text));
        });
        Ok(())
    }
}

pub struct ConsoleMap;

impl MapPosition for ConsoleMap {
    fn map_center(&self, center: MapCenter) -> native_bridge::Result<()> {
        println!(
            "  🗺  center {:.5}, {:.5} floor {}{}",
            center.lat,
            center.lng,
            center.floor,
            if center.sync { " (sync)" } else { "" }
        );
        Ok(())
    }
}

pub struct ConsoleHaptics;

impl Haptics for ConsoleHaptics {
    fn vibrate(&self) -> native_bridge::Result<()> {
        println!("  📳 vibrate");
        Ok(())
    }
}

/// All console capabilities, configured from `[host]`
pub fn console_capabilities(config: &HostConfig) -> HostCapabilities {
    HostCapabilities::new()
        .speech_output(Arc::new(ConsoleSpeech {
            duration: Duration::from_millis(config.speaking_ms),
            busy_until: Mutex::new(None),
        }))
        .speech_input(Arc::new(ConsoleRecognizer {
            text: config.recognized_text.clone(),
            delay: Duration::from_millis(config.recognizer_ms),
        }))
        .map(Arc::new(ConsoleMap))
        .haptics(Arc::new(ConsoleHaptics))
        .system_log(Arc::new(LogFacade))
        .property(Arc::new(PropertyStore::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_busy_window() {
        let speech = ConsoleSpeech {
            duration: Duration::from_secs(60),
            busy_until: Mutex::new(None),
        };

        assert!(!speech.is_speaking());
        speech.speak("Welcome", false).unwrap();
        assert!(speech.is_speaking());
    }

    #[test]
    fn test_zero_duration_is_never_busy() {
        let speech = ConsoleSpeech {
            duration: Duration::ZERO,
            busy_until: Mutex::new(None),
        };

        speech.speak("Welcome", true).unwrap();
        assert!(!speech.is_speaking());
    }
}
