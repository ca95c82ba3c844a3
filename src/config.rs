//! Configuration management for slogi.
//!
//! Loads config from a YAML file in standard locations. Every section has
//! defaults, so an empty or partial file is valid.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// What the session does when the recognizer fails with anything other
/// than "no speech".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionErrorPolicy {
    /// Treat it like "no speech": wait, then listen again.
    #[default]
    Retry,
    /// End the session.
    Stop,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub greeting: String,
    /// Pause between the end of a reply and the next capture, so the
    /// recognizer does not pick up the tail of our own playback.
    pub resume_delay_ms: u64,
    pub on_recognition_error: RecognitionErrorPolicy,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            greeting: "Hey! I'm Slogi. Main aapki kaise madad kar sakta hoon?".into(),
            resume_delay_ms: 500,
            on_recognition_error: RecognitionErrorPolicy::Retry,
        }
    }
}

impl AssistantConfig {
    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerBackend {
    #[default]
    Command,
    Whisper,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub backend: RecognizerBackend,
    pub locale: String,
    pub fallback_locales: Vec<String>,
    /// External recognizer argv. `{locale}` and `{locales}` are substituted.
    pub command: Vec<String>,
    /// Optional argv run once at start; a non-zero exit means the
    /// microphone is not accessible.
    pub permission_probe: Vec<String>,
    pub whisper: WhisperConfig,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            backend: RecognizerBackend::Command,
            locale: "hi-IN".into(),
            fallback_locales: vec!["en-IN".into(), "en-US".into()],
            command: vec![
                "slogi-listen".into(),
                "--languages".into(),
                "{locales}".into(),
            ],
            permission_probe: vec![],
            whisper: WhisperConfig::default(),
        }
    }
}

impl RecognitionConfig {
    /// Primary locale followed by the fallbacks, without duplicates.
    pub fn locales(&self) -> Vec<String> {
        let mut locales = vec![self.locale.clone()];
        for locale in &self.fallback_locales {
            if !locales.contains(locale) {
                locales.push(locale.clone());
            }
        }
        locales
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub model: String,
    pub sample_rate: u32,
    pub silence_threshold: f32,
    /// Seconds of trailing silence that end an utterance.
    pub silence_duration: f64,
    /// Seconds of initial silence after which the capture reports no speech.
    pub no_speech_timeout: f64,
    pub max_utterance_duration: f64,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: "large-v3-turbo".into(),
            sample_rate: 16000,
            silence_threshold: 0.01,
            silence_duration: 1.2,
            no_speech_timeout: 8.0,
            max_utterance_duration: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub program: String,
    /// Words per minute.
    pub rate: u32,
    pub default_language: String,
    pub region: String,
    pub voice_name_hint: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            program: "espeak-ng".into(),
            rate: 175,
            default_language: "en".into(),
            region: "IN".into(),
            voice_name_hint: Some("Female".into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub api_key: String,
    /// No timeout unless set; the user can always stop the session.
    pub timeout_secs: Option<u64>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321/functions/v1/slogi-assistant".into(),
            api_key: String::new(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub notifications: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            notifications: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8768,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub enabled: bool,
    pub combo: Vec<String>,
    pub alt_combos: Vec<Vec<String>>,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            combo: vec!["KEY_LEFTMETA".into(), "KEY_S".into()],
            alt_combos: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub assistant: AssistantConfig,
    pub recognition: RecognitionConfig,
    pub speech: SpeechConfig,
    pub endpoint: EndpointConfig,
    pub feedback: FeedbackConfig,
    pub api: ApiConfig,
    pub hotkey: HotkeyConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./slogi.yaml
    /// 2. ~/.config/slogi/config.yaml
    /// 3. /etc/slogi/config.yaml
    ///
    /// `SLOGI_ENDPOINT_URL` and `SLOGI_API_KEY` override the endpoint section.
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = Self::load_file(path);
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    fn load_file(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("slogi.yaml")),
                dirs::config_dir().map(|c| c.join("slogi/config.yaml")),
                Some(PathBuf::from("/etc/slogi/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        // serde_yml rejects an empty document; treat it as "all defaults".
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(contents)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SLOGI_ENDPOINT_URL").filter(|v| !v.is_empty()) {
            self.endpoint.url = url;
        }
        if let Some(key) = lookup("SLOGI_API_KEY").filter(|v| !v.is_empty()) {
            self.endpoint.api_key = key;
        }
    }
}
