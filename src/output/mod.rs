//! Speech output: the synthesis engine seam and the wrapper the session
//! talks to.
//!
//! - `voice`: script detection and voice selection
//! - `espeak`: engine that drives an `espeak-ng` child process

pub mod espeak;
pub mod voice;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::SynthesisError;
use voice::{select_voice, Voice, VoicePreferences};

/// The system-wide synthesis engine. There is one per process and it plays
/// at most one utterance at a time.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Voices the engine can speak with, in engine order.
    async fn voices(&self) -> Result<Vec<Voice>, SynthesisError>;

    /// Speak `text`, completing when playback ends, fails or is cancelled.
    async fn speak(&self, text: &str, voice: Option<&Voice>) -> Result<(), SynthesisError>;

    /// Stop the current utterance immediately. No-op when silent.
    fn cancel(&self);
}

/// Renders reply text as speech through the shared engine.
#[derive(Clone)]
pub struct SpeechOutput {
    engine: Arc<dyn SynthesisEngine>,
    prefs: VoicePreferences,
}

impl SpeechOutput {
    pub fn new(engine: Arc<dyn SynthesisEngine>, prefs: VoicePreferences) -> Self {
        Self { engine, prefs }
    }

    /// Speak `text` with the voice best matching its script. Anything still
    /// playing is cut off first.
    pub async fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        self.engine.cancel();

        let voices = self.engine.voices().await?;
        let voice = select_voice(text, &voices, &self.prefs);
        debug!(
            "Speaking {} chars with voice {}",
            text.chars().count(),
            voice.map_or("<engine default>", |v| v.id.as_str())
        );

        self.engine.speak(text, voice).await
    }

    pub fn cancel(&self) {
        self.engine.cancel();
    }
}
