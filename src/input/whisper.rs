//! On-device recognition: cpal capture + whisper.cpp transcription.
//!
//! Loads a GGML model once, then per capture records one utterance and
//! transcribes it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::recorder::{probe_device, record_utterance};
use super::SpeechInput;
use crate::config::{RecognitionConfig, WhisperConfig};
use crate::error::{CaptureError, Error, StartError};

pub struct WhisperRecognizer {
    ctx: Arc<WhisperContext>,
    config: WhisperConfig,
    language: String,
    abort: Mutex<Option<Arc<AtomicBool>>>,
}

impl WhisperRecognizer {
    /// Load the Whisper GGML model. Blocking.
    pub fn load(config: &RecognitionConfig) -> Result<Self, Error> {
        let model_path = find_model(&config.whisper.model)?;
        let path = model_path
            .to_str()
            .ok_or_else(|| Error::Config(format!("model path is not UTF-8: {}", model_path.display())))?;

        info!("Loading Whisper model from {path}");
        let t0 = Instant::now();
        let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| Error::Config(format!("failed to load Whisper model: {e}")))?;
        info!("Whisper model loaded in {}ms", t0.elapsed().as_millis());

        let language = whisper_language(&config.locales());
        info!("Whisper language: {language}");

        Ok(Self {
            ctx: Arc::new(ctx),
            config: config.whisper.clone(),
            language,
            abort: Mutex::new(None),
        })
    }

    fn begin(&self) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        let previous = self
            .abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&flag));
        if let Some(previous) = previous {
            previous.store(true, Ordering::Relaxed);
        }
        flag
    }
}

#[async_trait]
impl SpeechInput for WhisperRecognizer {
    async fn acquire(&self) -> Result<(), StartError> {
        tokio::task::spawn_blocking(probe_device)
            .await
            .unwrap_or_else(|e| Err(StartError::Unsupported(format!("device probe panicked: {e}"))))
    }

    async fn capture(&self) -> Result<String, CaptureError> {
        let abort = self.begin();

        let samples = tokio::task::spawn_blocking({
            let config = self.config.clone();
            let abort = Arc::clone(&abort);
            move || record_utterance(&config, &abort)
        })
        .await
        .map_err(|e| CaptureError::Recognition(format!("capture task failed: {e}")))??;

        let text = tokio::task::spawn_blocking({
            let ctx = Arc::clone(&self.ctx);
            let language = self.language.clone();
            move || transcribe(&ctx, &language, &samples)
        })
        .await
        .map_err(|e| CaptureError::Recognition(format!("transcription task failed: {e}")))??;

        if abort.load(Ordering::Relaxed) {
            return Err(CaptureError::Aborted);
        }
        if text.is_empty() {
            return Err(CaptureError::NoSpeech);
        }
        Ok(text)
    }

    fn abort(&self) {
        let current = self.abort.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(flag) = current {
            flag.store(true, Ordering::Relaxed);
            debug!("Capture aborted");
        }
    }
}

/// Transcribe audio samples (f32, mono) to text.
fn transcribe(ctx: &WhisperContext, language: &str, samples: &[f32]) -> Result<String, CaptureError> {
    let t0 = Instant::now();

    let mut state = ctx
        .create_state()
        .map_err(|e| CaptureError::Recognition(format!("failed to create whisper state: {e}")))?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_language(Some(language));
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_single_segment(true);
    params.set_no_context(true);

    state
        .full(params, samples)
        .map_err(|e| CaptureError::Recognition(format!("whisper inference failed: {e}")))?;

    let mut text = String::new();
    for i in 0..state.full_n_segments() {
        if let Some(segment) = state.get_segment(i) {
            if let Ok(segment_text) = segment.to_str_lossy() {
                let trimmed = segment_text.trim();
                if !trimmed.is_empty() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(trimmed);
                }
            }
        }
    }

    info!("Transcribed in {}ms: \"{text}\"", t0.elapsed().as_millis());
    Ok(text)
}

/// The language whisper should decode: the shared language of all locales,
/// or `auto` when they disagree.
fn whisper_language(locales: &[String]) -> String {
    let mut languages = locales
        .iter()
        .map(|l| l.split(['-', '_']).next().unwrap_or_default().to_ascii_lowercase());
    match languages.next() {
        Some(first) if !first.is_empty() && languages.all(|l| l == first) => first,
        _ => "auto".into(),
    }
}

/// Find the GGML model file.
fn find_model(model_name: &str) -> Result<PathBuf, Error> {
    let direct = PathBuf::from(model_name);
    if direct.is_file() {
        return Ok(direct);
    }

    let filename = format!("ggml-{}.bin", model_name.replace('/', "-"));
    let search_dirs: Vec<PathBuf> = [
        std::env::current_dir().ok(),
        dirs::cache_dir().map(|c| c.join("whisper")),
        dirs::data_dir().map(|d| d.join("slogi")),
    ]
    .into_iter()
    .flatten()
    .collect();

    search_dirs
        .iter()
        .map(|dir| dir.join(&filename))
        .find(|path| path.is_file())
        .ok_or_else(|| Error::Config(format!("Whisper model {filename} not found in {search_dirs:?}")))
}
