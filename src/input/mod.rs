//! Speech input: single-shot capture of one utterance.
//!
//! - `command`: runs an external recognizer per capture
//! - `whisper` (feature `whisper`): cpal capture + whisper.cpp transcription

pub mod command;
#[cfg(feature = "whisper")]
mod recorder;
#[cfg(feature = "whisper")]
pub mod whisper;

use async_trait::async_trait;

use crate::error::{CaptureError, StartError};

/// A speech recognizer that yields one transcript per `capture` call.
///
/// Locale handling belongs to the implementation; the session only sees
/// transcripts and errors.
#[async_trait]
pub trait SpeechInput: Send + Sync {
    /// Check that recognition is available and the microphone may be used.
    async fn acquire(&self) -> Result<(), StartError>;

    /// Capture exactly one utterance.
    async fn capture(&self) -> Result<String, CaptureError>;

    /// Abort the capture in flight, discarding its result. No-op when idle.
    fn abort(&self);
}

/// Replace `{locale}` and `{locales}` in a command line.
pub(crate) fn expand_locales(args: &[String], locales: &[String]) -> Vec<String> {
    let primary = locales.first().map(String::as_str).unwrap_or_default();
    let all = locales.join(",");
    args.iter()
        .map(|arg| arg.replace("{locales}", &all).replace("{locale}", primary))
        .collect()
}
