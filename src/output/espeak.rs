//! `espeak-ng` synthesis engine.
//!
//! One child process per utterance, text fed on stdin. Cancelling kills the
//! child, which stops audio at once.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::voice::Voice;
use super::SynthesisEngine;
use crate::config::SpeechConfig;
use crate::error::SynthesisError;

pub struct EspeakSynthesizer {
    program: String,
    rate: u32,
    voices: OnceCell<Vec<Voice>>,
    next_utterance: AtomicU64,
    /// Id and cancel handle of the utterance currently playing, if any.
    current: Mutex<Option<(u64, CancellationToken)>>,
}

impl EspeakSynthesizer {
    pub fn new(config: &SpeechConfig) -> Self {
        info!("Speech engine: {} at {} wpm", config.program, config.rate);
        Self {
            program: config.program.clone(),
            rate: config.rate,
            voices: OnceCell::new(),
            next_utterance: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    async fn load_voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(SynthesisError::Engine(format!(
                "{} --voices exited with {}",
                self.program, output.status
            )));
        }

        let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
        info!("Speech engine offers {} voices", voices.len());
        Ok(voices)
    }

    fn spawn_error(&self, e: std::io::Error) -> SynthesisError {
        if e.kind() == std::io::ErrorKind::NotFound {
            SynthesisError::Unavailable(format!("{} not found", self.program))
        } else {
            SynthesisError::Engine(format!("failed to run {}: {e}", self.program))
        }
    }

    fn install(&self, token: &CancellationToken) -> u64 {
        let id = self.next_utterance.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((id, token.clone()));
        if let Some((_, previous)) = previous {
            previous.cancel();
        }
        id
    }

    async fn play(&self, mut command: Command, text: &str, token: &CancellationToken) -> Result<(), SynthesisError> {
        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;

        let feed = async {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(text.as_bytes())
                    .await
                    .map_err(|e| SynthesisError::Engine(format!("failed to write text: {e}")))?;
                // stdin is dropped here; EOF starts playback
            }
            match child.wait().await {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(SynthesisError::Engine(format!("{} exited with {status}", self.program))),
                Err(e) => Err(SynthesisError::Engine(format!("failed to wait for {}: {e}", self.program))),
            }
        };

        tokio::select! {
            result = feed => return result,
            _ = token.cancelled() => {}
        }

        if let Err(e) = child.start_kill() {
            warn!("Failed to kill {}: {e}", self.program);
        }
        let _ = child.wait().await;
        debug!("Utterance cancelled");
        Ok(())
    }

    fn uninstall(&self, id: u64) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|(current_id, _)| *current_id == id) {
            *current = None;
        }
    }
}

#[async_trait]
impl SynthesisEngine for EspeakSynthesizer {
    async fn voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        self.voices
            .get_or_try_init(|| self.load_voices())
            .await
            .cloned()
    }

    async fn speak(&self, text: &str, voice: Option<&Voice>) -> Result<(), SynthesisError> {
        if text.trim().is_empty() {
            return Ok(());
        }

        let mut command = Command::new(&self.program);
        command.arg("-s").arg(self.rate.to_string());
        if let Some(voice) = voice {
            command.arg("-v").arg(&voice.id);
        }
        command
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let token = CancellationToken::new();
        let id = self.install(&token);
        let result = self.play(command, text, &token).await;
        self.uninstall(id);
        result
    }

    fn cancel(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some((_, token)) = current {
            token.cancel();
            info!("Speech cancelled");
        }
    }
}

/// Parse the table printed by `espeak-ng --voices`.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
///  5  hi              --/M      Hindi              inc/hi
/// ```
fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("Pty"))
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [_, lang, gender, name, ..] = fields.as_slice() else {
                return None;
            };
            let mut display = name.replace('_', " ");
            match gender.rsplit('/').next() {
                Some("F") => display.push_str(" (Female)"),
                Some("M") => display.push_str(" (Male)"),
                _ => {}
            }
            Some(Voice::new(*lang, display, *lang))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    const VOICES: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-gb           --/M      English_(Great_Britain) gmw/en            (en 2)
 5  en-us           --/F      English_(America)  gmw/en-US            (en 3)
 5  hi              --/M      Hindi              inc/hi
";

    #[test]
    fn parses_voice_table() {
        let voices = parse_voice_list(VOICES);
        assert_eq!(voices.len(), 4);
        assert_eq!(voices[0], Voice::new("af", "Afrikaans (Male)", "af"));
        assert_eq!(voices[1].name, "English (Great Britain) (Male)");
        assert_eq!(voices[2].name, "English (America) (Female)");
        assert_eq!(voices[3].lang, "hi");
    }

    #[test]
    fn ignores_noise_before_header() {
        let output = format!("some warning\n{VOICES}");
        assert_eq!(parse_voice_list(&output).len(), 4);
        assert!(parse_voice_list("").is_empty());
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let engine = EspeakSynthesizer::new(&SpeechConfig {
            program: "/nonexistent/espeak-ng".into(),
            ..SpeechConfig::default()
        });
        assert!(matches!(engine.voices().await, Err(SynthesisError::Unavailable(_))));
        assert!(matches!(engine.speak("hello", None).await, Err(SynthesisError::Unavailable(_))));
    }

    /// A stand-in engine binary running `body`.
    fn fake_engine(body: &str) -> (tempfile::TempDir, SpeechConfig) {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake-espeak");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = SpeechConfig {
            program: path.to_str().unwrap().into(),
            ..SpeechConfig::default()
        };
        (dir, config)
    }

    #[tokio::test]
    async fn cancel_stops_playback() {
        let (_dir, config) = fake_engine("cat > /dev/null\nexec sleep 30");
        let engine = Arc::new(EspeakSynthesizer::new(&config));

        let playing = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.speak("hello there", None).await }
        });

        let t0 = Instant::now();
        while engine.current.lock().unwrap().is_none() {
            assert!(t0.elapsed() < Duration::from_secs(2), "utterance never started");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        engine.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), playing)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Ok(()));
        assert!(engine.current.lock().unwrap().is_none());

        // nothing left to cancel
        engine.cancel();
        assert!(engine.current.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn finished_utterance_clears_current() {
        let (_dir, config) = fake_engine("cat > /dev/null");
        let engine = EspeakSynthesizer::new(&config);

        assert_eq!(engine.speak("hello", None).await, Ok(()));
        assert!(engine.current.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_engine_is_an_engine_error() {
        let (_dir, config) = fake_engine("cat > /dev/null\nexit 3");
        let engine = EspeakSynthesizer::new(&config);

        assert!(matches!(
            engine.speak("hello", None).await,
            Err(SynthesisError::Engine(_))
        ));
        assert!(engine.current.lock().unwrap().is_none());
    }

    #[test]
    fn cancel_when_silent_is_a_noop() {
        let engine = EspeakSynthesizer::new(&SpeechConfig::default());
        engine.cancel();
        engine.cancel();
    }
}
