//! External command recognizer.
//!
//! Runs the configured argv once per capture. Whatever the command prints on
//! stdout is the transcript; empty output means nothing was said.

use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{expand_locales, SpeechInput};
use crate::config::RecognitionConfig;
use crate::error::{CaptureError, Error, StartError};

pub struct CommandRecognizer {
    args: Vec<String>,
    probe: Vec<String>,
    current: Mutex<Option<CancellationToken>>,
}

impl CommandRecognizer {
    pub fn new(config: &RecognitionConfig) -> Result<Self, Error> {
        if config.command.is_empty() {
            return Err(Error::Config("recognition.command must not be empty".into()));
        }

        let args = expand_locales(&config.command, &config.locales());
        info!("Recognizer command: {}", args.join(" "));

        Ok(Self {
            args,
            probe: config.permission_probe.clone(),
            current: Mutex::new(None),
        })
    }

    fn program(&self) -> &str {
        &self.args[0]
    }

    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        token
    }

    fn finish(&self) {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    async fn run_probe(&self) -> Result<(), StartError> {
        let Some((program, args)) = self.probe.split_first() else {
            return Ok(());
        };

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| StartError::Permission(format!("failed to run {program}: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(StartError::Permission(format!("{program} exited with {status}")))
        }
    }
}

#[async_trait]
impl SpeechInput for CommandRecognizer {
    async fn acquire(&self) -> Result<(), StartError> {
        let path = which::which(self.program()).map_err(|e| {
            StartError::Unsupported(format!("{} is not an executable program: {e}", self.program()))
        })?;
        debug!("Recognizer found at {}", path.display());
        self.run_probe().await
    }

    async fn capture(&self) -> Result<String, CaptureError> {
        let token = self.begin();

        let child = Command::new(self.program())
            .args(&self.args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let result = match child {
            Ok(child) => {
                tokio::select! {
                    output = child.wait_with_output() => match output {
                        Ok(output) => transcript_from(&output),
                        Err(e) => Err(CaptureError::Recognition(format!("failed to wait for recognizer: {e}"))),
                    },
                    // Dropping the wait future drops the child, which kills it.
                    _ = token.cancelled() => Err(CaptureError::Aborted),
                }
            }
            Err(e) => Err(CaptureError::Recognition(format!("failed to run {}: {e}", self.program()))),
        };

        self.finish();
        result
    }

    fn abort(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(token) = current {
            token.cancel();
            debug!("Capture aborted");
        }
    }
}

fn transcript_from(output: &std::process::Output) -> Result<String, CaptureError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.lines().next().unwrap_or_default().trim();
        return Err(CaptureError::Recognition(format!(
            "recognizer exited with {}: {detail}",
            output.status
        )));
    }

    let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if transcript.is_empty() {
        Err(CaptureError::NoSpeech)
    } else {
        Ok(transcript)
    }
}
