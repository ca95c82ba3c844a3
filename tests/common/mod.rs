//! Scripted collaborators for driving an `AssistantSession` in tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};

use slogi::config::AssistantConfig;
use slogi::fetcher::ResponseFetcher;
use slogi::input::SpeechInput;
use slogi::notifier::Notify;
use slogi::output::voice::{Voice, VoicePreferences};
use slogi::output::{SpeechOutput, SynthesisEngine};
use slogi::{AssistantSession, CaptureError, StartError, SynthesisError};

/// Fail the test instead of hanging when `fut` never completes.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(30), fut)
        .await
        .expect("timed out")
}

async fn wait_count(counter: &watch::Sender<usize>, n: usize) {
    let mut rx = counter.subscribe();
    within(rx.wait_for(|c| *c >= n)).await.expect("counter dropped");
}

/// One scripted capture result.
pub enum Step {
    Reply(Result<String, CaptureError>),
    /// Resolves after the given time, as a real recognizer would.
    Delayed(Duration, Result<String, CaptureError>),
    /// Resolves when the test sends the result.
    Gate(oneshot::Receiver<Result<String, CaptureError>>),
}

pub fn heard(text: &str) -> Step {
    Step::Reply(Ok(text.to_string()))
}

/// Recognizer that plays back a script. Once the script runs out every
/// capture stays pending until aborted.
pub struct ScriptedInput {
    script: Mutex<VecDeque<Step>>,
    acquire_result: Result<(), StartError>,
    acquire_gate: Mutex<Option<oneshot::Receiver<()>>>,
    acquires: watch::Sender<usize>,
    captures: watch::Sender<usize>,
    aborts: AtomicUsize,
}

impl ScriptedInput {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            acquire_result: Ok(()),
            acquire_gate: Mutex::new(None),
            acquires: watch::Sender::new(0),
            captures: watch::Sender::new(0),
            aborts: AtomicUsize::new(0),
        }
    }

    pub fn denied(error: StartError) -> Self {
        Self {
            acquire_result: Err(error),
            ..Self::new([])
        }
    }

    /// Hold `acquire` until the returned sender fires or is dropped.
    pub fn gate_acquire(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.acquire_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn acquires(&self) -> usize {
        *self.acquires.borrow()
    }

    pub fn captures(&self) -> usize {
        *self.captures.borrow()
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub async fn wait_acquires(&self, n: usize) {
        wait_count(&self.acquires, n).await;
    }

    pub async fn wait_captures(&self, n: usize) {
        wait_count(&self.captures, n).await;
    }
}

#[async_trait]
impl SpeechInput for ScriptedInput {
    async fn acquire(&self) -> Result<(), StartError> {
        self.acquires.send_modify(|n| *n += 1);
        let gate = self.acquire_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.acquire_result.clone()
    }

    async fn capture(&self) -> Result<String, CaptureError> {
        self.captures.send_modify(|n| *n += 1);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(result)) => result,
            Some(Step::Delayed(delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            Some(Step::Gate(rx)) => match rx.await {
                Ok(result) => result,
                Err(_) => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Synthesis engine that records what it was asked to say.
pub struct RecordingEngine {
    voices: Vec<Voice>,
    /// Keep "playing" until cancelled instead of finishing at once.
    hold: bool,
    fail: bool,
    playback: Duration,
    spoken: watch::Sender<Vec<(String, Option<String>)>>,
    playing: watch::Sender<bool>,
    cancels: AtomicUsize,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            voices: vec![
                Voice::new("hi", "Hindi (Female)", "hi"),
                Voice::new("en-us", "English (America) (Female)", "en-us"),
            ],
            hold: false,
            fail: false,
            playback: Duration::ZERO,
            spoken: watch::Sender::new(Vec::new()),
            playing: watch::Sender::new(false),
            cancels: AtomicUsize::new(0),
        }
    }

    pub fn holding() -> Self {
        Self {
            hold: true,
            ..Self::new()
        }
    }

    /// Every utterance takes `playback` to finish.
    pub fn with_playback(playback: Duration) -> Self {
        Self {
            playback,
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.borrow().iter().map(|(text, _)| text.clone()).collect()
    }

    pub fn voice_ids(&self) -> Vec<Option<String>> {
        self.spoken.borrow().iter().map(|(_, voice)| voice.clone()).collect()
    }

    pub fn is_playing(&self) -> bool {
        *self.playing.borrow()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub async fn wait_spoken(&self, n: usize) {
        let mut rx = self.spoken.subscribe();
        within(rx.wait_for(|s| s.len() >= n)).await.expect("engine dropped");
    }

    pub async fn wait_playing(&self) {
        let mut rx = self.playing.subscribe();
        within(rx.wait_for(|p| *p)).await.expect("engine dropped");
    }
}

#[async_trait]
impl SynthesisEngine for RecordingEngine {
    async fn voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        Ok(self.voices.clone())
    }

    async fn speak(&self, text: &str, voice: Option<&Voice>) -> Result<(), SynthesisError> {
        self.spoken
            .send_modify(|s| s.push((text.to_string(), voice.map(|v| v.id.clone()))));
        if self.fail {
            return Err(SynthesisError::Engine("no audio device".into()));
        }
        if self.hold {
            self.playing.send_replace(true);
            std::future::pending::<()>().await;
        }
        if !self.playback.is_zero() {
            tokio::time::sleep(self.playback).await;
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.playing.send_replace(false);
    }
}

/// Fetcher that answers every utterance with the same reply.
pub struct StaticFetcher {
    reply: String,
    delay: Duration,
    utterances: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: Duration::ZERO,
            utterances: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(reply: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(reply)
        }
    }

    pub fn utterances(&self) -> Vec<String> {
        self.utterances.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseFetcher for StaticFetcher {
    async fn fetch_reply(&self, utterance: &str) -> String {
        self.utterances.lock().unwrap().push(utterance.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<(String, String)> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notify for RecordingNotifier {
    fn notify(&self, summary: &str, body: &str) {
        self.notices
            .lock()
            .unwrap()
            .push((summary.to_string(), body.to_string()));
    }
}

pub const GREETING: &str = "Hello, how can I help?";

pub fn test_config() -> AssistantConfig {
    AssistantConfig {
        greeting: GREETING.into(),
        ..AssistantConfig::default()
    }
}

/// A session wired to scripted collaborators.
pub struct Harness {
    pub session: AssistantSession,
    pub input: Arc<ScriptedInput>,
    pub engine: Arc<RecordingEngine>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(input: ScriptedInput, engine: RecordingEngine, fetcher: Arc<dyn ResponseFetcher>) -> Self {
        Self::with_config(test_config(), input, engine, fetcher)
    }

    pub fn with_config(
        config: AssistantConfig,
        input: ScriptedInput,
        engine: RecordingEngine,
        fetcher: Arc<dyn ResponseFetcher>,
    ) -> Self {
        let input = Arc::new(input);
        let engine = Arc::new(engine);
        let notifier = Arc::new(RecordingNotifier::default());
        let output = SpeechOutput::new(engine.clone(), VoicePreferences::default());
        let session = AssistantSession::new(config, input.clone(), output, fetcher, notifier.clone());
        Self {
            session,
            input,
            engine,
            notifier,
        }
    }

    pub async fn wait_phase(&self, pred: impl FnMut(&slogi::SessionState) -> bool) {
        let mut rx = self.session.subscribe();
        within(rx.wait_for(pred)).await.expect("session dropped");
    }
}
