//! Assistant session orchestration with state machine.
//!
//! IDLE → STARTING → SPEAKING (greeting) → LISTENING → THINKING → SPEAKING
//! → COOLDOWN → LISTENING → … and back to IDLE on `stop()` from anywhere.
//!
//! Each session owns a cancellation token. The loop races every suspension
//! point against it, and every state mutation is skipped once it is
//! cancelled, so a result that arrives after `stop()` cannot revive the
//! session it belonged to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{AssistantConfig, RecognitionErrorPolicy};
use crate::error::{CaptureError, StartError};
use crate::fetcher::ResponseFetcher;
use crate::input::SpeechInput;
use crate::notifier::Notify;
use crate::output::SpeechOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Listening,
    Thinking,
    Speaking,
    Cooldown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Starting => write!(f, "STARTING"),
            Self::Listening => write!(f, "LISTENING"),
            Self::Thinking => write!(f, "THINKING"),
            Self::Speaking => write!(f, "SPEAKING"),
            Self::Cooldown => write!(f, "COOLDOWN"),
        }
    }
}

/// Observable session state.
///
/// The listening and speaking flags are both derived from `phase`, so they
/// can never be true at the same time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    /// Last recognized utterance.
    pub transcript: String,
    /// Last reply from the endpoint.
    pub reply: String,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn is_listening(&self) -> bool {
        self.phase == Phase::Listening
    }

    pub fn is_speaking(&self) -> bool {
        self.phase == Phase::Speaking
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A session was already running or starting; nothing changed.
    AlreadyActive,
    /// `stop()` was called while the microphone request was pending.
    Cancelled,
}

/// Handle to the session of one running assistant.
#[derive(Clone)]
struct Live {
    id: u64,
    token: CancellationToken,
}

struct Inner {
    config: AssistantConfig,
    input: Arc<dyn SpeechInput>,
    output: SpeechOutput,
    fetcher: Arc<dyn ResponseFetcher>,
    notifier: Arc<dyn Notify>,
    state: watch::Sender<SessionState>,
    live: Mutex<Option<Live>>,
    next_id: AtomicU64,
}

/// The voice assistant: one push-to-talk conversation at a time.
///
/// Cheap to clone; clones control the same assistant.
#[derive(Clone)]
pub struct AssistantSession {
    inner: Arc<Inner>,
}

impl AssistantSession {
    pub fn new(
        config: AssistantConfig,
        input: Arc<dyn SpeechInput>,
        output: SpeechOutput,
        fetcher: Arc<dyn ResponseFetcher>,
        notifier: Arc<dyn Notify>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            inner: Arc::new(Inner {
                config,
                input,
                output,
                fetcher,
                notifier,
                state,
                live: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Start a session: request the microphone, then greet and listen in
    /// the background.
    ///
    /// Permission and capability failures are reported through the notifier
    /// and returned; the assistant stays idle.
    pub async fn start(&self) -> Result<StartOutcome, StartError> {
        let Some(session) = self.inner.claim() else {
            info!("Assistant already active");
            return Ok(StartOutcome::AlreadyActive);
        };

        // Frees the slot if this future is dropped mid-request.
        let mut pending = PendingStart {
            inner: &self.inner,
            session: &session,
            armed: true,
        };
        let acquired = tokio::select! {
            biased;
            _ = session.token.cancelled() => None,
            result = self.inner.input.acquire() => Some(result),
        };
        pending.armed = false;
        drop(pending);

        match acquired {
            None => {
                info!("Start cancelled while waiting for the microphone");
                return Ok(StartOutcome::Cancelled);
            }
            Some(Err(e)) => {
                self.inner.release(&session);
                self.inner.report(&e);
                return Err(e);
            }
            Some(Ok(())) => {}
        }

        let started = self.inner.update(&session, |s| {
            *s = SessionState {
                phase: Phase::Starting,
                ..SessionState::default()
            };
        });
        if !started {
            return Ok(StartOutcome::Cancelled);
        }

        info!("Assistant started (session {})", session.id);
        tokio::spawn(Arc::clone(&self.inner).run(session));
        Ok(StartOutcome::Started)
    }

    /// Stop immediately from any state. Idempotent.
    pub fn stop(&self) {
        self.inner.stop(None);
    }

    /// Stop if a session is running or starting, start otherwise. Returns
    /// whether the assistant is active afterwards.
    pub async fn toggle(&self) -> Result<bool, StartError> {
        if self.inner.is_live() {
            self.stop();
            return Ok(false);
        }
        Ok(self.start().await? != StartOutcome::Cancelled)
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }
}

struct PendingStart<'a> {
    inner: &'a Inner,
    session: &'a Live,
    armed: bool,
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.release(self.session);
        }
    }
}

impl Inner {
    /// Reserve the live slot for a new session, unless one is already there.
    fn claim(&self) -> Option<Live> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if live.is_some() {
            return None;
        }
        let session = Live {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        *live = Some(session.clone());
        Some(session)
    }

    fn release(&self, session: &Live) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if live.as_ref().is_some_and(|l| l.id == session.id) {
            *live = None;
        }
    }

    fn is_live(&self) -> bool {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Stop the live session, or only session `only` when given.
    fn stop(&self, only: Option<u64>) {
        let session = {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            match (live.as_ref(), only) {
                (Some(l), Some(id)) if l.id != id => None,
                _ => live.take(),
            }
        };
        let Some(session) = session else {
            debug!("Stop requested with no session running");
            return;
        };

        session.token.cancel();
        self.input.abort();
        self.output.cancel();

        self.state.send_if_modified(|s| {
            if s.phase == Phase::Idle {
                return false;
            }
            info!("State: {} → {}", s.phase, Phase::Idle);
            s.phase = Phase::Idle;
            true
        });
        info!("Assistant stopped (session {})", session.id);
    }

    fn report(&self, e: &StartError) {
        warn!("Failed to start assistant: {e}");
        match e {
            StartError::Permission(_) => self.notifier.notify(
                "Permission Required",
                "Please allow microphone access to use the voice assistant.",
            ),
            StartError::Unsupported(_) => self.notifier.notify(
                "Not Supported",
                "Speech recognition is not supported on this system.",
            ),
        }
    }

    /// Apply `f` unless `session` has been stopped. Returns whether the
    /// session is still live.
    fn update(&self, session: &Live, f: impl FnOnce(&mut SessionState)) -> bool {
        let mut live = true;
        self.state.send_if_modified(|s| {
            if session.token.is_cancelled() {
                live = false;
                return false;
            }
            let before = s.phase;
            f(s);
            if s.phase != before {
                info!("State: {before} → {}", s.phase);
            }
            true
        });
        live
    }

    fn enter(&self, session: &Live, phase: Phase) -> bool {
        self.update(session, |s| s.phase = phase)
    }

    async fn run(self: Arc<Self>, session: Live) {
        let greeting = self.config.greeting.clone();
        if !self.speak(&session, &greeting).await {
            return;
        }

        loop {
            let Some(outcome) = self.capture(&session).await else {
                break;
            };

            match outcome {
                Ok(transcript) => {
                    if !self.run_turn(&session, transcript).await {
                        break;
                    }
                }
                Err(CaptureError::NoSpeech) => debug!("No speech detected, listening again"),
                Err(CaptureError::Aborted) => debug!("Capture aborted, listening again"),
                Err(e) => match self.config.on_recognition_error {
                    RecognitionErrorPolicy::Retry => warn!("{e}, listening again"),
                    RecognitionErrorPolicy::Stop => {
                        warn!("{e}, ending session");
                        self.stop(Some(session.id));
                        break;
                    }
                },
            }

            if !self.cool_down(&session).await {
                break;
            }
        }

        debug!("Session {} loop finished", session.id);
    }

    /// One capture. `None` once the session is stopped.
    async fn capture(&self, session: &Live) -> Option<Result<String, CaptureError>> {
        if !self.enter(session, Phase::Listening) {
            return None;
        }

        let result = tokio::select! {
            biased;
            _ = session.token.cancelled() => return None,
            result = self.input.capture() => result,
        };

        if !self.enter(session, Phase::Cooldown) {
            return None;
        }

        Some(result.and_then(|t| {
            let t = t.trim();
            if t.is_empty() {
                Err(CaptureError::NoSpeech)
            } else {
                Ok(t.to_string())
            }
        }))
    }

    /// Transcript → reply → spoken reply. Returns whether the session is
    /// still live.
    async fn run_turn(&self, session: &Live, transcript: String) -> bool {
        info!("Heard: \"{transcript}\"");
        let recorded = self.update(session, |s| {
            s.transcript = transcript.clone();
            s.reply.clear();
            s.phase = Phase::Thinking;
        });
        if !recorded {
            return false;
        }

        let reply = tokio::select! {
            biased;
            _ = session.token.cancelled() => return false,
            reply = self.fetcher.fetch_reply(&transcript) => reply,
        };

        if !self.update(session, |s| s.reply = reply.clone()) {
            return false;
        }
        self.speak(session, &reply).await
    }

    /// Speak `text`. Synthesis failures end the utterance but not the
    /// session. Returns whether the session is still live.
    async fn speak(&self, session: &Live, text: &str) -> bool {
        if !self.enter(session, Phase::Speaking) {
            return false;
        }

        let result = tokio::select! {
            biased;
            _ = session.token.cancelled() => return false,
            result = self.output.speak(text) => result,
        };
        if let Err(e) = result {
            warn!("{e}");
        }

        self.enter(session, Phase::Cooldown)
    }

    /// Pause before listening again so we do not hear our own reply.
    async fn cool_down(&self, session: &Live) -> bool {
        if !self.enter(session, Phase::Cooldown) {
            return false;
        }
        tokio::select! {
            biased;
            _ = session.token.cancelled() => false,
            _ = tokio::time::sleep(self.config.resume_delay()) => true,
        }
    }
}
