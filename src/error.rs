//! Error types for the assistant.
//!
//! Only [`StartError`] ever reaches the user. Capture, fetch and synthesis
//! failures are absorbed inside the session loop.

use thiserror::Error;

/// Result type alias for startup plumbing.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while wiring the assistant together.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Session could not start
    #[error(transparent)]
    Start(#[from] StartError),
}

/// Fatal, pre-session failures. Reported to the user; the session stays idle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("microphone permission denied: {0}")]
    Permission(String),

    #[error("speech recognition unsupported: {0}")]
    Unsupported(String),
}

/// Outcome of a single capture attempt that produced no transcript.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Nothing was said before the recognizer gave up.
    #[error("no speech detected")]
    NoSpeech,

    #[error("recognition failed: {0}")]
    Recognition(String),

    /// The capture was aborted from outside.
    #[error("capture aborted")]
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("speech synthesis unavailable: {0}")]
    Unavailable(String),

    #[error("speech synthesis failed: {0}")]
    Engine(String),
}

/// Reasons a reply request failed. Never leaves the fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
