//! slogi: push-to-talk voice assistant.
//!
//! Listens for one utterance, asks the reply endpoint, speaks the answer and
//! listens again until stopped.

pub mod api;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod hotkey;
pub mod input;
pub mod notifier;
pub mod output;
pub mod session;

pub use error::{CaptureError, Error, Result, StartError, SynthesisError};
pub use session::{AssistantSession, Phase, SessionState, StartOutcome};
