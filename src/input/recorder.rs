//! Single-utterance microphone capture with cpal.
//!
//! The stream is opened per capture and dropped as soon as the utterance
//! ends, so the microphone is only held while listening. Blocking; run it
//! on `spawn_blocking`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tracing::{debug, info, warn};

use crate::config::WhisperConfig;
use crate::error::{CaptureError, StartError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Check that an input device exists and can be queried.
pub fn probe_device() -> Result<(), StartError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| StartError::Unsupported("no input audio device available".into()))?;

    device
        .default_input_config()
        .map_err(|e| StartError::Permission(format!("cannot open input device: {e}")))?;

    info!(
        "Using audio device: {}",
        device.name().unwrap_or_else(|_| "unknown".into())
    );
    Ok(())
}

struct Utterance {
    buffer: Vec<f32>,
    max_samples: usize,
    speech_started: bool,
    silence_start: Option<Instant>,
    done: bool,
}

/// Record until trailing silence after speech, the no-speech timeout, the
/// max duration, or `abort` is raised.
pub fn record_utterance(config: &WhisperConfig, abort: &AtomicBool) -> Result<Vec<f32>, CaptureError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| CaptureError::Recognition("no input audio device available".into()))?;

    let stream_config = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let max_samples = (config.max_utterance_duration * f64::from(config.sample_rate)) as usize;
    let shared = Arc::new(Mutex::new(Utterance {
        buffer: Vec::with_capacity(max_samples),
        max_samples,
        speech_started: false,
        silence_start: None,
        done: false,
    }));

    let threshold = config.silence_threshold;
    let silence_duration = config.silence_duration;
    let callback_state = Arc::clone(&shared);

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mut u = callback_state.lock().unwrap_or_else(PoisonError::into_inner);
                if u.done {
                    return;
                }

                let remaining = u.max_samples.saturating_sub(u.buffer.len());
                let to_copy = data.len().min(remaining);
                u.buffer.extend_from_slice(&data[..to_copy]);
                if u.buffer.len() >= u.max_samples {
                    debug!("Max utterance duration reached");
                    u.done = true;
                    return;
                }

                if rms_energy(data) >= threshold {
                    u.speech_started = true;
                    u.silence_start = None;
                } else if u.speech_started {
                    let since = *u.silence_start.get_or_insert_with(Instant::now);
                    if since.elapsed().as_secs_f64() >= silence_duration {
                        debug!("Trailing silence for {silence_duration}s, utterance complete");
                        u.done = true;
                    }
                }
            },
            move |err| {
                warn!("Audio stream error: {err}");
            },
            None,
        )
        .map_err(|e| CaptureError::Recognition(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| CaptureError::Recognition(format!("failed to start audio stream: {e}")))?;

    let started = Instant::now();
    loop {
        std::thread::sleep(POLL_INTERVAL);

        if abort.load(Ordering::Relaxed) {
            return Err(CaptureError::Aborted);
        }

        let u = shared.lock().unwrap_or_else(PoisonError::into_inner);
        if u.done {
            break;
        }
        if !u.speech_started && started.elapsed().as_secs_f64() >= config.no_speech_timeout {
            return Err(CaptureError::NoSpeech);
        }
    }
    drop(stream);

    let samples = std::mem::take(&mut shared.lock().unwrap_or_else(PoisonError::into_inner).buffer);
    let duration = samples.len() as f64 / f64::from(config.sample_rate);
    info!("Captured {duration:.1}s of audio ({} samples)", samples.len());
    Ok(samples)
}

/// Calculate RMS energy of audio samples.
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
