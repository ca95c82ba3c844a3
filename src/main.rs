//! slogi: push-to-talk voice assistant service.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use slogi::config::{Config, RecognizerBackend};
use slogi::fetcher::HttpResponseFetcher;
use slogi::hotkey::{self, HotkeyMonitor};
use slogi::input::command::CommandRecognizer;
use slogi::input::SpeechInput;
use slogi::notifier::DesktopNotifier;
use slogi::output::espeak::EspeakSynthesizer;
use slogi::output::voice::VoicePreferences;
use slogi::output::SpeechOutput;
use slogi::{api, AssistantSession, Error};

#[derive(Parser, Debug)]
#[command(name = "slogi", about = "Push-to-talk voice assistant")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start listening right away instead of waiting for the hotkey
    #[arg(long)]
    start: bool,

    /// Disable the global hotkey
    #[arg(long)]
    no_hotkey: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("slogi starting");

    let config = Config::load(args.config.as_deref());
    info!("Recognition: {:?} ({})", config.recognition.backend, config.recognition.locales().join(", "));

    let input = build_input(&config).await?;
    let engine = Arc::new(EspeakSynthesizer::new(&config.speech));
    let output = SpeechOutput::new(engine, VoicePreferences::from(&config.speech));
    let fetcher = Arc::new(HttpResponseFetcher::new(&config.endpoint)?);
    let notifier = Arc::new(DesktopNotifier::new(config.feedback.notifications));

    let session = AssistantSession::new(config.assistant.clone(), input, output, fetcher, notifier);

    if config.api.enabled {
        api::start_api(session.clone(), config.api.port).await;
    }

    if config.hotkey.enabled && !args.no_hotkey {
        let (hotkey_tx, hotkey_rx) = mpsc::channel::<()>(16);
        tokio::spawn(HotkeyMonitor::new(&config.hotkey, hotkey_tx).run());
        tokio::spawn(hotkey::toggle_on_press(hotkey_rx, session.clone()));
    }

    if args.start {
        let session = session.clone();
        tokio::spawn(async move {
            if let Err(e) = session.start().await {
                warn!("Could not start assistant: {e}");
            }
        });
    }

    info!("Service ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    session.stop();
    Ok(())
}

async fn build_input(config: &Config) -> Result<Arc<dyn SpeechInput>, Error> {
    match config.recognition.backend {
        RecognizerBackend::Command => Ok(Arc::new(CommandRecognizer::new(&config.recognition)?)),
        #[cfg(feature = "whisper")]
        RecognizerBackend::Whisper => {
            let recognition = config.recognition.clone();
            let recognizer = tokio::task::spawn_blocking(move || {
                slogi::input::whisper::WhisperRecognizer::load(&recognition)
            })
            .await
            .map_err(|e| Error::Config(format!("Whisper model loading failed: {e}")))??;
            Ok(Arc::new(recognizer))
        }
        #[cfg(not(feature = "whisper"))]
        RecognizerBackend::Whisper => Err(Error::Config(
            "recognition.backend is whisper but slogi was built without the `whisper` feature".into(),
        )),
    }
}
