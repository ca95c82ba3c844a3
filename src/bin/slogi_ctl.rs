//! slogi-ctl: drive a running slogi service over its control API.
//!
//! Prints the current state, or starts/stops/toggles the assistant. Exits
//! non-zero when the service is unreachable or reports an error.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Client;

use slogi::api::{ControlResponse, StatusResponse};

#[derive(Parser, Debug)]
#[command(name = "slogi-ctl", about = "Control a running slogi assistant")]
struct Args {
    /// Control API port
    #[arg(short, long, default_value_t = 8768)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show phase, last transcript and last reply
    Status,
    /// Start listening
    Start,
    /// Stop listening and speaking
    Stop,
    /// Start if idle, stop otherwise
    Toggle,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let base = format!("http://127.0.0.1:{}", args.port);

    // Start may wait on a microphone prompt, so no overall timeout here.
    let client = Client::builder()
        .connect_timeout(Duration::from_millis(300))
        .build()
        .unwrap_or_else(|_| Client::new());

    let result = match args.command {
        Command::Status => status(&client, &base).await,
        Command::Start => control(&client, &base, "start").await,
        Command::Stop => control(&client, &base, "stop").await,
        Command::Toggle => control(&client, &base, "toggle").await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("slogi-ctl: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn status(client: &Client, base: &str) -> Result<(), String> {
    let status: StatusResponse = client
        .get(format!("{base}/status"))
        .send()
        .await
        .map_err(|e| format!("slogi is not reachable at {base}: {e}"))?
        .json()
        .await
        .map_err(|e| format!("bad status response: {e}"))?;

    println!("{}", status.phase);
    if !status.transcript.is_empty() {
        println!("heard:   {}", status.transcript);
    }
    if !status.response.is_empty() {
        println!("replied: {}", status.response);
    }
    Ok(())
}

async fn control(client: &Client, base: &str, action: &str) -> Result<(), String> {
    let response: ControlResponse = client
        .post(format!("{base}/{action}"))
        .send()
        .await
        .map_err(|e| format!("slogi is not reachable at {base}: {e}"))?
        .json()
        .await
        .map_err(|e| format!("bad {action} response: {e}"))?;

    match response.error {
        Some(error) => Err(error),
        None => {
            println!("{}", response.status);
            Ok(())
        }
    }
}
