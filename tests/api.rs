mod common;

use std::sync::Arc;

use reqwest::Client;

use common::*;
use slogi::api::{router, ControlResponse, StatusResponse};
use slogi::StartError;

async fn serve(h: &Harness) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(h.session.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn status(client: &Client, base: &str) -> StatusResponse {
    client
        .get(format!("{base}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn post(client: &Client, base: &str, action: &str) -> ControlResponse {
    client
        .post(format!("{base}/{action}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn start_status_stop_over_http() {
    let h = Harness::new(
        ScriptedInput::new([heard("what time is it")]),
        RecordingEngine::new(),
        Arc::new(StaticFetcher::new("It is noon")),
    );
    let base = serve(&h).await;
    let client = Client::new();

    let idle = status(&client, &base).await;
    assert_eq!(idle.phase, "IDLE");
    assert!(!idle.is_active);

    let started = post(&client, &base, "start").await;
    assert_eq!(started.status, "started");
    assert_eq!(started.error, None);

    h.input.wait_captures(2).await;
    let listening = status(&client, &base).await;
    assert_eq!(
        listening,
        StatusResponse {
            phase: "LISTENING".into(),
            is_active: true,
            is_listening: true,
            is_speaking: false,
            transcript: "what time is it".into(),
            response: "It is noon".into(),
        }
    );

    assert_eq!(post(&client, &base, "start").await.status, "already_active");

    assert_eq!(post(&client, &base, "stop").await.status, "stopped");
    let stopped = status(&client, &base).await;
    assert_eq!(stopped.phase, "IDLE");
    assert!(!stopped.is_listening && !stopped.is_speaking);
    assert_eq!(stopped.response, "It is noon");
}

#[tokio::test]
async fn toggle_over_http() {
    let h = Harness::new(
        ScriptedInput::new([]),
        RecordingEngine::new(),
        Arc::new(StaticFetcher::new("unused")),
    );
    let base = serve(&h).await;
    let client = Client::new();

    assert_eq!(post(&client, &base, "toggle").await.status, "started");
    h.input.wait_captures(1).await;
    assert_eq!(post(&client, &base, "toggle").await.status, "stopped");
    assert!(!status(&client, &base).await.is_active);
}

#[tokio::test]
async fn start_failure_is_reported() {
    let h = Harness::new(
        ScriptedInput::denied(StartError::Permission("blocked".into())),
        RecordingEngine::new(),
        Arc::new(StaticFetcher::new("unused")),
    );
    let base = serve(&h).await;
    let client = Client::new();

    let response = post(&client, &base, "start").await;
    assert_eq!(response.status, "error");
    assert!(response.error.is_some());
    assert_eq!(status(&client, &base).await.phase, "IDLE");
    assert_eq!(h.notifier.notices().len(), 1);
}
