//! HTTP control API for the assistant.
//!
//! The surface a UI (or `slogi-ctl`) drives: observable state plus start
//! and stop. Runs on 127.0.0.1:8768 (configurable) using axum.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::session::{AssistantSession, SessionState, StartOutcome};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub phase: String,
    pub is_active: bool,
    pub is_listening: bool,
    pub is_speaking: bool,
    pub transcript: String,
    pub response: String,
}

impl From<&SessionState> for StatusResponse {
    fn from(state: &SessionState) -> Self {
        Self {
            phase: state.phase.to_string(),
            is_active: state.is_active(),
            is_listening: state.is_listening(),
            is_speaking: state.is_speaking(),
            transcript: state.transcript.clone(),
            response: state.reply.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
        }
    }
}

/// Build the axum router.
pub fn router(session: AssistantSession) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/start", post(handle_start))
        .route("/stop", post(handle_stop))
        .route("/toggle", post(handle_toggle))
        .with_state(session)
}

/// Start the control API as a background tokio task.
pub async fn start_api(session: AssistantSession, port: u16) {
    let app = router(session);
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind control API on {addr}: {e}");
            return;
        }
    };
    info!("Control API listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Control API server error: {e}");
        }
    });
}

// --- Handlers ---

async fn handle_status(State(session): State<AssistantSession>) -> Json<StatusResponse> {
    Json(StatusResponse::from(&session.state()))
}

async fn handle_start(State(session): State<AssistantSession>) -> Json<ControlResponse> {
    info!("HTTP /start");
    Json(match session.start().await {
        Ok(StartOutcome::Started) => ControlResponse::ok("started"),
        Ok(StartOutcome::AlreadyActive) => ControlResponse::ok("already_active"),
        Ok(StartOutcome::Cancelled) => ControlResponse::ok("cancelled"),
        Err(e) => ControlResponse::err(e.to_string()),
    })
}

async fn handle_stop(State(session): State<AssistantSession>) -> Json<ControlResponse> {
    info!("HTTP /stop");
    session.stop();
    Json(ControlResponse::ok("stopped"))
}

async fn handle_toggle(State(session): State<AssistantSession>) -> Json<ControlResponse> {
    info!("HTTP /toggle");
    Json(match session.toggle().await {
        Ok(true) => ControlResponse::ok("started"),
        Ok(false) => ControlResponse::ok("stopped"),
        Err(e) => ControlResponse::err(e.to_string()),
    })
}
