//! Reply generation through the remote assistant endpoint.
//!
//! Sends the transcript as `{"message": ...}` and reads `{"reply": ...}`.
//! Never fails: every error is logged and replaced by a fixed apology so the
//! conversation keeps going.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::EndpointConfig;
use crate::error::{Error, FetchError};

/// Spoken when the endpoint cannot be reached or answers with an error.
pub const FALLBACK_REPLY: &str = "Sorry, I'm having trouble connecting right now. Please try again.";

/// Spoken when the endpoint answers without a reply.
pub const EMPTY_REPLY: &str = "Sorry, I couldn't process that.";

/// Exchanges one utterance for one reply.
#[async_trait]
pub trait ResponseFetcher: Send + Sync {
    async fn fetch_reply(&self, utterance: &str) -> String;
}

#[derive(Deserialize)]
struct ReplyBody {
    reply: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

pub struct HttpResponseFetcher {
    url: String,
    api_key: String,
    client: Client,
}

impl HttpResponseFetcher {
    pub fn new(config: &EndpointConfig) -> Result<Self, Error> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if config.api_key.is_empty() {
            warn!("No API key configured for {}", config.url);
        }

        Ok(Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            client: builder.build()?,
        })
    }

    async fn request_reply(&self, utterance: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "message": utterance }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or(body);
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited(message),
                StatusCode::PAYMENT_REQUIRED => FetchError::ServiceUnavailable(message),
                _ => FetchError::Status {
                    status: status.as_u16(),
                    body: message,
                },
            });
        }

        let body: ReplyBody = resp
            .json()
            .await
            .map_err(|e| FetchError::MalformedPayload(e.to_string()))?;

        Ok(body
            .reply
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| {
                warn!("Endpoint returned no reply");
                EMPTY_REPLY.to_string()
            }))
    }
}

#[async_trait]
impl ResponseFetcher for HttpResponseFetcher {
    async fn fetch_reply(&self, utterance: &str) -> String {
        debug!("Requesting reply for: {utterance}");

        match self.request_reply(utterance).await {
            Ok(reply) => {
                debug!("Reply: '{reply}'");
                reply
            }
            Err(FetchError::Transport(e)) if e.is_connect() => {
                warn!("Cannot connect to {}", self.url);
                FALLBACK_REPLY.to_string()
            }
            Err(FetchError::Transport(e)) if e.is_timeout() => {
                warn!("Reply request timed out");
                FALLBACK_REPLY.to_string()
            }
            Err(e) => {
                warn!("Reply request failed: {e}");
                FALLBACK_REPLY.to_string()
            }
        }
    }
}
