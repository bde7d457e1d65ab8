//! Generative model collaborator.
//!
//! [`ModelClient`] is the seam between the loop and the model transport. One client
//! is built per process and passed explicitly to each planner/fixer call; tests swap
//! in scripted clients.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::io::config::ModelConfig;

const REFERER: &str = "http://localhost:8888";
const TITLE: &str = "Dallas Agent Workshop";

/// One chat-completion request: system instructions plus a single user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: f32,
}

/// Abstraction over generative model backends.
pub trait ModelClient {
    /// Send `request` and return the raw response text (possibly empty).
    fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Failure of the model call itself.
///
/// Carried inside the `anyhow` chain so callers can `downcast_ref` it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelCallError {
    /// Connection, TLS, or timeout failure before a response arrived.
    Transport(String),
    /// The credential was rejected.
    AuthenticationFailed,
    RateLimited,
    /// Any other non-success HTTP status.
    Api { status: u16, message: String },
    /// The response body was not a chat completion.
    Malformed(String),
}

impl fmt::Display for ModelCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "model transport error: {e}"),
            Self::AuthenticationFailed => write!(f, "model authentication failed"),
            Self::RateLimited => write!(f, "model rate limited"),
            Self::Api { status, message } => write!(f, "model API error ({status}): {message}"),
            Self::Malformed(e) => write!(f, "malformed model response: {e}"),
        }
    }
}

impl std::error::Error for ModelCallError {}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (OpenRouter by default).
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(config: &ModelConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into().trim().to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl ModelClient for OpenRouterClient {
    #[instrument(skip_all, fields(model = %request.model, prompt_bytes = request.user.len()))]
    fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = WireRequest {
            model: &request.model,
            messages: wire_messages(request),
            temperature: request.temperature,
        };

        debug!(endpoint = %self.endpoint(), "sending chat completion");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&body)
            .send()
            .map_err(|e| ModelCallError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ModelCallError::Transport(e.to_string()))?;
        if !status.is_success() {
            let err = classify_status(status, &text);
            warn!(status = status.as_u16(), err = %err, "model call failed");
            return Err(err.into());
        }

        let content = parse_completion(&text)?;
        debug!(response_bytes = content.len(), "received chat completion");
        Ok(content)
    }
}

/// System turn (omitted when blank) followed by the user turn.
fn wire_messages(request: &ChatRequest) -> Vec<WireMessage<'_>> {
    let mut messages = Vec::with_capacity(2);
    if !request.system.trim().is_empty() {
        messages.push(WireMessage {
            role: "system",
            content: &request.system,
        });
    }
    messages.push(WireMessage {
        role: "user",
        content: &request.user,
    });
    messages
}

fn classify_status(status: StatusCode, body: &str) -> ModelCallError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelCallError::AuthenticationFailed,
        StatusCode::TOO_MANY_REQUESTS => ModelCallError::RateLimited,
        _ => ModelCallError::Api {
            status: status.as_u16(),
            message: body.trim().to_string(),
        },
    }
}

/// Extract the first choice's message content; a null content is an empty reply.
fn parse_completion(body: &str) -> Result<String, ModelCallError> {
    let response: WireResponse =
        serde_json::from_str(body).map_err(|e| ModelCallError::Malformed(e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelCallError::Malformed("no choices in response".to_string()))?;
    Ok(choice.message.content.unwrap_or_default())
}
