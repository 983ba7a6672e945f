//! Backend abstraction for text generation and scoring.
//!
//! The [`Backend`] trait decouples the thought loop from the actual language
//! model service (an OpenAI-compatible chat endpoint). Tests use scripted
//! backends that return predetermined replies without network access.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::io::config::BackendConfig;

/// What a completion request is for. Used for diagnostics and by test backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Generate,
    Evaluate,
}

/// Parameters for one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub kind: RequestKind,
    /// Instruction context sent with the `system` role.
    pub system: String,
    /// Task-specific content sent with the `user` role.
    pub user: String,
    pub temperature: f32,
    /// Ask the backend for a machine-parseable JSON object.
    pub json_output: bool,
    /// Upper bound for the whole call.
    pub timeout: Duration,
}

/// Failure of a single backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("backend returned no content")]
    EmptyResponse,
}

/// Abstraction over completion backends.
pub trait Backend: Send + Sync {
    /// Run one completion and return the raw text of the reply.
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}

/// Backend for OpenAI-compatible `/chat/completions` endpoints (OpenAI, OpenRouter, ...).
pub struct OpenAiBackend {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiBackend {
    /// Build a backend, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("read API key from ${}", config.api_key_env))?;
        Self::new(config, api_key)
    }

    pub fn new(config: &BackendConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder().build().context("build http client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl Backend for OpenAiBackend {
    #[instrument(skip_all, fields(kind = ?request.kind, model = %self.model, timeout_ms = request.timeout.as_millis() as u64))]
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            response_format: request.json_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(endpoint = %self.endpoint(), "sending completion request");
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(|err| classify_transport_error(err, request.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|err| classify_transport_error(err, request.timeout))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&text)
                .map(|api| api.error.message)
                .unwrap_or(text);
            warn!(status = status.as_u16(), "completion request rejected");
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|err| BackendError::Transport(format!("decode response: {err}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(BackendError::EmptyResponse)?;

        debug!(bytes = content.len(), "completion received");
        Ok(content)
    }
}

fn classify_transport_error(err: reqwest::Error, timeout: Duration) -> BackendError {
    if err.is_timeout() {
        warn!(timeout_ms = timeout.as_millis() as u64, "completion request timed out");
        return BackendError::Timeout(timeout);
    }
    warn!(err = %err, "completion request failed");
    BackendError::Transport(err.to_string())
}
