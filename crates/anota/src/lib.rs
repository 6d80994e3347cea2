//! LLM-assisted qualitative coding of learning-activity records.
//!
//! `anota` drives a human-curated codebook of named constructs over a tabular
//! store of learning activities: for every record (row) and every code
//! (column) it builds a natural-language prompt, sends it to an LLM backend,
//! and writes the parsed 0/1 judgment back into the same cell it read from.
//! Failed calls are retried with a fixed backoff; a rolling digest of recently
//! processed items is carried forward as additional prompt context.
//!
//! # Where to find things
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`codebook`] | Code definitions and fuzzy header-to-code resolution |
//! | [`sanitize`] | Markup stripping for free-text fields |
//! | [`context`] | Bounded rolling window + LLM digest of recent items |
//! | [`prompt`] | Deterministic annotation prompt assembly |
//! | [`engine`] | Request/retry state machine and judgment validation |
//! | [`store`] | Row/column-addressable workbook with write-through saves |
//! | [`pipeline`] | The sequential annotate / summarize run loops |
//! | [`config`] | One immutable [`RunConfig`](config::RunConfig) per run |
//!
//! This file holds the wire types for the two supported LLM protocols
//! (chat-style and completion-style), the [`LlmClient`], and the
//! [`TextGenerator`] seam the engine and summarizer are written against.

pub mod codebook;
pub mod config;
pub mod context;
pub mod engine;
pub mod pipeline;
pub mod prompt;
pub mod sanitize;
pub mod store;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::debug;

// ── Constants ──────────────────────────────────────────────────────

/// Pseudo-prompt sent once per processed column to simulate statelessness
/// on backends that might otherwise retain conversational memory.
pub const RESET_PROMPT: &str = "Forget all previous instructions and start fresh.";

/// Request timeout. Large models can take a while on a single completion.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ── Protocol selection ─────────────────────────────────────────────

/// Which wire protocol the configured endpoint speaks.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiProtocol {
    /// `{model, messages, ...}` request, `choices[0].message.content` response.
    Chat,
    /// `{model, prompt, ...}` request, `response` field response.
    #[default]
    Completion,
}

// ── Request types ──────────────────────────────────────────────────

/// Chat-style completion request body.
#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub stream: bool,
}

/// A single message in a chat-style request.
#[derive(Serialize, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Completion-style request body (local generate endpoints).
#[derive(Serialize, Debug)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub stream: bool,
}

// ── Response types ─────────────────────────────────────────────────

/// Raw chat-style response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Raw completion-style response.
#[derive(Deserialize, Debug)]
struct RawCompletionResponse {
    response: Option<String>,
    error: Option<String>,
}

// ── Errors ─────────────────────────────────────────────────────────

/// A failed LLM call. Every variant is transient from the engine's point of
/// view and subject to the retry policy; only validation of a *received*
/// response (which is not an `LlmError`) is never retried.
#[derive(Debug)]
pub enum LlmError {
    /// Connectivity-level failure: refused, reset, timed out.
    Transport(String),
    /// The endpoint answered with a non-2xx status.
    Http { status: u16, body: String },
    /// The payload arrived but could not be interpreted.
    Malformed(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "request failed: {msg}"),
            Self::Http { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Malformed(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for LlmError {}

// ── Generator seam ─────────────────────────────────────────────────

pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;

/// The one capability the pipeline needs from an LLM backend: text in,
/// text out. The engine and the context summarizer are written against this
/// trait so their control flow is testable with scripted fakes.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> GenerateFuture<'_>;
}

// ── Client ─────────────────────────────────────────────────────────

/// HTTP client for the configured LLM endpoint, speaking either protocol.
pub struct LlmClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    protocol: ApiProtocol,
}

impl LlmClient {
    pub fn new(config: &config::RunConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("anota/0.2")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            endpoint: config.api_endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model_name.clone(),
            protocol: config.api_protocol,
        })
    }

    /// Send one prompt and return the trimmed response text.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(
            "LLM request: model={}, protocol={:?}, prompt={} bytes",
            self.model,
            self.protocol,
            prompt.len()
        );

        let start = Instant::now();

        let mut request = self.client.post(self.endpoint.as_str());
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let request = match self.protocol {
            ApiProtocol::Chat => request.json(&ChatRequest {
                model: self.model.clone(),
                messages: vec![ChatMessage::user(prompt)],
                temperature: 0.0,
                stream: false,
            }),
            ApiProtocol::Completion => request.json(&CompletionRequest {
                model: self.model.clone(),
                prompt: prompt.to_string(),
                temperature: 0.0,
                stream: false,
            }),
        };

        let resp = request
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| LlmError::Transport(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(LlmError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        extract_response_text(self.protocol, &text)
    }
}

impl TextGenerator for LlmClient {
    fn generate(&self, prompt: &str) -> GenerateFuture<'_> {
        let prompt = prompt.to_string();
        Box::pin(async move { self.generate_text(&prompt).await })
    }
}

/// Pull the judgment text out of a successful response body.
fn extract_response_text(protocol: ApiProtocol, body: &str) -> Result<String, LlmError> {
    match protocol {
        ApiProtocol::Chat => {
            let parsed: RawChatResponse =
                serde_json::from_str(body).map_err(|e| LlmError::Malformed(e.to_string()))?;
            if let Some(err) = parsed.error {
                return Err(LlmError::Malformed(format!("API error: {}", err.message)));
            }
            parsed
                .choices
                .and_then(|c| c.into_iter().next())
                .and_then(|c| c.message.content)
                .map(|t| t.trim().to_string())
                .ok_or_else(|| LlmError::Malformed("no choices in response".to_string()))
        }
        ApiProtocol::Completion => {
            let parsed: RawCompletionResponse =
                serde_json::from_str(body).map_err(|e| LlmError::Malformed(e.to_string()))?;
            if let Some(err) = parsed.error {
                return Err(LlmError::Malformed(format!("API error: {err}")));
            }
            parsed
                .response
                .map(|t| t.trim().to_string())
                .ok_or_else(|| LlmError::Malformed("no response field".to_string()))
        }
    }
}
