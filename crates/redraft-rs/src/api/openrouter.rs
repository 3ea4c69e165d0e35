//! OpenRouter chat-completions implementation of [`CompletionClient`].
//!
//! Drafting requests go out as plain chat completions. Refinement requests
//! add a `json_schema` response format carrying the [`RefinementPlan`]
//! schema so the service constrains its own output.

use super::completion::{
    CompletionClient, CompletionFailure, CompletionFuture, CompletionRequest, ResponseMode,
};
use super::retry::{self, RetryConfig, Sleeper, TokioSleeper};
use crate::plan::RefinementPlan;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for drafting and refinement.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-pro";

/// Schema name announced with structured-only requests.
const PLAN_SCHEMA_NAME: &str = "refinement_plan";

// ── Config ─────────────────────────────────────────────────────────

/// Model and transport settings for [`OpenRouterClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub model: String,
    pub api_url: String,
    /// Sampling temperature for free-form (drafting) requests.
    pub temperature: f32,
    /// Sampling temperature for structured (refinement) requests.
    pub refinement_temperature: f32,
    /// Maximum output tokens. 0 leaves it to the provider.
    pub max_tokens: u32,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            api_url: OPENROUTER_URL.into(),
            temperature: 0.7,
            refinement_temperature: 0.2,
            max_tokens: 0,
            timeout: Duration::from_secs(600),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_refinement_temperature(mut self, temperature: f32) -> Self {
        self.refinement_temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retry = RetryConfig::with_retries(max_retries);
        self
    }
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// JSON output format type.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub enum ResponseFormatType {
    #[serde(rename = "json_object")]
    JsonObject,
    #[serde(rename = "json_schema")]
    JsonSchema,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: ResponseFormatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<JsonSchemaFormat>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: serde_json::Value,
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: Option<RawResponseMessage>,
    finish_reason: Option<String>,
    #[serde(default)]
    native_finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<RawContent>,
    #[serde(default)]
    refusal: Option<String>,
}

/// Message content: a single string, or an array of parts.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Parts(Vec<RawContentPart>),
}

#[derive(Deserialize, Debug)]
struct RawContentPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Classify a raw HTTP response into generated text or a failure.
///
/// Content parts are concatenated in order. A policy finish reason or a
/// refusal is `Blocked`; a response with nothing to concatenate is `Empty`.
pub fn interpret_response(status: u16, body: &str) -> Result<String, CompletionFailure> {
    if !(200..300).contains(&status) {
        let detail = format!("OpenRouter API HTTP {status}: {body}");
        return Err(if retry::is_transient_status(status) {
            CompletionFailure::transient(detail)
        } else {
            CompletionFailure::blocked(detail)
        });
    }

    let parsed: RawChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionFailure::transient(format!("failed to parse response: {e}")))?;

    if let Some(err) = parsed.error {
        let code = err
            .code
            .as_ref()
            .and_then(|c| c.as_u64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
            .and_then(|c| u16::try_from(c).ok());
        let detail = format!("OpenRouter API error: {}", err.message);
        // Without a usable code, fall back to the message wording.
        let transient = match code {
            Some(c) => retry::is_transient_status(c),
            None => {
                retry::is_transient_message(&err.message)
                    && !retry::is_policy_rejection(&err.message)
            }
        };
        return Err(if transient {
            CompletionFailure::transient(detail)
        } else {
            CompletionFailure::blocked(detail)
        });
    }

    let Some(choice) = parsed.choices.and_then(|c| c.into_iter().next()) else {
        return Err(CompletionFailure::empty("no choices in response"));
    };

    let finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown");
    let native = choice.native_finish_reason.as_deref().unwrap_or("");
    if finish_reason == "content_filter" || retry::is_policy_rejection(native) {
        return Err(CompletionFailure::blocked(format!(
            "finish_reason={finish_reason} native={native}"
        )));
    }

    let message = choice.message;
    if let Some(refusal) = message.as_ref().and_then(|m| m.refusal.clone()) {
        return Err(CompletionFailure::blocked(refusal));
    }

    let parts: Vec<String> = match message.and_then(|m| m.content) {
        Some(RawContent::Text(text)) => vec![text],
        Some(RawContent::Parts(parts)) => parts.into_iter().filter_map(|p| p.text).collect(),
        None => Vec::new(),
    };
    let text = parts.concat();

    if text.trim().is_empty() {
        return Err(CompletionFailure::empty(format!(
            "{} part(s), finish_reason={finish_reason}",
            parts.len()
        )));
    }
    Ok(text)
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    config: ClientConfig,
    plan_schema: serde_json::Value,
    sleeper: Box<dyn Sleeper>,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and configuration.
    pub fn new(api_key: impl Into<String>, config: ClientConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("redraft-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
            plan_schema: crate::json_schema_for::<RefinementPlan>(),
            sleeper: Box::new(TokioSleeper),
        })
    }

    /// Replace the sleeper used between retries.
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build the wire request for a completion request.
    pub fn build_body(&self, request: &CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(Message::system(&request.system));
        }
        messages.push(Message::user(&request.prompt));

        let (temperature, response_format) = match request.mode {
            ResponseMode::FreeForm => (self.config.temperature, None),
            ResponseMode::StructuredOnly => (
                self.config.refinement_temperature,
                Some(ResponseFormat {
                    fmt_type: ResponseFormatType::JsonSchema,
                    json_schema: Some(JsonSchemaFormat {
                        name: PLAN_SCHEMA_NAME.into(),
                        strict: false,
                        schema: self.plan_schema.clone(),
                    }),
                }),
            ),
        };

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature,
            response_format,
        }
    }

    /// One HTTP round-trip, no retries.
    async fn send_once(&self, body: &ChatRequest) -> Result<String, CompletionFailure> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}, structured={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
            body.response_format.is_some(),
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    CompletionFailure::blocked(format!("invalid request: {e}"))
                } else {
                    CompletionFailure::transient(format!("request failed: {e}"))
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CompletionFailure::transient(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );
        trace!("Raw response: {text}");

        interpret_response(status.as_u16(), &text)
    }
}

impl CompletionClient for OpenRouterClient {
    fn send<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(async move {
            let body = self.build_body(request);
            retry::retry_with_backoff(&self.config.retry, self.sleeper.as_ref(), || {
                self.send_once(&body)
            })
            .await
        })
    }
}
