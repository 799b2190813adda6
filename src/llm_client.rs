//! LLM transport: an OpenAI-compatible chat-completions client that
//! expects JSON back.
//!
//! The `LlmTransport` trait is the seam the orchestrator depends on; the
//! HTTP client here is one implementation. `call_llm_json` layers the
//! lenient decoder on top and, when the config opts in, spends one extra
//! completion asking the model to repair JSON that failed to parse.
//!
//! No retry policy lives here: a transport failure is reported once and the
//! orchestrator converts it into a fallback summary for the window.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::Config;
use crate::lenient_json::{parse_lenient, DecodeError};
use crate::prompts::build_json_repair_messages;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const REPAIR_MAX_TOKENS: u32 = 2500;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("LLM API key is not configured (set OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("no content in model response")]
    MissingContent,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// One chat message in the OpenAI wire shape.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The LLM collaborator boundary: one blocking round trip in, raw reply
/// text out. Anything non-2xx or content-free is an error; the caller
/// treats all failures uniformly.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn complete_json(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError>;
}

// ============================================================================
// OpenAI-compatible HTTP implementation
// ============================================================================

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        if config.llm_api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(OpenAiClient {
            http,
            base_url: config.llm_base_url.clone(),
            api_key: config.llm_api_key.clone(),
            model: config.model_name.clone(),
        })
    }
}

#[async_trait]
impl LlmTransport for OpenAiClient {
    async fn complete_json(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "response_format": {"type": "json_object"},
        });

        log::info!("Calling LLM model={}", self.model);
        let resp = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = resp.json().await?;
        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .ok_or(LlmError::MissingContent)?;

        Ok(content.to_string())
    }
}

// ============================================================================
// Decode layer
// ============================================================================

/// Call the model and decode its reply into a JSON object.
///
/// With `allow_repair`, a reply that contained braces but failed to parse
/// gets one repair round trip before giving up. An empty reply is never
/// repaired; there is nothing to fix.
pub async fn call_llm_json(
    transport: &dyn LlmTransport,
    messages: &[ChatMessage],
    max_tokens: u32,
    temperature: f32,
    allow_repair: bool,
) -> Result<Map<String, Value>, LlmError> {
    let raw = transport
        .complete_json(messages, max_tokens, temperature)
        .await?;

    match parse_lenient(&raw) {
        Ok(map) => Ok(map),
        Err(DecodeError::EmptyResponse) => Err(DecodeError::EmptyResponse.into()),
        Err(err) if allow_repair => {
            log::warn!("Model reply failed JSON parse ({}); attempting repair", err);
            let repair = build_json_repair_messages(&raw);
            let fixed = transport
                .complete_json(&repair, REPAIR_MAX_TOKENS, 0.0)
                .await?;
            Ok(parse_lenient(&fixed)?)
        }
        Err(err) => Err(err.into()),
    }
}

// ============================================================================
// Tests
// ============================================================================
