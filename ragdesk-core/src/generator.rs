//! Answer generation against a locally hosted LLM.
//!
//! The model sits behind an OpenAI-compatible chat completion endpoint
//! (llama.cpp `server`, vLLM, Ollama). Every call is a single, stateless,
//! non-streaming user turn.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::GeneratorConfig;

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

// ============================================================================
// ChatBackend trait
// ============================================================================

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Answer `question` grounded on `context`. An empty context is allowed.
    async fn answer(&self, question: &str, context: &str) -> Result<String, GenerationError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM server error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("LLM response contained no message content")]
    MissingContent,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// Prompt
// ============================================================================

/// Fill `{context}` and `{question}` in a single left-to-right pass, so
/// placeholder-looking text inside the substituted values is left alone.
pub fn build_prompt(template: &str, question: &str, context: &str) -> String {
    let mut out = String::with_capacity(template.len() + question.len() + context.len());
    let mut rest = template;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

// ============================================================================
// LlamaChatClient
// ============================================================================

/// Chat completion client for a local OpenAI-compatible server.
#[derive(Debug, Clone)]
pub struct LlamaChatClient {
    client: Client,
    config: GeneratorConfig,
    base_url: String,
}

impl LlamaChatClient {
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerationError> {
        let base_url = config.base_url.clone();
        Self::with_base_url(config, base_url)
    }

    /// Create a client against a custom base URL (for testing / integration)
    pub fn with_base_url(config: GeneratorConfig, base_url: String) -> Result<Self, GenerationError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Submit a fully rendered prompt and return the model's reply verbatim.
    pub async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            max_tokens: self.config.max_tokens,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "LLM server error");

            return Err(GenerationError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or(GenerationError::MissingContent)
    }
}

#[async_trait]
impl ChatBackend for LlamaChatClient {
    async fn answer(&self, question: &str, context: &str) -> Result<String, GenerationError> {
        let prompt = build_prompt(&self.config.prompt_template, question, context);
        tracing::debug!(
            model = %self.config.model,
            prompt_chars = prompt.chars().count(),
            context_empty = context.is_empty(),
            "Requesting chat completion"
        );
        self.complete(&prompt).await
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// TESTS
// ============================================================================
