//! Conversational responders for free-text input.
//!
//! Provides a `ConversationalResponder` trait with implementations for:
//! - **OpenAI** — chat completions over HTTP, Swahili system prompt
//! - **Intent** — keyword intents with canned replies, delegating to an inner
//!   responder when nothing matches

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::{IntentConfig, ResponderConfig};

pub const SYSTEM_PROMPT: &str =
    "You are Wanjiku, a helpful Kenyan government assistant. Respond in Swahili.";

// ============================================================================
// ConversationalResponder trait
// ============================================================================

/// Answers free text typed by a caller.
#[async_trait]
pub trait ConversationalResponder: Send + Sync {
    async fn reply(&self, text: &str, session_id: &str) -> Result<String, ResponderError>;

    /// Responder name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ResponderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing reply in response")]
    MissingReply,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },

    #[error("No responder available for this input")]
    Unavailable,

    #[error("Unknown responder backend '{0}'")]
    UnknownBackend(String),
}

/// Create the configured responder. Intents, when present, wrap the backend.
pub fn create_responder(
    config: &ResponderConfig,
) -> Result<Arc<dyn ConversationalResponder>, ResponderError> {
    let backend: Arc<dyn ConversationalResponder> = match config.backend.as_str() {
        "openai" => Arc::new(OpenAiResponder::new(config.clone())?),
        "none" => Arc::new(NoResponder),
        other => return Err(ResponderError::UnknownBackend(other.to_string())),
    };

    if config.intents.is_empty() {
        Ok(backend)
    } else {
        Ok(Arc::new(IntentResponder::new(config.intents.clone(), backend)))
    }
}

// ============================================================================
// OpenAI chat completions structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    user: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: Option<OpenAiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

// ============================================================================
// OpenAiResponder
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiResponder {
    client: Client,
    config: ResponderConfig,
    api_key: String,
}

impl OpenAiResponder {
    /// API key comes from config, falling back to `OPENAI_API_KEY`.
    pub fn new(config: ResponderConfig) -> Result<Self, ResponderError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        if api_key.is_empty() {
            return Err(ResponderError::MissingApiKey);
        }

        let client = Client::builder().timeout(Duration::from_secs(20)).build()?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    async fn complete_once(&self, text: &str, session_id: &str) -> Result<String, ResponderError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            user: session_id,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "OpenAI API error");

            return Err(ResponderError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response.json().await?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(ResponderError::MissingReply)
    }
}

#[async_trait]
impl ConversationalResponder for OpenAiResponder {
    async fn reply(&self, text: &str, session_id: &str) -> Result<String, ResponderError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.config.max_retries);

        match Retry::spawn(retry_strategy, || self.complete_once(text, session_id)).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    attempts = self.config.max_retries + 1,
                    error = %e,
                    "All chat completion attempts failed"
                );
                Err(ResponderError::RetryExhausted {
                    attempts: self.config.max_retries + 1,
                })
            }
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// IntentResponder
// ============================================================================

/// Matches keywords (case-insensitive substring) before falling through to
/// the inner responder. First matching intent wins.
pub struct IntentResponder {
    intents: Vec<IntentConfig>,
    fallback: Arc<dyn ConversationalResponder>,
}

impl IntentResponder {
    pub fn new(intents: Vec<IntentConfig>, fallback: Arc<dyn ConversationalResponder>) -> Self {
        Self { intents, fallback }
    }

    pub fn match_intent(&self, text: &str) -> Option<&IntentConfig> {
        let lowered = text.to_lowercase();
        self.intents.iter().find(|intent| {
            intent
                .keywords
                .iter()
                .any(|k| !k.is_empty() && lowered.contains(&k.to_lowercase()))
        })
    }

    fn render(intent: &IntentConfig) -> String {
        let mut reply = intent.response.clone();
        if !intent.services.is_empty() {
            reply.push_str("\n\nHuduma zinazopatikana:\n");
            for service in intent.services.iter().take(3) {
                reply.push_str("• ");
                reply.push_str(service);
                reply.push('\n');
            }
        }
        reply
    }
}

#[async_trait]
impl ConversationalResponder for IntentResponder {
    async fn reply(&self, text: &str, session_id: &str) -> Result<String, ResponderError> {
        if let Some(intent) = self.match_intent(text) {
            tracing::debug!(session_id = %session_id, intent = %intent.name, "Intent matched");
            return Ok(Self::render(intent));
        }
        self.fallback.reply(text, session_id).await
    }

    fn name(&self) -> &str {
        "intent"
    }
}

/// Backend used when no language model is configured.
pub struct NoResponder;

#[async_trait]
impl ConversationalResponder for NoResponder {
    async fn reply(&self, _text: &str, _session_id: &str) -> Result<String, ResponderError> {
        Err(ResponderError::Unavailable)
    }

    fn name(&self) -> &str {
        "none"
    }
}

// ============================================================================
// TESTS
// ============================================================================
