//! LLM Provider Abstraction Layer
//!
//! The capabilities that back each pipeline stage talk to an LLM through the
//! [`LLMProvider`] trait. Two providers are built in: Anthropic (cloud) and
//! Ollama (local). Which one is used is decided once at startup from
//! `llm.default_provider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub mod anthropic;
pub mod ollama;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded (429): {0}")]
    RateLimitExceeded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl LLMError {
    /// True for quota errors that clear up on their own
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LLMError::RateLimitExceeded(_))
    }
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Provider name (e.g. "anthropic", "ollama")
    fn name(&self) -> &str;

    /// Model identifier sent with each request
    fn model(&self) -> &str;

    /// Generate a completion for the conversation
    ///
    /// Returns the assistant's text. System messages are folded into the
    /// provider's system prompt slot where it has one.
    async fn generate(&self, messages: &[Message]) -> Result<String>;
}

/// Build the configured default provider
pub fn provider_from_config(
    config: &crate::config::LLMConfig,
    secrets: Arc<crate::secrets::SecretCache>,
) -> std::result::Result<Arc<dyn LLMProvider>, sdk::EngineError> {
    match config.default_provider.as_str() {
        "anthropic" => {
            let api_key = secrets.require(crate::secrets::ANTHROPIC_API_KEY)?;
            Ok(Arc::new(AnthropicProvider::new(
                config.anthropic.clone(),
                api_key,
            )))
        }
        "ollama" => {
            let provider =
                OllamaProvider::new(config.ollama.base_url.clone(), config.ollama.model.clone())
                    .map_err(|e| sdk::EngineError::LLMProvider(e.to_string()))?;
            Ok(Arc::new(provider))
        }
        other => Err(sdk::EngineError::Config(format!(
            "Unknown LLM provider '{}'",
            other
        ))),
    }
}

/// Shared HTTP client builder with a request timeout
pub(crate) fn http_client(timeout_secs: u64) -> std::result::Result<reqwest::Client, LLMError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LLMError::ProviderUnavailable(format!("Failed to create HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let system_msg = Message::system("You are a database architect");
        assert_eq!(system_msg.role, MessageRole::System);
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::assistant("done");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn test_rate_limit_classification() {
        assert!(LLMError::RateLimitExceeded("slow down".into()).is_rate_limit());
        assert!(!LLMError::Timeout.is_rate_limit());
    }
}
