use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::helper::error_chain_fmt;

/// One message of a chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: String::from("system"),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: String::from("user"),
            content: content.into(),
        }
    }
}

/// Incremental text deltas of a streamed completion
pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<String, CompletionsProviderError>> + Send>>;

/// Outbound port to the chat completions provider
#[async_trait]
pub trait CompletionsProviderPort: Send + Sync {
    /// Single-shot completion: returns the full assistant message
    async fn complete(&self, messages: &[ChatMessage])
        -> Result<String, CompletionsProviderError>;

    /// Streaming variant yielding incremental text deltas
    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<CompletionStream, CompletionsProviderError>;
}

#[derive(thiserror::Error)]
pub enum CompletionsProviderError {
    #[error("Missing API key for the completions provider")]
    MissingCredentials,
    #[error("Invalid completions provider configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Failed to call the completions provider: {0}")]
    Request(#[from] reqwest::Error),
    #[error("The completions provider returned status {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),
}

impl std::fmt::Debug for CompletionsProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
