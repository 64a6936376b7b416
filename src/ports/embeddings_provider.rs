use async_trait::async_trait;

use crate::helper::error_chain_fmt;

/// Outbound port to the embeddings provider.
///
/// Both methods are order-preserving: `embed_many` returns exactly one
/// vector per input text, in input order. A failing call must surface an
/// `EmbeddingsProviderError`, never an empty or zeroed vector.
#[async_trait]
pub trait EmbeddingsProviderPort: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingsProviderError>;

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingsProviderError>;
}

#[derive(thiserror::Error)]
pub enum EmbeddingsProviderError {
    #[error("Missing API key for the embeddings provider")]
    MissingCredentials,
    #[error("Invalid embeddings provider configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Failed to call the embeddings provider: {0}")]
    Request(#[from] reqwest::Error),
    #[error("The embeddings provider returned status {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("Malformed embeddings response: {0}")]
    MalformedResponse(String),
    #[error("Expected {expected} embeddings but the provider returned {returned}")]
    CountMismatch { expected: usize, returned: usize },
    #[error("Expected embeddings of dimension {expected} but the provider returned {returned}")]
    DimensionMismatch { expected: usize, returned: usize },
}

impl std::fmt::Debug for EmbeddingsProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
