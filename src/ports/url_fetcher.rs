use async_trait::async_trait;

use crate::helper::error_chain_fmt;

/// Outbound port fetching raw documents by URL
#[async_trait]
pub trait UrlFetcherPort: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, UrlFetchError>;
}

#[derive(thiserror::Error)]
pub enum UrlFetchError {
    #[error("Failed to fetch document from URL: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Fetching {url} returned status {status}")]
    Status { url: String, status: u16 },
}

impl std::fmt::Debug for UrlFetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
