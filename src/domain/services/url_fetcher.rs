use std::time::Duration;

use async_trait::async_trait;

use crate::ports::url_fetcher::{UrlFetchError, UrlFetcherPort};

/// HTTP fetcher for documents ingested by URL
pub struct HttpUrlFetcher {
    client: reqwest::Client,
}

impl HttpUrlFetcher {
    pub fn try_new(timeout: Duration) -> Result<Self, UrlFetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlFetcherPort for HttpUrlFetcher {
    #[tracing::instrument(name = "Fetching document from URL", skip(self))]
    async fn fetch_text(&self, url: &str) -> Result<String, UrlFetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UrlFetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}
