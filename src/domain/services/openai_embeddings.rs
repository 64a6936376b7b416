use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::configuration::EmbeddingsSettings;
use crate::ports::embeddings_provider::{EmbeddingsProviderError, EmbeddingsProviderPort};

/// Embeddings client for OpenAI-compatible `/embeddings` endpoints.
///
/// The vector dimension is fixed by configuration: responses of another
/// dimension are rejected instead of being stored and poisoning every
/// subsequent similarity search.
pub struct OpenAiEmbeddingsClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingsClient {
    /// Fails when the API key is missing so a misconfigured deployment
    /// stops at startup, not in the middle of an ingestion batch.
    pub fn try_new(settings: &EmbeddingsSettings) -> Result<Self, EmbeddingsProviderError> {
        let api_key = settings.api_key.expose_secret();
        if api_key.trim().is_empty() {
            return Err(EmbeddingsProviderError::MissingCredentials);
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| EmbeddingsProviderError::InvalidConfiguration(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.endpoint(),
            model: settings.model.clone(),
            dimension: settings.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingsProviderPort for OpenAiEmbeddingsClient {
    #[tracing::instrument(name = "Embedding one text", skip(self, text))]
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingsProviderError> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        // embed_many guarantees one vector per input
        Ok(vectors.remove(0))
    }

    #[tracing::instrument(name = "Embedding texts", skip(self, texts), fields(nb_texts = texts.len()))]
    async fn embed_many(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingsProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<body unavailable>"));
            return Err(EmbeddingsProviderError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingsProviderError::MalformedResponse(e.to_string()))?;

        // The API is allowed to answer out of order, the index is authoritative
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingsProviderError::CountMismatch {
                expected: texts.len(),
                returned: parsed.data.len(),
            });
        }

        for entry in &parsed.data {
            if entry.embedding.len() != self.dimension {
                return Err(EmbeddingsProviderError::DimensionMismatch {
                    expected: self.dimension,
                    returned: entry.embedding.len(),
                });
            }
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsData {
    embedding: Vec<f32>,
    index: usize,
}
