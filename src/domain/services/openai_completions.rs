use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::configuration::CompletionsSettings;
use crate::ports::completions_provider::{
    ChatMessage, CompletionStream, CompletionsProviderError, CompletionsProviderPort,
};

/// Chat client for OpenAI-compatible `/chat/completions` endpoints
pub struct OpenAiCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompletionsClient {
    /// Fails when the API key is missing so a misconfigured deployment
    /// stops at startup, not on the first user query.
    pub fn try_new(settings: &CompletionsSettings) -> Result<Self, CompletionsProviderError> {
        let api_key = settings.api_key.expose_secret();
        if api_key.trim().is_empty() {
            return Err(CompletionsProviderError::MissingCredentials);
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| CompletionsProviderError::InvalidConfiguration(e.to_string()))?,
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
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, CompletionsProviderError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages,
            stream,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<body unavailable>"));
            return Err(CompletionsProviderError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionsProviderPort for OpenAiCompletionsClient {
    #[tracing::instrument(name = "Requesting chat completion", skip(self, messages))]
    async fn complete(
        &self,
        messages: &[ChatMessage],
    ) -> Result<String, CompletionsProviderError> {
        let response = self.send(messages, false).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionsProviderError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                CompletionsProviderError::MalformedResponse(String::from(
                    "the response contained no choice",
                ))
            })
    }

    /// Server-sent events stream: each `data:` line carries a JSON chunk
    /// with an optional text delta, and `data: [DONE]` closes the stream.
    #[tracing::instrument(name = "Requesting streamed chat completion", skip(self, messages))]
    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<CompletionStream, CompletionsProviderError> {
        let response = self.send(messages, true).await?;

        let deltas = response
            .bytes_stream()
            .scan(String::new(), |buffer, chunk| {
                let parsed: Vec<Result<String, CompletionsProviderError>> = match chunk {
                    Err(error) => vec![Err(error.into())],
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        drain_sse_lines(buffer)
                    }
                };
                futures::future::ready(Some(futures::stream::iter(parsed)))
            })
            .flatten();

        Ok(Box::pin(deltas))
    }
}

/// Consumes the complete lines of `buffer`, returning one delta per parsed
/// SSE data line. A partial trailing line stays in the buffer for the next
/// network chunk.
fn drain_sse_lines(buffer: &mut String) -> Vec<Result<String, CompletionsProviderError>> {
    let mut deltas = Vec::new();

    while let Some(newline_at) = buffer.find('\n') {
        let line = buffer[..newline_at].trim().to_string();
        buffer.drain(..=newline_at);

        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            continue;
        }

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => {
                if let Some(delta) = chunk
                    .choices
                    .into_iter()
                    .find_map(|choice| choice.delta.content)
                {
                    deltas.push(Ok(delta));
                }
            }
            Err(error) => {
                deltas.push(Err(CompletionsProviderError::MalformedResponse(
                    error.to_string(),
                )));
            }
        }
    }

    deltas
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
