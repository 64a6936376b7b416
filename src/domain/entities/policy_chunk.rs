use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::domain::services::chunking::estimate_tokens;

/// A unit of retrievable policy knowledge.
///
/// Created once during ingestion and immutable afterwards: chunks are only
/// removed through a filtered bulk delete.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct PolicyChunk {
    #[builder(default=Uuid::new_v4())]
    pub id: Uuid,

    pub insurer: String,

    pub product: String,

    #[builder(default)]
    pub version: Option<String>,

    #[builder(default)]
    pub source_url: Option<String>,

    pub content: String,

    /// Rough token count of `content`, 1 token ~ 4 characters
    pub token_estimate: usize,

    /// Vector of the dimension fixed by the embeddings configuration
    pub embedding: Vec<f32>,

    /// Free-form metadata (section, page, ...)
    #[builder(default=JsonValue::Null)]
    pub metadata: JsonValue,

    #[builder(default=Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl PolicyChunk {
    /// Builds a chunk from one chunker output and its embedding,
    /// stamping the shared ingestion context on it.
    pub fn from_ingestion(content: String, embedding: Vec<f32>, context: &ChunkContext) -> Self {
        PolicyChunk::builder()
            .insurer(
                context
                    .insurer
                    .clone()
                    .unwrap_or_else(|| String::from("Unknown")),
            )
            .product(
                context
                    .product
                    .clone()
                    .unwrap_or_else(|| String::from("Unknown")),
            )
            .version(context.version.clone())
            .source_url(context.source_url.clone())
            .token_estimate(estimate_tokens(&content))
            .content(content)
            .embedding(embedding)
            .metadata(context.extra.clone())
            .build()
    }
}

/// Metadata shared by every chunk produced from one ingestion batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkContext {
    pub insurer: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub source_url: Option<String>,
    /// Free-form metadata copied verbatim on each chunk
    #[serde(default)]
    pub extra: JsonValue,
}

/// Equality filters over stored chunks, all optional and AND-combined
#[derive(Debug, Clone, Default)]
pub struct ChunkFilters {
    pub insurer: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

impl ChunkFilters {
    pub fn matches(&self, chunk: &PolicyChunk) -> bool {
        if let Some(insurer) = &self.insurer {
            if &chunk.insurer != insurer {
                return false;
            }
        }
        if let Some(product) = &self.product {
            if &chunk.product != product {
                return false;
            }
        }
        if let Some(version) = &self.version {
            if chunk.version.as_ref() != Some(version) {
                return false;
            }
        }
        true
    }
}

/// Aggregate counts over the stored chunks
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkStats {
    pub total: u64,
    pub by_insurer: HashMap<String, u64>,
    pub by_product: HashMap<String, u64>,
}
