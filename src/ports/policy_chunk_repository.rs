use async_trait::async_trait;

use crate::domain::entities::policy_chunk::{ChunkContext, ChunkFilters, ChunkStats, PolicyChunk};
use crate::helper::error_chain_fmt;

/// Port owning `PolicyChunk` persistence.
///
/// The distance metric of `search` is the cosine distance
/// `d = 1 - cos(query, chunk)` in `[0, 2]`: smaller is closer.
#[async_trait]
pub trait PolicyChunkRepositoryPort: Send + Sync {
    /// Persists one chunk per chunk/vector pair, stamped with the shared
    /// context. All-or-nothing: on any failure no chunk of the call is kept.
    async fn insert(
        &self,
        chunks: &[String],
        vectors: &[Vec<f32>],
        context: &ChunkContext,
    ) -> Result<(), PolicyChunkRepositoryError>;

    /// The `top_k` chunks matching the filters, closest first.
    /// Ties are broken by the most recent `created_at`.
    /// An empty store yields an empty list, not an error.
    async fn search(
        &self,
        query_vector: &[f32],
        filters: &ChunkFilters,
        top_k: usize,
    ) -> Result<Vec<(PolicyChunk, f32)>, PolicyChunkRepositoryError>;

    /// Removes every chunk matching the filters, returning the removed count
    async fn delete(&self, filters: &ChunkFilters) -> Result<u64, PolicyChunkRepositoryError>;

    async fn stats(&self) -> Result<ChunkStats, PolicyChunkRepositoryError>;
}

#[derive(thiserror::Error)]
pub enum PolicyChunkRepositoryError {
    #[error("Invalid insert batch: {0}")]
    Validation(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl std::fmt::Debug for PolicyChunkRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
