use std::sync::Arc;

use crate::domain::entities::grounded_answer::{ChunkProvenance, RagSearchResult};
use crate::domain::entities::policy_chunk::ChunkFilters;
use crate::domain::services::similarity::distance_to_score;
use crate::helper::error_chain_fmt;
use crate::ports::embeddings_provider::{EmbeddingsProviderError, EmbeddingsProviderPort};
use crate::ports::policy_chunk_repository::{
    PolicyChunkRepositoryError, PolicyChunkRepositoryPort,
};

/// Embeds a query and ranks the stored chunks against it.
///
/// There is no degraded mode: if the embeddings provider or the chunk store
/// is unavailable the retrieval fails loudly instead of falling back to a
/// recency-ordered listing that would look ranked without being ranked.
pub struct Retriever {
    embeddings: Arc<dyn EmbeddingsProviderPort>,
    chunk_repository: Arc<dyn PolicyChunkRepositoryPort>,
}

impl Retriever {
    pub fn new(
        embeddings: Arc<dyn EmbeddingsProviderPort>,
        chunk_repository: Arc<dyn PolicyChunkRepositoryPort>,
    ) -> Self {
        Self {
            embeddings,
            chunk_repository,
        }
    }

    #[tracing::instrument(name = "Retrieving relevant policy chunks", skip(self))]
    pub async fn retrieve(
        &self,
        query: &str,
        filters: &ChunkFilters,
        top_k: usize,
    ) -> Result<Vec<RagSearchResult>, RetrieverError> {
        let query_vector = self.embeddings.embed_one(query).await?;

        let hits = self
            .chunk_repository
            .search(&query_vector, filters, top_k)
            .await?;

        Ok(hits
            .into_iter()
            .map(|(chunk, distance)| RagSearchResult {
                id: chunk.id,
                score: distance_to_score(distance),
                provenance: ChunkProvenance::from(&chunk),
                content: chunk.content,
            })
            .collect())
    }
}

#[derive(thiserror::Error)]
pub enum RetrieverError {
    #[error(transparent)]
    Embeddings(#[from] EmbeddingsProviderError),
    #[error(transparent)]
    ChunkStore(#[from] PolicyChunkRepositoryError),
}

impl std::fmt::Debug for RetrieverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
