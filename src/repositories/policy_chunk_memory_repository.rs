use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::entities::policy_chunk::{ChunkContext, ChunkFilters, ChunkStats, PolicyChunk};
use crate::domain::services::similarity::{cosine_distance, rank_candidates};
use crate::ports::policy_chunk_repository::{
    PolicyChunkRepositoryError, PolicyChunkRepositoryPort,
};

/// In-memory chunk store: brute-force cosine search over a single locked
/// collection.
///
/// Used by the test suites and local runs. The write lock makes every
/// insert atomic from the point of view of concurrent searches: a reader
/// either sees none or all of the chunks of one insert call, never a chunk
/// with its vector but without its metadata.
#[derive(Default)]
pub struct PolicyChunkInMemoryRepository {
    chunks: RwLock<Vec<PolicyChunk>>,
}

impl PolicyChunkInMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyChunkRepositoryPort for PolicyChunkInMemoryRepository {
    #[tracing::instrument(name = "Saving policy chunks in memory", skip_all, fields(nb_chunks = chunks.len()))]
    async fn insert(
        &self,
        chunks: &[String],
        vectors: &[Vec<f32>],
        context: &ChunkContext,
    ) -> Result<(), PolicyChunkRepositoryError> {
        if chunks.len() != vectors.len() {
            return Err(PolicyChunkRepositoryError::Validation(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        // Rows are fully built before the lock is taken: the store mutation
        // is a single extend, all-or-nothing
        let rows: Vec<PolicyChunk> = chunks
            .iter()
            .zip(vectors.iter())
            .map(|(content, vector)| {
                PolicyChunk::from_ingestion(content.clone(), vector.clone(), context)
            })
            .collect();

        self.chunks.write().await.extend(rows);
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        filters: &ChunkFilters,
        top_k: usize,
    ) -> Result<Vec<(PolicyChunk, f32)>, PolicyChunkRepositoryError> {
        let store = self.chunks.read().await;

        let candidates: Vec<(PolicyChunk, f32)> = store
            .iter()
            .filter(|chunk| filters.matches(chunk))
            .map(|chunk| {
                let distance = cosine_distance(query_vector, &chunk.embedding);
                (chunk.clone(), distance)
            })
            .collect();

        Ok(rank_candidates(
            candidates,
            |chunk: &PolicyChunk| chunk.created_at,
            top_k,
        ))
    }

    #[tracing::instrument(name = "Deleting policy chunks in memory", skip(self))]
    async fn delete(&self, filters: &ChunkFilters) -> Result<u64, PolicyChunkRepositoryError> {
        let mut store = self.chunks.write().await;
        let before = store.len();
        store.retain(|chunk| !filters.matches(chunk));
        Ok((before - store.len()) as u64)
    }

    async fn stats(&self) -> Result<ChunkStats, PolicyChunkRepositoryError> {
        let store = self.chunks.read().await;

        let mut stats = ChunkStats {
            total: store.len() as u64,
            ..ChunkStats::default()
        };
        for chunk in store.iter() {
            *stats.by_insurer.entry(chunk.insurer.clone()).or_default() += 1;
            *stats.by_product.entry(chunk.product.clone()).or_default() += 1;
        }

        Ok(stats)
    }
}
