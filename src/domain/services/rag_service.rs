use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::entities::grounded_answer::GroundedAnswer;
use crate::domain::entities::ingestion_batch::{DocumentSource, IngestionBatch};
use crate::domain::entities::ingestion_job::IngestionJob;
use crate::domain::entities::policy_chunk::{ChunkContext, ChunkFilters, ChunkStats};
use crate::domain::services::answer_composer::{AnswerComposer, AnswerComposerError};
use crate::domain::services::retriever::{Retriever, RetrieverError};
use crate::helper::error_chain_fmt;
use crate::ports::completions_provider::CompletionsProviderPort;
use crate::ports::embeddings_provider::EmbeddingsProviderPort;
use crate::ports::ingestion_job_repository::{
    IngestionJobRepositoryError, IngestionJobRepositoryPort,
};
use crate::ports::policy_chunk_repository::{
    PolicyChunkRepositoryError, PolicyChunkRepositoryPort,
};

/// The surface the rest of the application talks to.
///
/// Every collaborator comes in through the constructor, so tests can
/// substitute in-memory repositories and fake providers without any
/// process-wide state.
pub struct RagService {
    chunk_repository: Arc<dyn PolicyChunkRepositoryPort>,
    job_repository: Arc<dyn IngestionJobRepositoryPort>,
    retriever: Retriever,
    composer: AnswerComposer,
    batch_sender: mpsc::Sender<IngestionBatch>,
    default_top_k: usize,
}

impl RagService {
    pub fn new(
        embeddings: Arc<dyn EmbeddingsProviderPort>,
        completions: Arc<dyn CompletionsProviderPort>,
        chunk_repository: Arc<dyn PolicyChunkRepositoryPort>,
        job_repository: Arc<dyn IngestionJobRepositoryPort>,
        batch_sender: mpsc::Sender<IngestionBatch>,
        default_top_k: usize,
    ) -> Self {
        let retriever = Retriever::new(embeddings, chunk_repository.clone());
        let composer = AnswerComposer::new(completions);

        Self {
            chunk_repository,
            job_repository,
            retriever,
            composer,
            batch_sender,
            default_top_k,
        }
    }

    /// Accepts a batch of storage keys or URLs for asynchronous ingestion.
    ///
    /// Returns the id of the tracking job immediately: the caller polls
    /// `get_ingestion_status` for progress.
    #[tracing::instrument(
        name = "Submitting ingestion batch",
        skip(self, items, context),
        fields(nb_items = items.len())
    )]
    pub async fn ingest(
        &self,
        items: Vec<String>,
        source: DocumentSource,
        context: ChunkContext,
    ) -> Result<Uuid, RagServiceError> {
        if items.is_empty() {
            return Err(RagServiceError::Validation(String::from(
                "an ingestion batch needs at least one item",
            )));
        }
        if items.iter().any(|item| item.trim().is_empty()) {
            return Err(RagServiceError::Validation(String::from(
                "ingestion items cannot be blank",
            )));
        }

        let job = IngestionJob::builder().total_items(items.len()).build();
        self.job_repository.create(&job).await?;
        let job_id = job.id;

        self.batch_sender
            .send(IngestionBatch {
                job_id,
                items,
                source,
                context,
            })
            .await
            .map_err(|_| RagServiceError::WorkerUnavailable)?;

        Ok(job_id)
    }

    pub async fn get_ingestion_status(
        &self,
        job_id: Uuid,
    ) -> Result<Option<IngestionJob>, RagServiceError> {
        Ok(self.job_repository.get(job_id).await?)
    }

    /// Answers a query from the stored policy chunks.
    ///
    /// The `insurer` and `product` string fields of `request_context`, when
    /// present, narrow the retrieval; the whole context is also handed to
    /// the composer for the grounding prompt.
    #[tracing::instrument(name = "Answering policy query", skip(self, request_context))]
    pub async fn answer_query(
        &self,
        query: &str,
        request_context: &JsonValue,
        top_k: Option<usize>,
    ) -> Result<GroundedAnswer, RagServiceError> {
        if query.trim().is_empty() {
            return Err(RagServiceError::Validation(String::from(
                "the query cannot be empty",
            )));
        }
        let top_k = top_k.unwrap_or(self.default_top_k);
        if top_k == 0 {
            return Err(RagServiceError::Validation(String::from(
                "top_k must be at least 1",
            )));
        }

        let filters = ChunkFilters {
            insurer: context_string(request_context, "insurer"),
            product: context_string(request_context, "product"),
            version: None,
        };

        let results = self.retriever.retrieve(query, &filters, top_k).await?;

        Ok(self
            .composer
            .compose(query, &results, request_context)
            .await?)
    }

    /// Bulk-removes chunks matching the filters, returning the removed count
    #[tracing::instrument(name = "Deleting policy chunks", skip(self))]
    pub async fn delete_chunks(&self, filters: &ChunkFilters) -> Result<u64, RagServiceError> {
        for value in [&filters.insurer, &filters.product, &filters.version] {
            if let Some(value) = value {
                if value.trim().is_empty() {
                    return Err(RagServiceError::Validation(String::from(
                        "filter values cannot be blank",
                    )));
                }
            }
        }

        Ok(self.chunk_repository.delete(filters).await?)
    }

    pub async fn chunk_stats(&self) -> Result<ChunkStats, RagServiceError> {
        Ok(self.chunk_repository.stats().await?)
    }
}

fn context_string(context: &JsonValue, key: &str) -> Option<String> {
    context
        .get(key)
        .and_then(JsonValue::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(String::from)
}

#[derive(thiserror::Error)]
pub enum RagServiceError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("The ingestion worker is no longer accepting batches")]
    WorkerUnavailable,
    #[error(transparent)]
    Retrieval(#[from] RetrieverError),
    #[error(transparent)]
    Composition(#[from] AnswerComposerError),
    #[error(transparent)]
    ChunkStore(#[from] PolicyChunkRepositoryError),
    #[error(transparent)]
    JobStore(#[from] IngestionJobRepositoryError),
}

impl std::fmt::Debug for RagServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
