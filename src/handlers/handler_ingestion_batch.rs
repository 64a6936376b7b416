use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::domain::entities::ingestion_batch::{DocumentSource, IngestionBatch};
use crate::domain::entities::policy_chunk::ChunkContext;
use crate::domain::services::chunking::DocumentChunker;
use crate::helper::error_chain_fmt;
use crate::ports::embeddings_provider::{EmbeddingsProviderError, EmbeddingsProviderPort};
use crate::ports::ingestion_job_repository::{
    IngestionJobRepositoryError, IngestionJobRepositoryPort,
};
use crate::ports::object_storage::{ObjectStorageError, ObjectStoragePort};
use crate::ports::policy_chunk_repository::{
    PolicyChunkRepositoryError, PolicyChunkRepositoryPort,
};
use crate::ports::url_fetcher::{UrlFetchError, UrlFetcherPort};

/// Everything one batch needs to be turned into stored chunks
pub struct IngestionWorkerContext {
    pub object_storage: Arc<dyn ObjectStoragePort>,
    pub url_fetcher: Arc<dyn UrlFetcherPort>,
    pub embeddings: Arc<dyn EmbeddingsProviderPort>,
    pub chunk_repository: Arc<dyn PolicyChunkRepositoryPort>,
    pub job_repository: Arc<dyn IngestionJobRepositoryPort>,
    pub chunker: DocumentChunker,
    pub cancellation: CancellationToken,
}

/// Consumes ingestion batches from the in-process queue until every sender
/// is dropped.
///
/// Batches are handled one by one, there is no handling of batches in
/// parallel: within a batch the items keep their submission order, and the
/// job tracker only ever has this single writer.
#[tracing::instrument(name = "Register ingestion batch handler", skip(receiver, worker))]
pub async fn register_handler(
    receiver: mpsc::Receiver<IngestionBatch>,
    worker: IngestionWorkerContext,
) -> Result<(), RegisterHandlerIngestionBatchError> {
    let mut batches = ReceiverStream::new(receiver);

    info!("Ingestion worker waiting for batches ...");

    while let Some(batch) = batches.next().await {
        let job_id = batch.job_id;
        let nb_items = batch.items.len();

        async {
            info!("Received ingestion batch");

            // An unknown job or an unreachable job store is fatal for the
            // batch, not for the worker: the next batch still gets handled
            if let Err(error) = execute_handler(&worker, &batch).await {
                error!(?error, "Failed to handle ingestion batch");
            }
        }
        .instrument(info_span!(
            "Handling ingestion batch",
            job_id = %job_id,
            nb_items = nb_items,
        ))
        .await
    }

    info!("Ingestion batch queue closed, stopping the worker");
    Ok(())
}

#[derive(thiserror::Error)]
pub enum RegisterHandlerIngestionBatchError {
    #[error(transparent)]
    JobRepositoryError(#[from] IngestionJobRepositoryError),
}

impl std::fmt::Debug for RegisterHandlerIngestionBatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Processes every item of one batch, recording progress after each one.
///
/// A failing item is recorded in the job's error list and does not abort
/// the rest of the batch: the job always leaves `processing` once every
/// item has been attempted (or the batch was cancelled).
#[tracing::instrument(name = "Executing handler on ingestion batch", skip(worker, batch))]
pub async fn execute_handler(
    worker: &IngestionWorkerContext,
    batch: &IngestionBatch,
) -> Result<(), ExecuteHandlerIngestionBatchError> {
    let mut job = worker
        .job_repository
        .get(batch.job_id)
        .await?
        .ok_or(ExecuteHandlerIngestionBatchError::UnknownJob(batch.job_id))?;

    job.start_processing();
    worker.job_repository.update(&job).await?;

    for item in &batch.items {
        if worker.cancellation.is_cancelled() {
            job.fail(format!(
                "ingestion cancelled before item '{}' was processed",
                item
            ));
            worker.job_repository.update(&job).await?;
            info!("Ingestion batch cancelled");
            return Ok(());
        }

        match process_item(worker, item, batch.source, &batch.context).await {
            Ok(nb_chunks) => {
                info!(%item, nb_chunks, "Ingested item");
                job.record_item_success();
            }
            Err(error) => {
                error!(?error, %item, "Failed to ingest item");
                job.record_item_failure(format!("item '{}': {}", item, error));
            }
        }
        worker.job_repository.update(&job).await?;
    }

    job.finalize();
    worker.job_repository.update(&job).await?;

    info!(
        status = %job.status.to_string(),
        nb_errors = job.errors.len(),
        "Finished ingestion batch"
    );
    Ok(())
}

#[derive(thiserror::Error)]
pub enum ExecuteHandlerIngestionBatchError {
    #[error("No ingestion job was created for this batch: {0}")]
    UnknownJob(uuid::Uuid),
    #[error(transparent)]
    JobRepositoryError(#[from] IngestionJobRepositoryError),
}

impl std::fmt::Debug for ExecuteHandlerIngestionBatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Fetch, chunk, embed and store one item.
///
/// # Returns
/// The number of chunks stored for the item
async fn process_item(
    worker: &IngestionWorkerContext,
    item: &str,
    source: DocumentSource,
    context: &ChunkContext,
) -> Result<usize, IngestItemError> {
    let content = match source {
        DocumentSource::Upload => {
            let bytes = worker.object_storage.fetch(item).await?;
            String::from_utf8(bytes)?
        }
        DocumentSource::Url => worker.url_fetcher.fetch_text(item).await?,
    };

    let chunks = worker.chunker.chunk(&content);
    if chunks.is_empty() {
        info!(item, "Document contained no chunkable text");
        return Ok(0);
    }

    let vectors = worker.embeddings.embed_many(&chunks).await?;

    worker
        .chunk_repository
        .insert(&chunks, &vectors, context)
        .await?;

    Ok(chunks.len())
}

#[derive(thiserror::Error)]
pub enum IngestItemError {
    #[error("Failed to fetch document from storage: {0}")]
    Storage(#[from] ObjectStorageError),
    #[error("Failed to fetch document from URL: {0}")]
    UrlFetch(#[from] UrlFetchError),
    #[error("The document is not valid UTF-8 text: {0}")]
    InvalidText(#[from] std::string::FromUtf8Error),
    #[error("Failed to embed document chunks: {0}")]
    Embeddings(#[from] EmbeddingsProviderError),
    #[error("Failed to store document chunks: {0}")]
    ChunkStore(#[from] PolicyChunkRepositoryError),
}

impl std::fmt::Debug for IngestItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
