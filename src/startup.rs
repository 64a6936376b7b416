use std::sync::Arc;

use s3::{creds::Credentials, Bucket, BucketConfiguration, Region};
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::configuration::{DatabaseSettings, ObjectStorageSettings, Settings};
use crate::domain::services::chunking::DocumentChunker;
use crate::domain::services::openai_completions::OpenAiCompletionsClient;
use crate::domain::services::openai_embeddings::OpenAiEmbeddingsClient;
use crate::domain::services::rag_service::RagService;
use crate::domain::services::url_fetcher::HttpUrlFetcher;
use crate::handlers::handler_ingestion_batch::{
    self, IngestionWorkerContext, RegisterHandlerIngestionBatchError,
};
use crate::ports::completions_provider::CompletionsProviderError;
use crate::ports::embeddings_provider::EmbeddingsProviderError;
use crate::ports::url_fetcher::UrlFetchError;
use crate::repositories::document_s3_repository::DocumentS3Repository;
use crate::repositories::ingestion_job_postgres_repository::IngestionJobPostgresRepository;
use crate::repositories::policy_chunk_postgres_repository::PolicyChunkPostgresRepository;

/// Holds the built service and the running ingestion worker
pub struct Application {
    rag_service: Arc<RagService>,
    worker_handle: JoinHandle<Result<(), RegisterHandlerIngestionBatchError>>,
    cancellation: CancellationToken,

    // S3
    // Used for integration tests
    s3_bucket: Bucket,
}

#[derive(thiserror::Error, Debug)]
pub enum ApplicationBuildError {
    #[error("S3 credentials error: {0}")]
    S3CredentialsError(#[from] s3::creds::error::CredentialsError),
    #[error(transparent)]
    S3Error(#[from] s3::error::S3Error),
    // Provider credentials are checked while building the clients so a
    // misconfiguration stops the process here, not mid-request
    #[error(transparent)]
    EmbeddingsProviderError(#[from] EmbeddingsProviderError),
    #[error(transparent)]
    CompletionsProviderError(#[from] CompletionsProviderError),
    #[error(transparent)]
    UrlFetcherError(#[from] UrlFetchError),
}

impl Application {
    #[tracing::instrument(name = "Building application", skip(settings))]
    pub async fn build(settings: Settings) -> Result<Self, ApplicationBuildError> {
        let connection_pool = get_connection_pool(&settings.database);

        let s3_bucket = set_up_s3(&settings.object_storage).await?;
        let object_storage = Arc::new(DocumentS3Repository::new(s3_bucket.clone()));

        let url_fetcher = Arc::new(HttpUrlFetcher::try_new(settings.ingestion.fetch_timeout())?);
        let embeddings = Arc::new(OpenAiEmbeddingsClient::try_new(&settings.embeddings)?);
        let completions = Arc::new(OpenAiCompletionsClient::try_new(&settings.completions)?);

        let chunk_repository = Arc::new(PolicyChunkPostgresRepository::new(connection_pool.clone()));
        let job_repository = Arc::new(IngestionJobPostgresRepository::new(connection_pool));

        let chunker = DocumentChunker::new(
            settings.ingestion.chunk_max_tokens,
            settings.ingestion.chunk_overlap_tokens,
        );

        let (batch_sender, batch_receiver) = mpsc::channel(settings.ingestion.queue_capacity);
        let cancellation = CancellationToken::new();

        let worker_handle = tokio::spawn(handler_ingestion_batch::register_handler(
            batch_receiver,
            IngestionWorkerContext {
                object_storage,
                url_fetcher,
                embeddings: embeddings.clone(),
                chunk_repository: chunk_repository.clone(),
                job_repository: job_repository.clone(),
                chunker,
                cancellation: cancellation.clone(),
            },
        ));

        let rag_service = Arc::new(RagService::new(
            embeddings,
            completions,
            chunk_repository,
            job_repository,
            batch_sender,
            settings.retrieval.default_top_k,
        ));

        Ok(Self {
            rag_service,
            worker_handle,
            cancellation,
            s3_bucket,
        })
    }

    pub fn rag_service(&self) -> Arc<RagService> {
        self.rag_service.clone()
    }

    pub fn s3_bucket(&self) -> Bucket {
        self.s3_bucket.clone()
    }

    /// Marks in-flight ingestion jobs failed instead of letting them hang
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Runs the application until the ingestion worker stops.
    ///
    /// The worker runs as long as a `RagService` handle keeps the batch
    /// queue open; self is moved in order for the application not to drop
    /// out of scope.
    pub async fn run_until_stopped(self) -> Result<(), RegisterHandlerIngestionBatchError> {
        let result = self.worker_handle.await.unwrap_or(Ok(()));

        info!("👋 Bye!");
        result
    }
}

pub fn get_connection_pool(settings: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(settings.with_db())
}

/// Sets up the S3 object storage
///
/// Each environment will use 1 bucket.
/// This bucket is created if it does not exist yet.
///
/// # Returns
/// An initialized bucket
#[tracing::instrument(name = "Setting up S3 object store")]
pub async fn set_up_s3(settings: &ObjectStorageSettings) -> Result<Bucket, ApplicationBuildError> {
    let region = Region::Custom {
        region: settings.region.to_owned(),
        endpoint: settings.endpoint(),
    };

    let credentials = Credentials::new(
        Some(&settings.username),
        Some(settings.password.expose_secret()),
        None,
        None,
        None,
    )?;

    // Instantiates/gets the bucket if it exists
    let bucket =
        Bucket::new(&settings.bucket_name, region.clone(), credentials.clone())?.with_path_style();

    let config = BucketConfiguration::default();

    // Checks if the bucket exist
    if let Err(error) = bucket.head_object("/").await {
        // Only continues if the error is a bucket not found (404)
        match error {
            s3::error::S3Error::Http(code, _) => {
                if code != 404 {
                    return Err(ApplicationBuildError::S3Error(error));
                }
            }
            _ => return Err(ApplicationBuildError::S3Error(error)),
        }

        info!("Unknown bucket {}, creating it ...", settings.bucket_name);

        Bucket::create_with_path_style(&settings.bucket_name, region, credentials, config).await?;
    }

    info!(
        "Bucket {} has been correctly instantiated",
        settings.bucket_name
    );
    Ok(bucket)
}
