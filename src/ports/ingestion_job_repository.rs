use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::entities::ingestion_job::IngestionJob;
use crate::helper::error_chain_fmt;

/// Port owning `IngestionJob` persistence.
///
/// Only the ingestion worker mutates jobs (single-writer discipline), so
/// repeated `get` calls without new processing return identical snapshots.
#[async_trait]
pub trait IngestionJobRepositoryPort: Send + Sync {
    async fn create(&self, job: &IngestionJob) -> Result<(), IngestionJobRepositoryError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<IngestionJob>, IngestionJobRepositoryError>;

    async fn update(&self, job: &IngestionJob) -> Result<(), IngestionJobRepositoryError>;
}

#[derive(thiserror::Error)]
pub enum IngestionJobRepositoryError {
    #[error("Ingestion job {0} was not found")]
    NotFound(Uuid),
    #[error("Invalid ingestion job record: {0}")]
    InvalidRecord(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl std::fmt::Debug for IngestionJobRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
