use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entities::ingestion_job::IngestionJob;
use crate::ports::ingestion_job_repository::{
    IngestionJobRepositoryError, IngestionJobRepositoryPort,
};

/// In-memory job tracker, used by the test suites and local runs
#[derive(Default)]
pub struct IngestionJobInMemoryRepository {
    jobs: RwLock<HashMap<Uuid, IngestionJob>>,
}

impl IngestionJobInMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IngestionJobRepositoryPort for IngestionJobInMemoryRepository {
    async fn create(&self, job: &IngestionJob) -> Result<(), IngestionJobRepositoryError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(
        &self,
        job_id: Uuid,
    ) -> Result<Option<IngestionJob>, IngestionJobRepositoryError> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn update(&self, job: &IngestionJob) -> Result<(), IngestionJobRepositoryError> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(IngestionJobRepositoryError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }
}
