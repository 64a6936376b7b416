use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::entities::ingestion_job::{IngestionJob, IngestionJobStatus};
use crate::ports::ingestion_job_repository::{
    IngestionJobRepositoryError, IngestionJobRepositoryPort,
};

/// Postgres-backed job tracker.
///
/// The progress percentage is derived from the stored item counts, it has
/// no column of its own.
pub struct IngestionJobPostgresRepository {
    pg_pool: PgPool,
}

impl IngestionJobPostgresRepository {
    pub fn new(pg_pool: PgPool) -> Self {
        Self { pg_pool }
    }
}

#[async_trait]
impl IngestionJobRepositoryPort for IngestionJobPostgresRepository {
    #[tracing::instrument(name = "Saving new ingestion job in database", skip(self, job), fields(job_id = %job.id))]
    async fn create(&self, job: &IngestionJob) -> Result<(), IngestionJobRepositoryError> {
        sqlx::query(
            r#"
    INSERT INTO ingestion_jobs (id, status, total_items, processed_items, errors, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id)
        .bind(job.status.to_string())
        .bind(job.total_items as i32)
        .bind(job.processed_items as i32)
        .bind(&job.errors)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pg_pool)
        .await?;

        Ok(())
    }

    async fn get(
        &self,
        job_id: Uuid,
    ) -> Result<Option<IngestionJob>, IngestionJobRepositoryError> {
        let row = sqlx::query(
            r#"
    SELECT id, status, total_items, processed_items, errors, created_at, updated_at
    FROM ingestion_jobs
    WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pg_pool)
        .await?;

        row.map(row_to_job).transpose()
    }

    #[tracing::instrument(name = "Updating ingestion job in database", skip(self, job), fields(job_id = %job.id))]
    async fn update(&self, job: &IngestionJob) -> Result<(), IngestionJobRepositoryError> {
        let result = sqlx::query(
            r#"
    UPDATE ingestion_jobs
    SET status = $2, processed_items = $3, errors = $4, updated_at = $5
    WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.to_string())
        .bind(job.processed_items as i32)
        .bind(&job.errors)
        .bind(job.updated_at)
        .execute(&self.pg_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IngestionJobRepositoryError::NotFound(job.id));
        }

        Ok(())
    }
}

fn row_to_job(row: PgRow) -> Result<IngestionJob, IngestionJobRepositoryError> {
    let status: String = row.try_get("status")?;
    let status = IngestionJobStatus::from_str(&status)
        .map_err(IngestionJobRepositoryError::InvalidRecord)?;

    let total_items: i32 = row.try_get("total_items")?;
    let processed_items: i32 = row.try_get("processed_items")?;

    Ok(IngestionJob {
        id: row.try_get::<Uuid, _>("id")?,
        status,
        total_items: total_items as usize,
        processed_items: processed_items as usize,
        errors: row.try_get::<Vec<String>, _>("errors")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}
