use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::entities::policy_chunk::{ChunkContext, ChunkFilters, ChunkStats, PolicyChunk};
use crate::domain::services::similarity::{cosine_distance, rank_candidates};
use crate::ports::policy_chunk_repository::{
    PolicyChunkRepositoryError, PolicyChunkRepositoryPort,
};

/// Postgres-backed chunk store.
///
/// Embeddings are stored as `REAL[]`; `search` pulls the candidate rows
/// matching the filters and ranks them in-process with an exact cosine
/// distance. Brute force is adequate at the per-insurer corpus sizes this
/// service holds; an index-side distance operator is the upgrade path when
/// it stops being adequate.
pub struct PolicyChunkPostgresRepository {
    pg_pool: PgPool,
}

impl PolicyChunkPostgresRepository {
    pub fn new(pg_pool: PgPool) -> Self {
        Self { pg_pool }
    }
}

#[async_trait]
impl PolicyChunkRepositoryPort for PolicyChunkPostgresRepository {
    #[tracing::instrument(name = "Saving policy chunks in database", skip_all, fields(nb_chunks = chunks.len()))]
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

        // One transaction per call: a failing row leaves nothing behind,
        // and concurrent searches never observe a partial batch
        let mut transaction = self.pg_pool.begin().await?;

        for (content, vector) in chunks.iter().zip(vectors.iter()) {
            let chunk = PolicyChunk::from_ingestion(content.clone(), vector.clone(), context);

            sqlx::query(
                r#"
    INSERT INTO policy_chunks
        (id, insurer, product, version, source_url, content, token_estimate, embedding, metadata, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(chunk.id)
            .bind(&chunk.insurer)
            .bind(&chunk.product)
            .bind(&chunk.version)
            .bind(&chunk.source_url)
            .bind(&chunk.content)
            .bind(chunk.token_estimate as i32)
            .bind(&chunk.embedding)
            .bind(&chunk.metadata)
            .bind(chunk.created_at)
            .execute(&mut transaction)
            .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    #[tracing::instrument(name = "Searching policy chunks in database", skip(self, query_vector))]
    async fn search(
        &self,
        query_vector: &[f32],
        filters: &ChunkFilters,
        top_k: usize,
    ) -> Result<Vec<(PolicyChunk, f32)>, PolicyChunkRepositoryError> {
        let rows = sqlx::query(
            r#"
    SELECT id, insurer, product, version, source_url, content, token_estimate, embedding, metadata, created_at
    FROM policy_chunks
    WHERE ($1::text IS NULL OR insurer = $1)
      AND ($2::text IS NULL OR product = $2)
      AND ($3::text IS NULL OR version = $3)
            "#,
        )
        .bind(filters.insurer.as_deref())
        .bind(filters.product.as_deref())
        .bind(filters.version.as_deref())
        .fetch_all(&self.pg_pool)
        .await?;

        let candidates = rows
            .into_iter()
            .map(|row| {
                let chunk = row_to_chunk(row)?;
                let distance = cosine_distance(query_vector, &chunk.embedding);
                Ok((chunk, distance))
            })
            .collect::<Result<Vec<(PolicyChunk, f32)>, sqlx::Error>>()?;

        Ok(rank_candidates(
            candidates,
            |chunk: &PolicyChunk| chunk.created_at,
            top_k,
        ))
    }

    #[tracing::instrument(name = "Deleting policy chunks in database", skip(self))]
    async fn delete(&self, filters: &ChunkFilters) -> Result<u64, PolicyChunkRepositoryError> {
        let result = sqlx::query(
            r#"
    DELETE FROM policy_chunks
    WHERE ($1::text IS NULL OR insurer = $1)
      AND ($2::text IS NULL OR product = $2)
      AND ($3::text IS NULL OR version = $3)
            "#,
        )
        .bind(filters.insurer.as_deref())
        .bind(filters.product.as_deref())
        .bind(filters.version.as_deref())
        .execute(&self.pg_pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(name = "Computing policy chunk stats", skip(self))]
    async fn stats(&self) -> Result<ChunkStats, PolicyChunkRepositoryError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM policy_chunks")
            .fetch_one(&self.pg_pool)
            .await?
            .try_get("count")?;

        let mut stats = ChunkStats {
            total: total as u64,
            ..ChunkStats::default()
        };

        let by_insurer =
            sqlx::query("SELECT insurer, COUNT(*) AS count FROM policy_chunks GROUP BY insurer")
                .fetch_all(&self.pg_pool)
                .await?;
        for row in by_insurer {
            let insurer: String = row.try_get("insurer")?;
            let count: i64 = row.try_get("count")?;
            stats.by_insurer.insert(insurer, count as u64);
        }

        let by_product =
            sqlx::query("SELECT product, COUNT(*) AS count FROM policy_chunks GROUP BY product")
                .fetch_all(&self.pg_pool)
                .await?;
        for row in by_product {
            let product: String = row.try_get("product")?;
            let count: i64 = row.try_get("count")?;
            stats.by_product.insert(product, count as u64);
        }

        Ok(stats)
    }
}

fn row_to_chunk(row: PgRow) -> Result<PolicyChunk, sqlx::Error> {
    let token_estimate: i32 = row.try_get("token_estimate")?;

    Ok(PolicyChunk {
        id: row.try_get::<Uuid, _>("id")?,
        insurer: row.try_get("insurer")?,
        product: row.try_get("product")?,
        version: row.try_get("version")?,
        source_url: row.try_get("source_url")?,
        content: row.try_get("content")?,
        token_estimate: token_estimate as usize,
        embedding: row.try_get::<Vec<f32>, _>("embedding")?,
        metadata: row.try_get::<JsonValue, _>("metadata")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
