pub mod document_s3_repository;
pub mod ingestion_job_memory_repository;
pub mod ingestion_job_postgres_repository;
pub mod policy_chunk_memory_repository;
pub mod policy_chunk_postgres_repository;
