pub mod grounded_answer;
pub mod ingestion_batch;
pub mod ingestion_job;
pub mod policy_chunk;
