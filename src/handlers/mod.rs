pub mod handler_ingestion_batch;
