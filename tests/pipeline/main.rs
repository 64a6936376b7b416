mod answering;
mod ingestion;
mod retrieval;
