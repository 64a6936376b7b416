pub mod answer_composer;
pub mod chunking;
pub mod openai_completions;
pub mod openai_embeddings;
pub mod rag_service;
pub mod retriever;
pub mod similarity;
pub mod url_fetcher;
