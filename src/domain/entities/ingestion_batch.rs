use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy_chunk::ChunkContext;

/// Where the raw documents of a batch come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    /// Items are object-storage keys of previously uploaded files
    Upload,
    /// Items are URLs fetched over HTTP
    Url,
}

/// The message queued for the ingestion worker: one batch of items to
/// process sequentially, all stamped with the same chunk context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionBatch {
    /// Id of the `IngestionJob` tracking this batch
    pub job_id: Uuid,

    /// Storage keys or URLs, processed in order
    pub items: Vec<String>,

    pub source: DocumentSource,

    pub context: ChunkContext,
}
