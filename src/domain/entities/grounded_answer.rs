use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy_chunk::PolicyChunk;

/// Source identification carried along with every search result and citation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProvenance {
    pub insurer: String,
    pub product: String,
    pub version: Option<String>,
    pub source_url: Option<String>,
}

impl From<&PolicyChunk> for ChunkProvenance {
    fn from(chunk: &PolicyChunk) -> Self {
        Self {
            insurer: chunk.insurer.clone(),
            product: chunk.product.clone(),
            version: chunk.version.clone(),
            source_url: chunk.source_url.clone(),
        }
    }
}

/// A scored view of a stored chunk, as returned by the retriever.
/// Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSearchResult {
    pub id: Uuid,
    pub content: String,
    /// Normalized similarity in [0, 1], monotonically decreasing with the
    /// cosine distance to the query
    pub score: f32,
    pub provenance: ChunkProvenance,
}

/// A `[n]` marker of the generated answer, resolved to the search result
/// it points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Zero-based index into the retrieved results
    pub index: usize,
    /// The marker as it appeared in the answer, e.g. `[2]`
    pub marker: String,
    pub content: String,
    pub provenance: ChunkProvenance,
}

/// The final product of the answer composer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundedAnswer {
    pub content: String,
    pub citations: Vec<Citation>,
    /// Self-assessed confidence in [0, 1]
    pub confidence: f32,
}
