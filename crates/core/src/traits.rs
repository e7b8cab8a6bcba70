use crate::error::{BackendError, EmbedError, IngestError, StrategyError};
use crate::generation::GenerationOptions;
use crate::models::{CandidateRecord, ChunkMatch, IndexPoint, QueryFilter};
use async_trait::async_trait;

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError>;
}

#[async_trait]
pub trait TextEmbedder: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Embeds a batch. The returned vectors are position-aligned with the
    /// input texts; any cardinality drift is an error, never a partial result.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

#[async_trait]
pub trait VectorIndexWriter: Send + Sync {
    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), IngestError>;
}

/// One mechanism for querying the vector index. Strategies are tried in a
/// fixed order by the coordinator; `Unsupported` and `Failed` both advance
/// to the next one, and no strategy is ever retried in place.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        query_vector: &[f32],
        filter: &QueryFilter,
        neighbor_count: usize,
    ) -> Result<Vec<ChunkMatch>, StrategyError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn put(&self, record: &CandidateRecord) -> Result<(), BackendError>;

    /// `Ok(None)` when the record does not exist; callers on the query path
    /// drop such hits silently rather than failing the query.
    async fn fetch(&self, candidate_id: &str) -> Result<Option<CandidateRecord>, BackendError>;
}
