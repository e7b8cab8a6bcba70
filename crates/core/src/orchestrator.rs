use crate::error::{EmbedError, QueryError, StrategyError};
use crate::models::{ChunkMatch, QueryFilter};
use crate::traits::{SearchStrategy, TextEmbedder};
use std::sync::Arc;
use tracing::{debug, warn};

/// Walks an ordered list of search strategies until one answers.
///
/// A strategy that returns `Ok` ends the walk even when the match list is
/// empty; an empty index is an answer, not an outage. `Unsupported` and
/// `Failed` both advance to the next strategy, and no strategy is retried
/// within a single query.
pub struct SearchCoordinator {
    embedder: Arc<dyn TextEmbedder>,
    strategies: Vec<Arc<dyn SearchStrategy>>,
}

impl SearchCoordinator {
    pub fn new(embedder: Arc<dyn TextEmbedder>, strategies: Vec<Arc<dyn SearchStrategy>>) -> Self {
        Self {
            embedder,
            strategies,
        }
    }

    pub async fn find_chunks(
        &self,
        query_text: &str,
        filter: &QueryFilter,
        neighbor_count: usize,
    ) -> Result<Vec<ChunkMatch>, QueryError> {
        if query_text.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let vectors = self.embedder.embed(&[query_text.to_string()]).await?;
        let query_vector = vectors.into_iter().next().ok_or(EmbedError::Cardinality {
            submitted: 1,
            returned: 0,
        })?;

        let mut attempted = 0;
        for strategy in &self.strategies {
            attempted += 1;
            match strategy.search(&query_vector, filter, neighbor_count).await {
                Ok(matches) => {
                    debug!(
                        strategy = strategy.name(),
                        matches = matches.len(),
                        "search strategy answered"
                    );
                    return Ok(matches);
                }
                Err(StrategyError::Unsupported(detail)) => {
                    debug!(
                        strategy = strategy.name(),
                        %detail,
                        "search strategy unsupported by backend, advancing"
                    );
                }
                Err(StrategyError::Failed(detail)) => {
                    warn!(
                        strategy = strategy.name(),
                        %detail,
                        "search strategy failed, advancing"
                    );
                }
            }
        }

        Err(QueryError::SearchUnavailable { attempted })
    }
}
