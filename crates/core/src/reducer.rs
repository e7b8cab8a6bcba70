use crate::chunking::{build_chunks, parse_chunk_id};
use crate::error::QueryError;
use crate::models::{CandidateRecord, ChunkMatch, QueryFilter, ScoredCandidate};
use crate::traits::ProfileStore;
use std::collections::HashMap;
use tracing::{debug, warn};

struct BestChunk {
    chunk_id: String,
    score: f64,
}

/// Collapses chunk-level matches into ranked candidate records.
///
/// Each candidate keeps the score of its best chunk. Records the index
/// mentions but the store no longer holds are dropped quietly; records that
/// no longer satisfy the filter are dropped loudly, since the index was
/// supposed to have filtered them already.
pub async fn reduce_matches(
    matches: &[ChunkMatch],
    filter: &QueryFilter,
    store: &dyn ProfileStore,
    max_records: usize,
) -> Result<Vec<ScoredCandidate>, QueryError> {
    let mut best: HashMap<String, BestChunk> = HashMap::new();
    for hit in matches {
        let parsed = match parse_chunk_id(&hit.chunk_id) {
            Some(parsed) => parsed,
            None => {
                warn!(chunk_id = %hit.chunk_id, "index returned an unparseable chunk id, skipping");
                continue;
            }
        };
        let entry = best.entry(parsed.candidate_id).or_insert(BestChunk {
            chunk_id: hit.chunk_id.clone(),
            score: hit.score,
        });
        if hit.score > entry.score {
            entry.chunk_id = hit.chunk_id.clone();
            entry.score = hit.score;
        }
    }

    let mut ranked: Vec<(String, BestChunk)> = best.into_iter().collect();
    ranked.sort_by(|left, right| {
        right
            .1
            .score
            .total_cmp(&left.1.score)
            .then_with(|| left.0.cmp(&right.0))
    });
    ranked.truncate(max_records);

    let mut candidates = Vec::with_capacity(ranked.len());
    for (candidate_id, top) in ranked {
        let record = match store.fetch(&candidate_id).await? {
            Some(record) => record,
            None => {
                debug!(%candidate_id, "index points at a record the store no longer holds, dropping");
                continue;
            }
        };
        if !filter.admits(&record) {
            warn!(%candidate_id, "record failed filter re-verification, dropping");
            continue;
        }
        let evidence_text = evidence_for(&record, &top.chunk_id);
        candidates.push(ScoredCandidate {
            record,
            score: top.score,
            evidence_text,
        });
    }

    Ok(candidates)
}

/// Chunking is deterministic, so rebuilding the record's chunks recovers the
/// exact text the matched vector was minted from. Falls back to the summary
/// when the stored profile no longer produces that chunk.
fn evidence_for(record: &CandidateRecord, chunk_id: &str) -> String {
    for chunk in build_chunks(record) {
        if chunk.chunk_id == chunk_id {
            return chunk.text;
        }
    }
    if !record.profile.summary.trim().is_empty() {
        return record.profile.summary.clone();
    }
    String::new()
}
