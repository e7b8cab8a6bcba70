use crate::error::QueryError;
use crate::models::{Answer, EvidenceItem, QueryFilter, QueryIntent, ScoredCandidate};
use crate::orchestrator::SearchCoordinator;
use crate::reducer::reduce_matches;
use crate::synthesizer::{extract_intent, synthesize};
use crate::traits::{GenerativeModel, ProfileStore};
use tracing::{debug, warn};

/// Extra chunk matches requested per wanted record, so reduction still has
/// enough distinct candidates after chunks collapse onto their records.
const CHUNK_FETCH_FACTOR: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct AnswerOptions {
    pub top_k: usize,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// A served answer plus what it was grounded on. `degraded` marks answers
/// assembled without a validated model reply.
#[derive(Debug)]
pub struct QueryReport {
    pub answer: Answer,
    pub degraded: bool,
    pub evidence: Vec<EvidenceItem>,
}

/// The full query flow: intent extraction, chunk search, reduction to
/// records, intent narrowing, then grounded synthesis.
pub async fn answer_query(
    model: &dyn GenerativeModel,
    coordinator: &SearchCoordinator,
    store: &dyn ProfileStore,
    query: &str,
    filter: &QueryFilter,
    options: &AnswerOptions,
) -> Result<QueryReport, QueryError> {
    if query.trim().is_empty() {
        return Err(QueryError::EmptyQuery);
    }

    let intent = extract_intent(model, query).await;
    let matches = coordinator
        .find_chunks(query, filter, options.top_k * CHUNK_FETCH_FACTOR)
        .await?;
    let mut candidates = reduce_matches(&matches, filter, store, options.top_k).await?;
    apply_intent(&mut candidates, &intent);

    let evidence: Vec<EvidenceItem> = candidates.iter().map(ScoredCandidate::evidence).collect();
    match synthesize(model, query, &evidence).await {
        Ok(answer) => Ok(QueryReport {
            answer,
            degraded: false,
            evidence,
        }),
        Err(degraded) => {
            warn!(detail = %degraded.detail, "serving degraded answer");
            Ok(QueryReport {
                answer: degraded.fallback,
                degraded: true,
                evidence,
            })
        }
    }
}

fn apply_intent(candidates: &mut Vec<ScoredCandidate>, intent: &QueryIntent) {
    if let Some(company) = &intent.company {
        let needle = company.to_lowercase();
        let before = candidates.len();
        candidates.retain(|candidate| mentions_company(candidate, &needle));
        if candidates.len() < before {
            debug!(
                company = %company,
                kept = candidates.len(),
                "narrowed candidates by company"
            );
        }
    }
    if let Some(min_years) = intent.years_experience {
        let before = candidates.len();
        candidates.retain(|candidate| candidate.record.profile.experience_years() >= min_years);
        if candidates.len() < before {
            debug!(
                min_years,
                kept = candidates.len(),
                "narrowed candidates by experience years"
            );
        }
    }
}

fn mentions_company(candidate: &ScoredCandidate, needle: &str) -> bool {
    if candidate.evidence_text.to_lowercase().contains(needle) {
        return true;
    }
    candidate
        .record
        .profile
        .work_experience
        .iter()
        .any(|job| job.company.to_lowercase().contains(needle))
}
