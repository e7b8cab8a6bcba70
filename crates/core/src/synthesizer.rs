use crate::generation::GenerationOptions;
use crate::models::{Answer, EvidenceItem, QueryIntent};
use crate::parser::value_from_reply;
use crate::traits::GenerativeModel;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

const NO_EVIDENCE_MARKER: &str = "No relevant chunks found.";
const EVIDENCE_SEPARATOR: &str = "\n\n---\n\n";

/// A degraded answer: the model was reached but its reply could not be
/// validated, or the model could not be reached at all. The fallback is
/// still usable, but a caller can never mistake it for a validated one.
#[derive(Debug, Error)]
#[error("answer synthesis degraded: {detail}")]
pub struct SynthesisDegraded {
    pub detail: String,
    pub fallback: Answer,
}

pub type SynthesisResult = Result<Answer, SynthesisDegraded>;

/// Builds a grounded prompt over the evidence set and asks the model for a
/// structured answer. Every failure mode still produces an answer, but only
/// a validated one comes back as `Ok`.
pub async fn synthesize(
    model: &dyn GenerativeModel,
    query: &str,
    evidence: &[EvidenceItem],
) -> SynthesisResult {
    let prompt = build_answer_prompt(query, evidence);
    let options = GenerationOptions::deterministic_json();

    let reply = match model.generate(&prompt, &options).await {
        Ok(reply) => reply,
        Err(error) => {
            warn!(%error, "generative model unreachable during synthesis");
            return Err(SynthesisDegraded {
                detail: format!("model call failed: {error}"),
                fallback: Answer {
                    text: mechanical_answer(evidence),
                    best_candidate_id: backfill_best_id(evidence),
                },
            });
        }
    };

    match answer_from_reply(&reply, evidence) {
        Some(answer) => Ok(answer),
        None => {
            debug!("model reply was not a structured answer, degrading to raw text");
            Err(SynthesisDegraded {
                detail: "model reply was not a structured answer".to_string(),
                fallback: Answer {
                    text: reply.trim().to_string(),
                    best_candidate_id: backfill_best_id(evidence),
                },
            })
        }
    }
}

pub fn build_answer_prompt(query: &str, evidence: &[EvidenceItem]) -> String {
    let context = if evidence.is_empty() {
        NO_EVIDENCE_MARKER.to_string()
    } else {
        evidence
            .iter()
            .map(|item| {
                format!(
                    "Record {} (score {:.3})\n{}",
                    item.candidate_id, item.score, item.text
                )
            })
            .collect::<Vec<_>>()
            .join(EVIDENCE_SEPARATOR)
    };

    format!(
        "You are a recruiting assistant. Answer the question using only the \
         candidate records below. If the records do not contain the answer, \
         say so plainly.\n\n\
         CANDIDATE RECORDS:\n{context}\n\n\
         QUESTION: {query}\n\n\
         Reply with a JSON object: {{\"answer\": string, \
         \"best_candidate_id\": string or null}}. The best_candidate_id must \
         be one of the record ids above, or null.\n\
         JSON OUTPUT:"
    )
}

fn answer_from_reply(reply: &str, evidence: &[EvidenceItem]) -> Option<Answer> {
    let value = value_from_reply(reply).ok()?;
    let object = value.as_object()?;
    let text = object.get("answer").and_then(Value::as_str)?.to_string();
    let best_candidate_id = object
        .get("best_candidate_id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .or_else(|| backfill_best_id(evidence));
    Some(Answer {
        text,
        best_candidate_id,
    })
}

fn backfill_best_id(evidence: &[EvidenceItem]) -> Option<String> {
    evidence
        .iter()
        .max_by(|left, right| left.score.total_cmp(&right.score))
        .map(|item| item.candidate_id.clone())
}

fn mechanical_answer(evidence: &[EvidenceItem]) -> String {
    if evidence.is_empty() {
        return "No matching candidate records were found for this query.".to_string();
    }
    let ids: Vec<&str> = evidence
        .iter()
        .map(|item| item.candidate_id.as_str())
        .collect();
    format!(
        "Retrieved candidate records, strongest match first: {}.",
        ids.join(", ")
    )
}

/// Pulls the structured filters out of a recruiter question before search.
/// Intent extraction is best-effort: any failure degrades to an empty intent
/// so the query itself never dies here.
pub async fn extract_intent(model: &dyn GenerativeModel, query: &str) -> QueryIntent {
    let prompt = format!(
        "Extract search filters from this recruiter question. Reply with a \
         JSON object: {{\"company\": string or null, \"years_experience\": \
         number or null}}. Use null for anything the question does not \
         mention.\n\nQUESTION: {query}\n\nJSON OUTPUT:"
    );
    let options = GenerationOptions::deterministic_json();

    let reply = match model.generate(&prompt, &options).await {
        Ok(reply) => reply,
        Err(error) => {
            warn!(%error, "intent extraction call failed, searching without filters");
            return QueryIntent::default();
        }
    };

    match value_from_reply(&reply) {
        Ok(value) => intent_from_value(&value),
        Err(error) => {
            warn!(%error, "intent reply was not JSON, searching without filters");
            QueryIntent::default()
        }
    }
}

fn intent_from_value(value: &Value) -> QueryIntent {
    QueryIntent {
        company: value
            .get("company")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|company| !company.is_empty() && !company.eq_ignore_ascii_case("null"))
            .map(str::to_string),
        years_experience: value
            .get("years_experience")
            .and_then(Value::as_f64)
            .filter(|years| *years >= 0.0)
            .map(|years| years as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use async_trait::async_trait;
    use serde_json::json;

    struct CannedModel {
        reply: String,
    }

    impl CannedModel {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
            }
        }
    }

    #[async_trait]
    impl GenerativeModel for CannedModel {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, BackendError> {
            Ok(self.reply.clone())
        }
    }

    struct UnreachableModel;

    #[async_trait]
    impl GenerativeModel for UnreachableModel {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, BackendError> {
            Err(BackendError::Auth("token endpoint down".to_string()))
        }
    }

    fn evidence(candidate_id: &str, score: f64, text: &str) -> EvidenceItem {
        EvidenceItem {
            candidate_id: candidate_id.to_string(),
            score,
            text: text.to_string(),
        }
    }

    #[test]
    fn prompt_blocks_are_labeled_and_separated() {
        let items = vec![
            evidence("cnd_a", 0.9, "Rust engineer"),
            evidence("cnd_b", 0.4, "Go engineer"),
        ];
        let prompt = build_answer_prompt("who knows rust?", &items);
        assert!(prompt.contains("Record cnd_a (score 0.900)\nRust engineer"));
        assert!(prompt.contains("Record cnd_b (score 0.400)\nGo engineer"));
        assert!(prompt.contains(EVIDENCE_SEPARATOR));
        assert!(prompt.contains("QUESTION: who knows rust?"));
    }

    #[test]
    fn empty_evidence_uses_the_no_evidence_marker() {
        let prompt = build_answer_prompt("anyone?", &[]);
        assert!(prompt.contains(NO_EVIDENCE_MARKER));
        assert!(!prompt.contains("Record "));
    }

    #[tokio::test]
    async fn structured_reply_becomes_a_validated_answer() {
        let model = CannedModel::replying(
            r#"{"answer": "cnd_a has the strongest Rust background.", "best_candidate_id": "cnd_a"}"#,
        );
        let items = vec![evidence("cnd_a", 0.9, "Rust engineer")];

        let answer = synthesize(&model, "who knows rust?", &items)
            .await
            .expect("validated answer");
        assert_eq!(answer.text, "cnd_a has the strongest Rust background.");
        assert_eq!(answer.best_candidate_id.as_deref(), Some("cnd_a"));
    }

    #[tokio::test]
    async fn null_best_id_is_backfilled_from_top_evidence() {
        let model = CannedModel::replying(
            r#"{"answer": "Two candidates match.", "best_candidate_id": null}"#,
        );
        let items = vec![
            evidence("cnd_low", 0.3, "junior"),
            evidence("cnd_high", 0.8, "senior"),
        ];

        let answer = synthesize(&model, "who matches?", &items)
            .await
            .expect("validated answer");
        assert_eq!(answer.best_candidate_id.as_deref(), Some("cnd_high"));
    }

    #[tokio::test]
    async fn prose_reply_degrades_to_raw_text_with_backfill() {
        let model = CannedModel::replying("Honestly, the first candidate looks great.");
        let items = vec![evidence("cnd_a", 0.9, "Rust engineer")];

        let degraded = synthesize(&model, "who knows rust?", &items)
            .await
            .expect_err("prose reply cannot validate");
        assert_eq!(
            degraded.fallback.text,
            "Honestly, the first candidate looks great."
        );
        assert_eq!(degraded.fallback.best_candidate_id.as_deref(), Some("cnd_a"));
    }

    #[tokio::test]
    async fn unreachable_model_degrades_to_a_mechanical_listing() {
        let items = vec![
            evidence("cnd_high", 0.8, "senior"),
            evidence("cnd_low", 0.3, "junior"),
        ];

        let degraded = synthesize(&UnreachableModel, "who matches?", &items)
            .await
            .expect_err("unreachable model cannot validate");
        assert!(degraded.fallback.text.contains("cnd_high, cnd_low"));
        assert_eq!(
            degraded.fallback.best_candidate_id.as_deref(),
            Some("cnd_high")
        );
    }

    #[tokio::test]
    async fn no_evidence_leaves_best_id_unset() {
        let model =
            CannedModel::replying(r#"{"answer": "No candidates found.", "best_candidate_id": null}"#);
        let answer = synthesize(&model, "anyone?", &[])
            .await
            .expect("validated answer");
        assert!(answer.best_candidate_id.is_none());
    }

    #[tokio::test]
    async fn intent_extraction_reads_company_and_years() {
        let model = CannedModel::replying(r#"{"company": "Google", "years_experience": 5}"#);
        let intent = extract_intent(&model, "5 years at Google?").await;
        assert_eq!(intent.company.as_deref(), Some("Google"));
        assert_eq!(intent.years_experience, Some(5));
    }

    #[tokio::test]
    async fn intent_extraction_never_fails_the_query() {
        let intent = extract_intent(&UnreachableModel, "anyone?").await;
        assert!(intent.company.is_none());
        assert!(intent.years_experience.is_none());

        let prose = CannedModel::replying("no filters that I can see");
        let intent = extract_intent(&prose, "anyone?").await;
        assert_eq!(intent, QueryIntent::default());

        let nulls = CannedModel::replying(r#"{"company": null, "years_experience": null}"#);
        let intent = extract_intent(&nulls, "anyone?").await;
        assert_eq!(intent, QueryIntent::default());
    }

    #[test]
    fn intent_value_normalizes_blank_and_null_strings() {
        let intent = intent_from_value(&json!({"company": "  ", "years_experience": 3.0}));
        assert!(intent.company.is_none());
        assert_eq!(intent.years_experience, Some(3));

        let intent = intent_from_value(&json!({"company": "null"}));
        assert!(intent.company.is_none());
    }
}
