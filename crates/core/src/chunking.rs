use crate::models::{
    CandidateRecord, ChunkCategory, ResumeChunk, ResumeProfile, WorkExperience,
    CANDIDATE_ID_PREFIX,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Mints the stable record id for a document: `cnd_<uuidv5>` seeded from the
/// owning recruiter, the batch, and the document digest. Re-ingesting the
/// same object derives the same id, which keeps re-runs duplicate-free.
pub fn mint_candidate_id(recruiter_uuid: &str, batch_tag: &str, document: &[u8]) -> String {
    let digest = Sha256::digest(document);
    let seed = format!("{recruiter_uuid}/{batch_tag}/{digest:x}");
    let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes());
    format!("{CANDIDATE_ID_PREFIX}_{uuid}")
}

pub fn make_chunk_id(candidate_id: &str, category: ChunkCategory, ordinal: usize) -> String {
    format!("{candidate_id}_{}_{ordinal}", category.token())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChunkId {
    pub candidate_id: String,
    pub category: ChunkCategory,
    pub ordinal: usize,
}

/// The one canonical decomposition of a chunk id. Search hits carry nothing
/// but this string, so it is the only link back to the parent record.
pub fn parse_chunk_id(chunk_id: &str) -> Option<ParsedChunkId> {
    let parts: Vec<&str> = chunk_id.split('_').collect();
    if parts.len() != 4 || parts[0] != CANDIDATE_ID_PREFIX {
        return None;
    }
    let category = ChunkCategory::from_token(parts[2])?;
    let ordinal = parts[3].parse().ok()?;
    Some(ParsedChunkId {
        candidate_id: format!("{}_{}", parts[0], parts[1]),
        category,
        ordinal,
    })
}

pub fn derive_candidate_id(chunk_id: &str) -> Option<String> {
    parse_chunk_id(chunk_id).map(|parsed| parsed.candidate_id)
}

/// Splits a record into its embeddable units. Pure and deterministic: the
/// same record always yields the same chunk set in the same order, which is
/// what lets the reducer re-derive an indexed chunk's text from the store.
pub fn build_chunks(record: &CandidateRecord) -> Vec<ResumeChunk> {
    let profile = &record.profile;
    let mut chunks = Vec::new();
    let mut push = |category: ChunkCategory, ordinal: usize, text: String| {
        chunks.push(ResumeChunk {
            chunk_id: make_chunk_id(&record.candidate_id, category, ordinal),
            candidate_id: record.candidate_id.clone(),
            category,
            ordinal,
            text,
            recruiter_uuid: record.recruiter_uuid.clone(),
            batch_tag: record.batch_tag.clone(),
        });
    };

    if !profile.summary.trim().is_empty() {
        push(ChunkCategory::Summary, 0, summary_text(profile));
    }
    if !profile.skills.is_empty() {
        push(ChunkCategory::Skills, 0, skills_text(profile));
    }
    for (ordinal, job) in profile.work_experience.iter().enumerate() {
        push(ChunkCategory::Experience, ordinal, experience_text(job));
    }
    for (ordinal, entry) in profile.education.iter().enumerate() {
        push(
            ChunkCategory::Education,
            ordinal,
            format!(
                "Education: {} from {}. Graduated: {}",
                entry.degree, entry.institution, entry.graduation_date
            ),
        );
    }
    for (ordinal, project) in profile.projects.iter().enumerate() {
        push(
            ChunkCategory::Project,
            ordinal,
            format!("Project: {}. Description: {}", project.name, project.description),
        );
    }

    chunks
}

fn summary_text(profile: &ResumeProfile) -> String {
    format!("Candidate: {}. Summary: {}", profile.name, profile.summary)
}

fn skills_text(profile: &ResumeProfile) -> String {
    format!("Skills for {}: {}", profile.name, profile.skills.join(", "))
}

fn experience_text(job: &WorkExperience) -> String {
    format!(
        "Job: {} at {}. Dates: {} to {}. Description: {}",
        job.title, job.company, job.start_date, job.end_date, job.description
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Education, Project};
    use chrono::Utc;

    fn record(profile: ResumeProfile) -> CandidateRecord {
        CandidateRecord {
            candidate_id: mint_candidate_id("rec-1", "batch-1", b"resume bytes"),
            recruiter_uuid: "rec-1".to_string(),
            batch_tag: "batch-1".to_string(),
            source_path: "rec-1/batch-1/cv.pdf".to_string(),
            ingested_at: Utc::now(),
            profile,
        }
    }

    fn full_profile() -> ResumeProfile {
        ResumeProfile {
            name: "Dana Hale".to_string(),
            summary: "Storage systems engineer.".to_string(),
            skills: vec!["rust".to_string(), "grpc".to_string()],
            work_experience: vec![
                WorkExperience {
                    company: "Acme".to_string(),
                    title: "Engineer".to_string(),
                    start_date: "2019".to_string(),
                    end_date: "2022".to_string(),
                    description: "Built object storage.".to_string(),
                },
                WorkExperience {
                    company: "Initech".to_string(),
                    title: "Senior Engineer".to_string(),
                    start_date: "2022".to_string(),
                    end_date: "Present".to_string(),
                    description: "Leads the index team.".to_string(),
                },
            ],
            education: vec![Education {
                institution: "State University".to_string(),
                degree: "BSc Computer Science".to_string(),
                graduation_date: "2018".to_string(),
            }],
            projects: vec![Project {
                name: "chunkd".to_string(),
                description: "A chunking daemon.".to_string(),
            }],
            ..ResumeProfile::default()
        }
    }

    #[test]
    fn minted_ids_are_stable_and_batch_scoped() {
        let first = mint_candidate_id("rec-1", "batch-1", b"same bytes");
        let again = mint_candidate_id("rec-1", "batch-1", b"same bytes");
        let other_batch = mint_candidate_id("rec-1", "batch-2", b"same bytes");

        assert_eq!(first, again);
        assert_ne!(first, other_batch);
        assert!(first.starts_with("cnd_"));
    }

    #[test]
    fn chunk_ids_parse_back_to_their_candidate() {
        let chunk_id = "cnd_6f9619ff-8b86-d011-b42d-00c04fc964ff_work_2";
        let parsed = parse_chunk_id(chunk_id).expect("well-formed id should parse");
        assert_eq!(
            parsed.candidate_id,
            "cnd_6f9619ff-8b86-d011-b42d-00c04fc964ff"
        );
        assert_eq!(parsed.category, ChunkCategory::Experience);
        assert_eq!(parsed.ordinal, 2);
        assert_eq!(
            derive_candidate_id(chunk_id).as_deref(),
            Some("cnd_6f9619ff-8b86-d011-b42d-00c04fc964ff")
        );
    }

    #[test]
    fn malformed_chunk_ids_are_rejected() {
        assert!(parse_chunk_id("cnd_only-three_summary").is_none());
        assert!(parse_chunk_id("doc_6f9619ff_summary_0").is_none());
        assert!(parse_chunk_id("cnd_6f9619ff_unknown_0").is_none());
        assert!(parse_chunk_id("cnd_6f9619ff_work_x").is_none());
        assert!(parse_chunk_id("").is_none());
    }

    #[test]
    fn empty_profile_yields_no_chunks() {
        let chunks = build_chunks(&record(ResumeProfile::default()));
        assert!(chunks.is_empty());
    }

    #[test]
    fn full_profile_chunks_in_category_order() {
        let record = record(full_profile());
        let chunks = build_chunks(&record);

        let prefix = format!("{}_", record.candidate_id);
        let ids: Vec<&str> = chunks
            .iter()
            .map(|chunk| chunk.chunk_id.strip_prefix(&prefix).unwrap_or(""))
            .collect();
        assert_eq!(
            ids,
            vec!["summary_0", "skills_0", "work_0", "work_1", "edu_0", "project_0"]
        );

        assert_eq!(
            chunks[0].text,
            "Candidate: Dana Hale. Summary: Storage systems engineer."
        );
        assert_eq!(chunks[1].text, "Skills for Dana Hale: rust, grpc");
        assert!(chunks[2].text.starts_with("Job: Engineer at Acme."));
        assert!(chunks[4].text.contains("BSc Computer Science"));
        for chunk in &chunks {
            assert_eq!(chunk.recruiter_uuid, "rec-1");
            assert_eq!(chunk.batch_tag, "batch-1");
            assert_eq!(
                derive_candidate_id(&chunk.chunk_id).as_deref(),
                Some(record.candidate_id.as_str())
            );
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let record = record(full_profile());
        assert_eq!(build_chunks(&record), build_chunks(&record));
    }
}
