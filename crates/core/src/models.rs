use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const CANDIDATE_ID_PREFIX: &str = "cnd";

pub const RESTRICT_RECRUITER: &str = "recruiter_uuid";
pub const RESTRICT_BATCH: &str = "batch_tag";
pub const RESTRICT_CANDIDATE: &str = "candidate_id";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkExperience {
    pub company: String,
    pub title: String,
    pub start_date: String,
    pub end_date: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Education {
    pub institution: String,
    pub degree: String,
    pub graduation_date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Project {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResumeProfile {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub summary: String,
    pub skills: Vec<String>,
    pub work_experience: Vec<WorkExperience>,
    pub education: Vec<Education>,
    pub projects: Vec<Project>,
}

impl ResumeProfile {
    /// Total years of work experience, counting overlapping jobs once:
    /// per-entry year spans are merged into a timeline union before summing.
    pub fn experience_years(&self) -> u32 {
        let current_year = Utc::now().year();
        let mut spans: Vec<(i32, i32)> = Vec::new();
        for job in &self.work_experience {
            let Some(start) = first_year(&job.start_date) else {
                continue;
            };
            let end = end_year(&job.end_date, current_year);
            if end >= start {
                spans.push((start, end));
            }
        }
        spans.sort_unstable();

        let mut total = 0;
        let mut open: Option<(i32, i32)> = None;
        for (start, end) in spans {
            match open {
                Some((open_start, open_end)) if start <= open_end => {
                    open = Some((open_start, open_end.max(end)));
                }
                Some((open_start, open_end)) => {
                    total += open_end - open_start;
                    open = Some((start, end));
                }
                None => open = Some((start, end)),
            }
        }
        if let Some((open_start, open_end)) = open {
            total += open_end - open_start;
        }
        total.max(0) as u32
    }
}

fn first_year(date: &str) -> Option<i32> {
    let year = Regex::new(r"(19|20)\d{2}").ok()?;
    year.find(date)?.as_str().parse().ok()
}

fn end_year(date: &str, current_year: i32) -> i32 {
    let normalized = date.trim().to_lowercase();
    if normalized.is_empty() || normalized == "present" || normalized == "current" {
        return current_year;
    }
    first_year(&normalized).unwrap_or(current_year)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateRecord {
    pub candidate_id: String,
    pub recruiter_uuid: String,
    pub batch_tag: String,
    pub source_path: String,
    pub ingested_at: DateTime<Utc>,
    #[serde(flatten)]
    pub profile: ResumeProfile,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChunkCategory {
    Summary,
    Skills,
    Experience,
    Education,
    Project,
}

impl ChunkCategory {
    pub fn token(&self) -> &'static str {
        match self {
            ChunkCategory::Summary => "summary",
            ChunkCategory::Skills => "skills",
            ChunkCategory::Experience => "work",
            ChunkCategory::Education => "edu",
            ChunkCategory::Project => "project",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "summary" => Some(ChunkCategory::Summary),
            "skills" => Some(ChunkCategory::Skills),
            "work" => Some(ChunkCategory::Experience),
            "edu" => Some(ChunkCategory::Education),
            "project" => Some(ChunkCategory::Project),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumeChunk {
    pub chunk_id: String,
    pub candidate_id: String,
    pub category: ChunkCategory,
    pub ordinal: usize,
    pub text: String,
    pub recruiter_uuid: String,
    pub batch_tag: String,
}

impl ResumeChunk {
    /// Restriction tags for the index write: one per isolation granularity.
    pub fn restrictions(&self) -> Vec<Restriction> {
        vec![
            Restriction::single(RESTRICT_RECRUITER, &self.recruiter_uuid),
            Restriction::single(RESTRICT_BATCH, &self.batch_tag),
            Restriction::single(RESTRICT_CANDIDATE, &self.candidate_id),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Restriction {
    pub namespace: String,
    pub allow_list: Vec<String>,
}

impl Restriction {
    pub fn single(namespace: &str, value: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            allow_list: vec![value.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexPoint {
    pub datapoint_id: String,
    pub vector: Vec<f32>,
    pub restricts: Vec<Restriction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryFilter {
    pub recruiter_uuid: Option<String>,
    pub batch_tag: Option<String>,
}

impl QueryFilter {
    pub fn restrictions(&self) -> Vec<Restriction> {
        let mut restricts = Vec::new();
        if let Some(recruiter) = &self.recruiter_uuid {
            restricts.push(Restriction::single(RESTRICT_RECRUITER, recruiter));
        }
        if let Some(batch) = &self.batch_tag {
            restricts.push(Restriction::single(RESTRICT_BATCH, batch));
        }
        restricts
    }

    /// Client-side re-verification of the filter against a fetched record.
    /// Server-side restriction matching is advisory; this is the authority.
    pub fn admits(&self, record: &CandidateRecord) -> bool {
        if let Some(recruiter) = &self.recruiter_uuid {
            if record.recruiter_uuid != *recruiter {
                return false;
            }
        }
        if let Some(batch) = &self.batch_tag {
            if record.batch_tag != *batch {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMatch {
    pub chunk_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceItem {
    pub candidate_id: String,
    pub score: f64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub record: CandidateRecord,
    pub score: f64,
    pub evidence_text: String,
}

impl ScoredCandidate {
    pub fn evidence(&self) -> EvidenceItem {
        EvidenceItem {
            candidate_id: self.record.candidate_id.clone(),
            score: self.score,
            text: self.evidence_text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub text: String,
    pub best_candidate_id: Option<String>,
}

/// Structured filters pulled from a recruiter question before search.
/// Both fields only ever narrow the evidence set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryIntent {
    pub company: Option<String>,
    pub years_experience: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Ingested {
        candidate_id: String,
        chunks_indexed: usize,
    },
    Skipped {
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    MalformedPath(String),
    NoExtractableText,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MalformedPath(path) => {
                write!(f, "object path {path:?} is not <recruiter>/<batch>/<file>")
            }
            SkipReason::NoExtractableText => write!(f, "document has no extractable text"),
        }
    }
}
