use crate::chunking::{build_chunks, mint_candidate_id};
use crate::error::IngestError;
use crate::extractor::{merge_page_texts, ResumeExtractor};
use crate::models::{CandidateRecord, IndexPoint, IngestOutcome, SkipReason};
use crate::parser::parse_profile;
use crate::traits::{GenerativeModel, ProfileStore, TextEmbedder, VectorIndexWriter};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

/// A storage object path split into its tenancy coordinates. The grammar is
/// `<recruiter_uuid>/<batch_tag>/<file name>`, with deeper nesting folded
/// into the file name.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPath {
    pub recruiter_uuid: String,
    pub batch_tag: String,
    pub file_name: String,
}

pub fn parse_object_path(object_path: &str) -> Option<ObjectPath> {
    let segments: Vec<&str> = object_path.split('/').collect();
    if segments.len() < 3 {
        return None;
    }
    if segments[0].trim().is_empty() || segments[1].trim().is_empty() {
        return None;
    }
    let file_name = segments[2..].join("/");
    if file_name.trim().is_empty() {
        return None;
    }
    Some(ObjectPath {
        recruiter_uuid: segments[0].to_string(),
        batch_tag: segments[1].to_string(),
        file_name,
    })
}

pub fn discover_resume_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort_unstable();
    files
}

/// Builds the object path for a local file, keeping the folder-relative part
/// as the file name so nested folders survive the round trip.
pub fn object_path_for(recruiter_uuid: &str, batch_tag: &str, file: &Path, base: &Path) -> String {
    let name = file
        .strip_prefix(base)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/");
    format!("{recruiter_uuid}/{batch_tag}/{name}")
}

/// The ingestion pipeline: extract, parse, persist the record, chunk, embed,
/// index. The record is durable before any vector work starts, so a failed
/// index write never strands an unparseable id in the index.
pub struct Ingestor {
    extractor: Arc<dyn ResumeExtractor>,
    model: Arc<dyn GenerativeModel>,
    embedder: Arc<dyn TextEmbedder>,
    index_writer: Arc<dyn VectorIndexWriter>,
    store: Arc<dyn ProfileStore>,
}

impl Ingestor {
    pub fn new(
        extractor: Arc<dyn ResumeExtractor>,
        model: Arc<dyn GenerativeModel>,
        embedder: Arc<dyn TextEmbedder>,
        index_writer: Arc<dyn VectorIndexWriter>,
        store: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            extractor,
            model,
            embedder,
            index_writer,
            store,
        }
    }

    pub async fn ingest_object(
        &self,
        object_path: &str,
        bytes: &[u8],
    ) -> Result<IngestOutcome, IngestError> {
        let Some(parsed_path) = parse_object_path(object_path) else {
            info!(object_path, "skipping object with malformed path");
            return Ok(IngestOutcome::Skipped {
                reason: SkipReason::MalformedPath(object_path.to_string()),
            });
        };

        let pages = self.extractor.extract_pages(bytes)?;
        let text = merge_page_texts(&pages);
        if text.trim().is_empty() {
            info!(object_path, "skipping document with no extractable text");
            return Ok(IngestOutcome::Skipped {
                reason: SkipReason::NoExtractableText,
            });
        }

        let profile = parse_profile(self.model.as_ref(), &text).await?;
        let candidate_id = mint_candidate_id(
            &parsed_path.recruiter_uuid,
            &parsed_path.batch_tag,
            bytes,
        );
        let record = CandidateRecord {
            candidate_id: candidate_id.clone(),
            recruiter_uuid: parsed_path.recruiter_uuid,
            batch_tag: parsed_path.batch_tag,
            source_path: object_path.to_string(),
            ingested_at: Utc::now(),
            profile,
        };
        self.store.put(&record).await?;

        let chunks = build_chunks(&record);
        if chunks.is_empty() {
            debug!(%candidate_id, "record produced no chunks, stored without vectors");
            return Ok(IngestOutcome::Ingested {
                candidate_id,
                chunks_indexed: 0,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        let points: Vec<IndexPoint> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexPoint {
                datapoint_id: chunk.chunk_id.clone(),
                vector,
                restricts: chunk.restrictions(),
            })
            .collect();
        self.index_writer.upsert(&points).await?;

        info!(%candidate_id, chunks = points.len(), "ingested resume");
        Ok(IngestOutcome::Ingested {
            candidate_id,
            chunks_indexed: points.len(),
        })
    }
}
