pub mod answer;
pub mod auth;
pub mod chunking;
pub mod clients;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod reducer;
pub mod stores;
pub mod synthesizer;
pub mod traits;

pub use answer::{answer_query, AnswerOptions, QueryReport};
pub use auth::{TokenProvider, TokenSource};
pub use chunking::{
    build_chunks, derive_candidate_id, make_chunk_id, mint_candidate_id, parse_chunk_id,
    ParsedChunkId,
};
pub use clients::{Clients, PipelineConfig};
pub use embeddings::{RemoteEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    BackendError, EmbedError, IngestError, ParseStage, QueryError, Result, StrategyError,
};
pub use extractor::{merge_page_texts, LopdfExtractor, PageText, ResumeExtractor};
pub use generation::{GenerationOptions, RemoteModel};
pub use ingest::{
    discover_resume_files, object_path_for, parse_object_path, Ingestor, ObjectPath,
};
pub use models::{
    Answer, CandidateRecord, ChunkCategory, ChunkMatch, Education, EvidenceItem, IndexPoint,
    IngestOutcome, Project, QueryFilter, QueryIntent, Restriction, ResumeChunk, ResumeProfile,
    ScoredCandidate, SkipReason, WorkExperience,
};
pub use orchestrator::SearchCoordinator;
pub use reducer::reduce_matches;
pub use stores::{
    GenericMatchStrategy, HttpProfileStore, IndexTransport, MatchingIndexConfig,
    MatchingIndexWriter, NativeNeighborsStrategy, RawTransportStrategy, RetryPolicy,
};
pub use synthesizer::{
    build_answer_prompt, extract_intent, synthesize, SynthesisDegraded, SynthesisResult,
};
pub use traits::{
    GenerativeModel, ProfileStore, SearchStrategy, TextEmbedder, VectorIndexWriter,
};
