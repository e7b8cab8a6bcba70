use thiserror::Error;

/// Which step of the structured-record extraction gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    JsonDecode,
    Shape,
}

impl ParseStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStage::JsonDecode => "json_decode",
            ParseStage::Shape => "shape",
        }
    }
}

impl std::fmt::Display for ParseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level or protocol-level failure from any remote service.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid response from {backend}: {details}")]
    BadResponse { backend: &'static str, details: String },

    #[error("{backend} returned status {status}: {details}")]
    Status {
        backend: &'static str,
        status: u16,
        details: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("auth token unavailable: {0}")]
    Auth(String),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding count {returned} does not match {submitted} submitted texts")]
    Cardinality { submitted: usize, returned: usize },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Outcome of one query strategy attempt. Both variants advance the
/// orchestrator to the next strategy; they differ only in how they are logged.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("strategy not supported by index endpoint: {0}")]
    Unsupported(String),

    #[error("strategy failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("profile parse failed at {stage}: {detail}")]
    Parse { stage: ParseStage, detail: String },

    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index write failed after {attempts} attempts: {detail}")]
    IndexWriteFailed { attempts: u32, detail: String },

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query text is empty")]
    EmptyQuery,

    #[error("all {attempted} search strategies failed")]
    SearchUnavailable { attempted: usize },

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

/// Caps free-form backend payload text before it lands in an error detail.
pub(crate) fn clip_details(text: &str) -> String {
    const MAX_CHARS: usize = 300;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    let clipped: String = text.chars().take(MAX_CHARS).collect();
    format!("{clipped}…")
}
