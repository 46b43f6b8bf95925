use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("docx parse error: {0}")]
    DocxParse(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failure of an external model service (embedding or generation).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("{backend} returned {status}: {details}")]
    BackendResponse {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("malformed response from {backend}: {details}")]
    Malformed { backend: String, details: String },

    #[error("{backend} call timed out after {after:?}")]
    Timeout { backend: String, after: Duration },

    #[error("embedding dimension {actual} does not match expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl ModelError {
    /// Whether a second attempt has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Timeout { .. } => true,
            ModelError::Http(error) => {
                error.is_timeout()
                    || error.is_connect()
                    || error.is_request()
                    || error
                        .status()
                        .is_some_and(|status| status.is_server_error() || status.as_u16() == 429)
            }
            ModelError::BackendResponse { status, .. } => *status >= 500 || *status == 429,
            ModelError::Url(_) | ModelError::Malformed { .. } | ModelError::DimensionMismatch { .. } => {
                false
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no index snapshot at {0}")]
    MissingSnapshot(PathBuf),

    #[error("index snapshot at {0} is being rebuilt")]
    SnapshotBusy(PathBuf),

    #[error("index snapshot checksum mismatch: manifest has {expected}, file has {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("unsupported snapshot format version {0}")]
    UnsupportedFormat(u32),

    #[error("index was built with embedding model {built} but {configured} is configured")]
    ModelMismatch { built: String, configured: String },

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid index input: {0}")]
    InvalidInput(String),
}

/// Failure while answering a single question.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("query embedding failed: {0}")]
    Embedding(#[source] ModelError),

    #[error("index search failed: {0}")]
    Index(#[from] IndexError),

    #[error("answer generation failed: {0}")]
    Generation(#[source] ModelError),

    #[error("question was not answered within {0:?}")]
    Timeout(Duration),
}

/// Failure while turning a folder into a saved index.
#[derive(Debug, Error)]
pub enum IndexBuildError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("chunk embedding failed: {0}")]
    Embedding(#[from] ModelError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
