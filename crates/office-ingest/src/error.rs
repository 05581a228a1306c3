//! Error types for the ingestion pipeline

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File parsing error
    #[error("Failed to parse file '{filename}': {message}")]
    FileParse { filename: String, message: String },

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Embedding service returned vectors of the wrong size
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Existing index was created with a different shape
    #[error(
        "Index '{name}' exists with dimension {actual_dimension} / metric {actual_metric}, \
         but dimension {expected_dimension} / metric {expected_metric} is configured"
    )]
    IndexMismatch {
        name: String,
        expected_dimension: usize,
        actual_dimension: usize,
        expected_metric: String,
        actual_metric: String,
    },

    /// Vector index error
    #[error("Vector index error: {0}")]
    VectorDb(String),

    /// Non-success response from an external service
    #[error("{service} returned HTTP {status}: {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a file parse error
    pub fn file_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a vector index error
    pub fn vector_db(message: impl Into<String>) -> Self {
        Self::VectorDb(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether retrying the same request may succeed (rate limits, 5xx, timeouts)
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Upstream { status, .. } => *status == 429 || (500..600).contains(status),
            Error::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            _ => false,
        }
    }

    /// Whether the run must halt instead of skipping the affected item
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Config(_) | Error::IndexMismatch { .. } | Error::DimensionMismatch { .. } => {
                true
            }
            Error::Upstream { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}
