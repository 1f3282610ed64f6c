use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HybridError {
    #[error("invalid accession: {0}")]
    InvalidAccession(String),

    #[error("invalid setting {name}: {message}")]
    InvalidSetting { name: String, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read input {}: {message}", path.display())]
    InputRead { path: PathBuf, message: String },

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("malformed NCBI response: {0}")]
    MalformedResponse(String),

    #[error("NCBI response lacks required fields: {0}")]
    Schema(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("interrupted by cancellation")]
    Interrupted,
}

impl HybridError {
    /// Whether a failed remote call is worth repeating.
    ///
    /// Transport failures, throttling and server errors, and undecodable
    /// bodies are transient. A body that decodes but lacks the fields we
    /// group on will not improve on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            HybridError::NcbiHttp(_) | HybridError::MalformedResponse(_) => true,
            HybridError::NcbiStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// A batch that could not be fetched after every attempt.
///
/// Carried next to an empty record list rather than raised, so the caller
/// can drop the batch and keep going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub batch_index: usize,
    pub leading: Vec<String>,
    pub attempts: u32,
    pub message: String,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {} [{}...] failed after {} attempts: {}",
            self.batch_index,
            self.leading.join(", "),
            self.attempts,
            self.message
        )
    }
}

impl std::error::Error for FetchError {}
