//! Storage error types.

use thiserror::Error;

/// Format failed chunk indices, capping the list to keep logs readable.
fn format_failed_indices(failures: &[ChunkFailure]) -> String {
    const MAX_DISPLAYED: usize = 8;
    let indices: Vec<usize> = failures.iter().map(|f| f.index).collect();
    if indices.len() <= MAX_DISPLAYED {
        format!("{indices:?}")
    } else {
        format!(
            "{:?} (and {} more)",
            &indices[..MAX_DISPLAYED],
            indices.len() - MAX_DISPLAYED
        )
    }
}

/// A single chunk that did not complete during a retrieval.
#[derive(Debug)]
pub struct ChunkFailure {
    /// Index of the chunk in the retrieval plan.
    pub index: usize,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Error from the last attempt.
    pub error: StorageError,
}

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("content store unavailable: {0}")]
    Unavailable(String),

    #[error("content store write failed: {0}")]
    WriteFailed(String),

    #[error("content store error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("upload stream failed: {0}")]
    UploadStream(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("chunk {index} returned {actual} bytes, expected {expected}")]
    SizeMismatch {
        index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("{} of {total} chunks failed: {}", .failures.len(), format_failed_indices(.failures))]
    ChunksFailed {
        total: usize,
        failures: Vec<ChunkFailure>,
    },

    #[error("retrieval cancelled")]
    Cancelled,
}

impl StorageError {
    /// Whether a retry of the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Backend(_) | Self::Io(_)
        )
    }

    /// Indices of failed chunks, if this is an aggregate retrieval failure.
    pub fn failed_chunks(&self) -> Vec<usize> {
        match self {
            Self::ChunksFailed { failures, .. } => failures.iter().map(|f| f.index).collect(),
            _ => Vec::new(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
