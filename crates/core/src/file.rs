//! File records and their external representation.

use crate::address::ContentAddress;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A persisted file record.
///
/// Created once when an upload completes and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Index-assigned, monotonically increasing identifier.
    pub internal_id: i64,
    /// Caller-facing identifier.
    pub external_id: Uuid,
    /// File name supplied at upload.
    pub name: String,
    /// Number of bytes stored at `content_address`.
    pub size: u64,
    /// Address of the content in the content store.
    pub content_address: ContentAddress,
    /// Insert time (UTC).
    pub created_at: OffsetDateTime,
}

/// Fields supplied by the write path when inserting a record.
#[derive(Clone, Debug)]
pub struct NewFile {
    pub name: String,
    pub size: u64,
    pub content_address: ContentAddress,
}

/// API representation of a file record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileResponse {
    pub external_id: Uuid,
    pub name: String,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&FileRecord> for FileResponse {
    fn from(record: &FileRecord) -> Self {
        Self {
            external_id: record.external_id,
            name: record.name.clone(),
            size: record.size,
            created_at: record.created_at,
        }
    }
}

/// Validate and normalize a file name.
///
/// Surrounding whitespace is trimmed. The result must be non-empty, at most
/// [`crate::MAX_FILE_NAME_LEN`] characters, and free of control characters
/// and path separators.
pub fn validate_file_name(name: &str) -> crate::Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(crate::Error::InvalidFileName("name is empty".to_string()));
    }
    let len = name.chars().count();
    if len > crate::MAX_FILE_NAME_LEN {
        return Err(crate::Error::InvalidFileName(format!(
            "name is {len} characters (max {})",
            crate::MAX_FILE_NAME_LEN
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(crate::Error::InvalidFileName(
            "name contains control characters".to_string(),
        ));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(crate::Error::InvalidFileName(
            "name contains a path separator".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Parse a caller-supplied file identifier.
pub fn parse_file_id(value: &str) -> crate::Result<Uuid> {
    Uuid::parse_str(value.trim()).map_err(|e| crate::Error::InvalidFileId(e.to_string()))
}
