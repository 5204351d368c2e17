//! Database models mapping to the metadata schema.

use crate::error::MetadataError;
use depot_core::{ContentAddress, FileRecord};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Column list shared by every query that returns a [`FileRow`].
pub(crate) const FILE_COLUMNS: &str = "id, external_id, name, size_bytes, content_address, created_at";

/// A row of the `files` table.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub id: i64,
    pub external_id: Uuid,
    pub name: String,
    pub size_bytes: i64,
    pub content_address: String,
    pub created_at: OffsetDateTime,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = MetadataError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let size = u64::try_from(row.size_bytes).map_err(|_| {
            MetadataError::Internal(format!(
                "file {} has negative size {}",
                row.external_id, row.size_bytes
            ))
        })?;
        let content_address = ContentAddress::new(row.content_address).map_err(|e| {
            MetadataError::Internal(format!(
                "file {} has an invalid content address: {e}",
                row.external_id
            ))
        })?;

        Ok(FileRecord {
            internal_id: row.id,
            external_id: row.external_id,
            name: row.name,
            size,
            content_address,
            created_at: row.created_at,
        })
    }
}

/// Convert an unsigned size for storage in a signed BIGINT column.
pub(crate) fn size_to_db(size: u64) -> Result<i64, MetadataError> {
    i64::try_from(size)
        .map_err(|_| MetadataError::Internal(format!("file size {size} exceeds database range")))
}
