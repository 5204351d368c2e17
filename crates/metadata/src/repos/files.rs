//! File index repository trait.

use crate::error::MetadataResult;
use async_trait::async_trait;
use depot_core::{ContentAddress, FileRecord, NewFile};
use uuid::Uuid;

/// Repository for indexed files.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Whether any file already references `address`.
    async fn exists_by_address(&self, address: &ContentAddress) -> MetadataResult<bool>;

    /// Index a new file, assigning its external id and creation time.
    ///
    /// Fails with `Conflict` if the content address is already indexed.
    async fn insert_file(&self, file: &NewFile) -> MetadataResult<FileRecord>;

    /// Look up a file by its public id.
    ///
    /// Fails with `NotFound` when no file matches.
    async fn find_by_external_id(&self, external_id: Uuid) -> MetadataResult<FileRecord>;

    /// Number of indexed files.
    async fn count_files(&self) -> MetadataResult<u64>;
}
