//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::ContentAddress;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming writes.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Maximum size of a single ranged read (128 MiB).
/// This prevents large allocations from caller-controlled ranges.
pub const MAX_RANGE_SIZE: u64 = 128 * 1024 * 1024;

/// Result of a successful put.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Backend-computed address of the content.
    pub address: ContentAddress,
    /// Bytes observed flowing through the input stream.
    pub size: u64,
}

/// Content-addressed store abstraction.
///
/// Equal content always yields an equal address. Implementations must not
/// expose partially written content when a put fails.
#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    /// Stream content into the store and return its address.
    async fn put(&self, data: ByteStream) -> StorageResult<StoredObject>;

    /// Read up to `length` bytes starting at `offset`.
    ///
    /// Fewer bytes are returned only when the object ends inside the
    /// requested range. That is a normal outcome, not an error.
    async fn get_range(
        &self,
        address: &ContentAddress,
        offset: u64,
        length: u64,
    ) -> StorageResult<Bytes>;

    /// Get the name of this storage backend, for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Reject ranges larger than [`MAX_RANGE_SIZE`] or past `u64::MAX`.
pub(crate) fn check_range(offset: u64, length: u64) -> StorageResult<()> {
    if length > MAX_RANGE_SIZE {
        return Err(crate::StorageError::InvalidRange(format!(
            "range size {length} exceeds maximum {MAX_RANGE_SIZE} bytes"
        )));
    }
    if offset.checked_add(length).is_none() {
        return Err(crate::StorageError::InvalidRange(format!(
            "offset {offset} + length {length} overflows"
        )));
    }
    Ok(())
}
