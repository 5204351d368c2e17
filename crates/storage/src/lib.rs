//! Content store clients and chunked retrieval for Depot.
//!
//! This crate provides:
//! - The [`ContentStore`] abstraction: streaming puts and ranged reads
//! - Backends: an IPFS node over its HTTP API and a local filesystem store
//! - The [`RetrievalEngine`], which reassembles objects from concurrent
//!   ranged reads

pub mod backends;
pub mod error;
pub mod retrieval;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, ipfs::IpfsBackend};
pub use error::{ChunkFailure, StorageError, StorageResult};
pub use retrieval::{RetrievalEngine, RetrievalOptions, RetryPolicy};
pub use traits::{ByteStream, ContentStore, MAX_RANGE_SIZE, StoredObject};

use depot_core::config::StorageConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a content store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ContentStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::Ipfs {
            endpoint,
            request_timeout_secs,
        } => {
            let backend =
                IpfsBackend::new(endpoint, Duration::from_secs(*request_timeout_secs))?;
            Ok(Arc::new(backend))
        }
    }
}
