//! Application state shared across handlers.

use crate::service::FileService;
use depot_core::config::AppConfig;
use depot_metadata::MetadataStore;
use depot_storage::{ContentStore, StorageResult};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Content store backend.
    pub storage: Arc<dyn ContentStore>,
    /// Metadata index.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upload and retrieval coordination.
    pub files: Arc<FileService>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Fails if the retrieval settings cannot drive a retrieval engine.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ContentStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> StorageResult<Self> {
        let files = FileService::new(storage.clone(), metadata.clone(), &config.retrieval)?;
        Ok(Self {
            config: Arc::new(config),
            storage,
            metadata,
            files: Arc::new(files),
        })
    }
}
