//! Server test utilities.

use super::storage::CountingStore;
use depot_core::config::{AppConfig, MetadataConfig, StorageConfig};
use depot_metadata::{MetadataStore, SqliteStore};
use depot_server::{AppState, create_router};
use depot_storage::FilesystemBackend;
use std::sync::Arc;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub storage: Arc<CountingStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        // Create storage
        let storage_path = temp_dir.path().join("storage");
        let storage = Arc::new(CountingStore::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        ));

        // Create metadata
        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig {
            storage: StorageConfig::Filesystem {
                path: storage_path.clone(),
            },
            metadata: MetadataConfig::Sqlite {
                path: db_path,
                query_timeout_secs: None,
            },
            ..AppConfig::for_testing()
        };

        // Apply user modifications
        modifier(&mut config);

        let state = AppState::new(config, storage.clone(), metadata)
            .expect("Failed to create application state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            storage,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }
}
