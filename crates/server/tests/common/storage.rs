//! Storage test utilities.

use async_trait::async_trait;
use bytes::Bytes;
use depot_core::ContentAddress;
use depot_storage::{ByteStream, ContentStore, FilesystemBackend, StorageResult, StoredObject};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Filesystem content store that counts the calls made through it.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct CountingStore {
    inner: FilesystemBackend,
    puts: AtomicUsize,
    range_reads: AtomicUsize,
    read_delay_ms: AtomicU64,
}

#[allow(dead_code)]
impl CountingStore {
    pub fn new(inner: FilesystemBackend) -> Self {
        Self {
            inner,
            puts: AtomicUsize::new(0),
            range_reads: AtomicUsize::new(0),
            read_delay_ms: AtomicU64::new(0),
        }
    }

    /// Make every later `get_range` sleep for `delay` before reading.
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of `get_range` calls so far.
    pub fn range_read_count(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    /// Number of distinct objects on disk.
    pub async fn object_count(&self) -> usize {
        self.inner.object_count().await.unwrap()
    }
}

#[async_trait]
impl ContentStore for CountingStore {
    async fn put(&self, data: ByteStream) -> StorageResult<StoredObject> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(data).await
    }

    async fn get_range(
        &self,
        address: &ContentAddress,
        offset: u64,
        length: u64,
    ) -> StorageResult<Bytes> {
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.get_range(address, offset, length).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}

/// A test storage wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestStorage {
    pub backend: Arc<CountingStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestStorage {
    /// Create a new test storage with a temporary directory.
    pub async fn new() -> StorageResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let backend = FilesystemBackend::new(temp_dir.path()).await?;

        Ok(Self {
            backend: Arc::new(CountingStore::new(backend)),
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the content store.
    pub fn store(&self) -> Arc<dyn ContentStore> {
        self.backend.clone()
    }
}
