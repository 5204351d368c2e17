use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{ContentAddress, ContentHash};
use depot_storage::error::{StorageError, StorageResult};
use depot_storage::traits::{ByteStream, ContentStore, StoredObject};
use futures::TryStreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// In-memory content store that records how it is read.
///
/// Reads can be made to fail per offset, either permanently or for a fixed
/// number of attempts, and can be slowed down to observe concurrency.
#[allow(dead_code)]
pub struct InstrumentedStore {
    objects: Mutex<HashMap<String, Bytes>>,
    failing_offsets: Mutex<HashSet<u64>>,
    flaky_offsets: Mutex<HashMap<u64, u32>>,
    requested: Mutex<Vec<(u64, u64)>>,
    latency: Duration,
    in_flight: AtomicUsize,
    pub fetches: Arc<AtomicUsize>,
    pub max_in_flight: AtomicUsize,
}

/// Decrements the in-flight gauge even when the read is aborted.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[allow(dead_code)]
impl InstrumentedStore {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(HashMap::new()),
            failing_offsets: Mutex::new(HashSet::new()),
            flaky_offsets: Mutex::new(HashMap::new()),
            requested: Mutex::new(Vec::new()),
            latency,
            in_flight: AtomicUsize::new(0),
            fetches: Arc::new(AtomicUsize::new(0)),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    /// Store `data` directly and return its address.
    pub fn insert(&self, data: Bytes) -> ContentAddress {
        let address = ContentAddress::from(ContentHash::compute(&data));
        self.objects
            .lock()
            .unwrap()
            .insert(address.as_str().to_string(), data);
        address
    }

    /// Make every read starting at `offset` fail as unavailable.
    pub fn fail_at(&self, offset: u64) {
        self.failing_offsets.lock().unwrap().insert(offset);
    }

    /// Make the next `times` reads starting at `offset` fail as unavailable.
    pub fn flaky_at(&self, offset: u64, times: u32) {
        self.flaky_offsets.lock().unwrap().insert(offset, times);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Requested (offset, length) pairs, sorted by offset.
    pub fn requested_ranges(&self) -> Vec<(u64, u64)> {
        let mut ranges = self.requested.lock().unwrap().clone();
        ranges.sort();
        ranges
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    fn injected_failure(&self, offset: u64) -> Option<StorageError> {
        if self.failing_offsets.lock().unwrap().contains(&offset) {
            return Some(StorageError::Unavailable(format!(
                "injected failure at offset {offset}"
            )));
        }
        let mut flaky = self.flaky_offsets.lock().unwrap();
        match flaky.get_mut(&offset) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Some(StorageError::Unavailable(format!(
                    "injected transient failure at offset {offset}"
                )))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl ContentStore for InstrumentedStore {
    async fn put(&self, data: ByteStream) -> StorageResult<StoredObject> {
        let parts: Vec<Bytes> = data.try_collect().await?;
        let data = Bytes::from(parts.concat());
        let size = data.len() as u64;
        let address = self.insert(data);
        Ok(StoredObject { address, size })
    }

    async fn get_range(
        &self,
        address: &ContentAddress,
        offset: u64,
        length: u64,
    ) -> StorageResult<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push((offset, length));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.injected_failure(offset) {
            return Err(error);
        }

        let data = self
            .objects
            .lock()
            .unwrap()
            .get(address.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(address.to_string()))?;

        let len = data.len() as u64;
        let start = offset.min(len) as usize;
        let end = offset.saturating_add(length).min(len) as usize;
        Ok(data.slice(start..end))
    }

    fn backend_name(&self) -> &'static str {
        "instrumented"
    }
}
