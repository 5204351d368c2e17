//! File write coordination and the read path.
//!
//! Uploads go to the content store first and are indexed afterwards. A
//! duplicate is rejected at the index; the content already written stays in
//! the store, since it is shared with the record that won.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    BYTES_RETRIEVED, BYTES_UPLOADED, CHUNK_FETCH_FAILURES, FILES_UPLOADED, RETRIEVAL_DURATION,
    RetrievalGauge, UPLOAD_CONFLICTS, UPLOAD_DURATION, record_retrieval,
};
use bytes::Bytes;
use depot_core::config::RetrievalConfig;
use depot_core::{FileRecord, NewFile, parse_file_id, validate_file_name};
use depot_metadata::{MetadataError, MetadataStore};
use depot_storage::{
    ByteStream, ContentStore, RetrievalEngine, RetrievalOptions, StorageError, StorageResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Coordinates the content store, the metadata index and the retrieval engine.
pub struct FileService {
    storage: Arc<dyn ContentStore>,
    metadata: Arc<dyn MetadataStore>,
    engine: RetrievalEngine,
    retrieval_timeout: Option<Duration>,
}

impl FileService {
    pub fn new(
        storage: Arc<dyn ContentStore>,
        metadata: Arc<dyn MetadataStore>,
        retrieval: &RetrievalConfig,
    ) -> StorageResult<Self> {
        let engine = RetrievalEngine::new(storage.clone(), RetrievalOptions::from(retrieval))?;
        Ok(Self {
            storage,
            metadata,
            engine,
            retrieval_timeout: retrieval.timeout(),
        })
    }

    /// Store `data` and index it under `name`.
    ///
    /// The recorded size is the number of bytes the store observed, not
    /// anything the caller declared. Identical content that is already
    /// indexed yields `Conflict`.
    #[instrument(skip(self, data), fields(backend = self.storage.backend_name()))]
    pub async fn save_file(&self, name: &str, data: ByteStream) -> ApiResult<FileRecord> {
        let name = validate_file_name(name)?;
        let timer = UPLOAD_DURATION.start_timer();

        let stored = self.storage.put(data).await?;
        tracing::debug!(address = %stored.address, size = stored.size, "content stored");

        if self.metadata.exists_by_address(&stored.address).await? {
            UPLOAD_CONFLICTS.inc();
            timer.stop_and_discard();
            return Err(MetadataError::Conflict(format!(
                "content address {} already indexed",
                stored.address
            ))
            .into());
        }

        let new_file = NewFile {
            name,
            size: stored.size,
            content_address: stored.address,
        };
        let record = match self.metadata.insert_file(&new_file).await {
            Ok(record) => record,
            Err(e) => {
                // Lost a race against an identical upload.
                if matches!(e, MetadataError::Conflict(_)) {
                    UPLOAD_CONFLICTS.inc();
                }
                timer.stop_and_discard();
                return Err(e.into());
            }
        };

        timer.observe_duration();
        FILES_UPLOADED.inc();
        BYTES_UPLOADED.inc_by(record.size);
        tracing::info!(
            external_id = %record.external_id,
            address = %record.content_address,
            size = record.size,
            "file stored"
        );
        Ok(record)
    }

    /// Resolve a caller-supplied id to its record.
    pub async fn find_file(&self, external_id: &str) -> ApiResult<FileRecord> {
        let id = parse_file_id(external_id)?;
        Ok(self.metadata.find_by_external_id(id).await?)
    }

    /// Resolve `external_id` and reassemble its content.
    ///
    /// Unknown ids fail before any content is fetched. Cancelling `cancel`
    /// or exceeding the configured retrieval timeout stops the fetch.
    #[instrument(skip(self, cancel))]
    pub async fn retrieve_file(
        &self,
        external_id: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<(FileRecord, Bytes)> {
        let record = match self.find_file(external_id).await {
            Ok(record) => record,
            Err(e) => {
                if matches!(e, ApiError::NotFound(_)) {
                    record_retrieval("not_found");
                }
                return Err(e);
            }
        };

        let _gauge = RetrievalGauge::start();
        let timer = RETRIEVAL_DURATION.start_timer();
        let fetch = self
            .engine
            .fetch(&record.content_address, record.size, cancel);

        let result = match self.retrieval_timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(result) => result,
                Err(_) => {
                    timer.stop_and_discard();
                    record_retrieval("timeout");
                    tracing::warn!(
                        external_id = %record.external_id,
                        timeout_secs = limit.as_secs(),
                        "retrieval timed out"
                    );
                    return Err(ApiError::Unavailable("retrieval timed out".to_string()));
                }
            },
            None => fetch.await,
        };

        match result {
            Ok(data) => {
                timer.observe_duration();
                record_retrieval("ok");
                BYTES_RETRIEVED.inc_by(data.len() as u64);
                tracing::debug!(
                    external_id = %record.external_id,
                    size = data.len(),
                    "file retrieved"
                );
                Ok((record, data))
            }
            Err(e) => {
                timer.stop_and_discard();
                let outcome = if matches!(e, StorageError::Cancelled) {
                    "cancelled"
                } else {
                    "failed"
                };
                record_retrieval(outcome);
                CHUNK_FETCH_FAILURES.inc_by(e.failed_chunks().len() as u64);
                Err(e.into())
            }
        }
    }
}
