//! Chunked retrieval: concurrent ranged fetches reassembled into one buffer.
//!
//! A retrieval plans fixed-size chunks, runs them on a bounded set of spawned
//! tasks and copies each successful chunk into its own slice of a buffer
//! sized to the whole object. The result is all-or-nothing: any failed chunk
//! fails the call with the indices of every chunk that failed.

use crate::error::{ChunkFailure, StorageError, StorageResult};
use crate::traits::ContentStore;
use bytes::Bytes;
use depot_core::config::RetrievalConfig;
use depot_core::{ChunkState, ChunkTask, ContentAddress, plan_chunks};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Per-chunk retry policy.
///
/// Only transient errors are retried. The default makes a single attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per chunk, including the first.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Tuning for a [`RetrievalEngine`].
#[derive(Clone, Debug)]
pub struct RetrievalOptions {
    pub chunk_size: u64,
    pub max_concurrent_fetches: usize,
    pub retry: RetryPolicy,
}

impl From<&RetrievalConfig> for RetrievalOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_concurrent_fetches: config.max_concurrent_fetches,
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                backoff: config.retry_backoff(),
            },
        }
    }
}

/// Outcome of one spawned chunk task.
struct ChunkOutcome {
    task: ChunkTask,
    attempts: u32,
    result: StorageResult<Bytes>,
}

/// Fetches whole objects from a [`ContentStore`] as concurrent ranged reads.
#[derive(Clone)]
pub struct RetrievalEngine {
    store: Arc<dyn ContentStore>,
    options: RetrievalOptions,
}

impl RetrievalEngine {
    /// Create an engine over `store`.
    pub fn new(store: Arc<dyn ContentStore>, options: RetrievalOptions) -> StorageResult<Self> {
        if options.chunk_size == 0 {
            return Err(StorageError::Config(
                "retrieval chunk size must be greater than zero".to_string(),
            ));
        }
        if options.max_concurrent_fetches == 0 {
            return Err(StorageError::Config(
                "retrieval concurrency must be at least 1".to_string(),
            ));
        }
        if options.retry.max_attempts == 0 {
            return Err(StorageError::Config(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        Ok(Self { store, options })
    }

    /// Fetch `total_size` bytes of the object at `address`.
    ///
    /// Returns the complete object, `ChunksFailed` if any chunk failed, or
    /// `Cancelled` once `cancel` fires. Dropping the returned future aborts
    /// every outstanding chunk task.
    #[instrument(skip(self, cancel), fields(backend = self.store.backend_name()))]
    pub async fn fetch(
        &self,
        address: &ContentAddress,
        total_size: u64,
        cancel: &CancellationToken,
    ) -> StorageResult<Bytes> {
        let plan = plan_chunks(total_size, self.options.chunk_size)
            .map_err(|e| StorageError::InvalidRange(e.to_string()))?;
        if plan.is_empty() {
            return Ok(Bytes::new());
        }
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let total_len = usize::try_from(total_size).map_err(|_| {
            StorageError::InvalidRange(format!(
                "object size {total_size} exceeds platform address space"
            ))
        })?;

        let mut buffer = vec![0u8; total_len];
        let mut states = vec![ChunkState::Pending; plan.len()];
        let mut queue = plan.iter().copied();
        let mut in_flight: JoinSet<ChunkOutcome> = JoinSet::new();
        let mut failures: Vec<ChunkFailure> = Vec::new();
        let mut dispatching = true;

        // Tasks observe a child token so that returning or being dropped
        // also stops any backoff sleeps they are in.
        let task_cancel = cancel.child_token();
        let _cancel_on_exit = task_cancel.clone().drop_guard();

        tracing::debug!(
            address = %address,
            total_size,
            chunks = plan.len(),
            chunk_size = self.options.chunk_size,
            "starting chunked retrieval"
        );

        loop {
            while dispatching && in_flight.len() < self.options.max_concurrent_fetches {
                let Some(task) = queue.next() else {
                    dispatching = false;
                    break;
                };
                let started = states[task.index].advance(ChunkState::InFlight);
                debug_assert!(started, "chunk {} dispatched twice", task.index);
                in_flight.spawn(fetch_chunk(
                    self.store.clone(),
                    address.clone(),
                    task,
                    self.options.retry.clone(),
                    task_cancel.clone(),
                ));
            }

            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    task_cancel.cancel();
                    in_flight.abort_all();
                    tracing::debug!(address = %address, "retrieval cancelled");
                    return Err(StorageError::Cancelled);
                }
                joined = in_flight.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };

            let ChunkOutcome {
                task,
                attempts,
                result,
            } = joined.map_err(|e| StorageError::Backend(format!("chunk task failed: {e}")))?;

            let result = result.and_then(|bytes| {
                if bytes.len() as u64 == task.length {
                    Ok(bytes)
                } else {
                    Err(StorageError::SizeMismatch {
                        index: task.index,
                        expected: task.length,
                        actual: bytes.len() as u64,
                    })
                }
            });

            match result {
                Ok(bytes) => {
                    // Offsets are below total_len, which fits in usize.
                    let start = task.offset as usize;
                    buffer[start..start + bytes.len()].copy_from_slice(&bytes);
                    let done = states[task.index].advance(ChunkState::Succeeded);
                    debug_assert!(done, "chunk {} finished twice", task.index);
                }
                Err(error) => {
                    tracing::warn!(
                        address = %address,
                        chunk_index = task.index,
                        offset = task.offset,
                        attempts,
                        error = %error,
                        "chunk fetch failed"
                    );
                    let done = states[task.index].advance(ChunkState::Failed);
                    debug_assert!(done, "chunk {} finished twice", task.index);
                    failures.push(ChunkFailure {
                        index: task.index,
                        attempts,
                        error,
                    });
                    dispatching = false;
                }
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|f| f.index);
            let skipped = states.iter().filter(|s| !s.is_terminal()).count();
            tracing::warn!(
                address = %address,
                failed = failures.len(),
                skipped,
                total = plan.len(),
                "retrieval failed"
            );
            return Err(StorageError::ChunksFailed {
                total: plan.len(),
                failures,
            });
        }

        debug_assert!(states.iter().all(|s| *s == ChunkState::Succeeded));
        tracing::debug!(address = %address, chunks = plan.len(), "retrieval complete");
        Ok(Bytes::from(buffer))
    }
}

/// Fetch one chunk, retrying transient errors per `retry`.
async fn fetch_chunk(
    store: Arc<dyn ContentStore>,
    address: ContentAddress,
    task: ChunkTask,
    retry: RetryPolicy,
    cancel: CancellationToken,
) -> ChunkOutcome {
    let mut attempts = 0;
    let result = loop {
        if cancel.is_cancelled() {
            break Err(StorageError::Cancelled);
        }
        attempts += 1;

        let result = AssertUnwindSafe(store.get_range(&address, task.offset, task.length))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(StorageError::Backend("chunk fetch panicked".to_string())));

        match result {
            Err(e) if e.is_transient() && attempts < retry.max_attempts => {
                tracing::debug!(
                    chunk_index = task.index,
                    attempt = attempts,
                    error = %e,
                    "retrying chunk fetch"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break Err(StorageError::Cancelled),
                    _ = tokio::time::sleep(retry.backoff) => {}
                }
            }
            other => break other,
        }
    };

    ChunkOutcome {
        task,
        attempts,
        result,
    }
}
