//! Chunk planning for ranged retrieval.

/// One contiguous byte range of a stored object, fetched independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkTask {
    /// Position in the plan (0-indexed).
    pub index: usize,
    /// Byte offset into the object.
    pub offset: u64,
    /// Number of bytes covered by this chunk.
    pub length: u64,
}

impl ChunkTask {
    /// Exclusive end offset of this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Lifecycle of a single chunk fetch.
///
/// `Succeeded` and `Failed` are terminal. A chunk never leaves a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl ChunkState {
    /// Check if the chunk reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Move to `next` if the transition is allowed.
    #[must_use]
    pub fn advance(&mut self, next: ChunkState) -> bool {
        let allowed = matches!(
            (*self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Succeeded)
                | (Self::InFlight, Self::Failed)
        );
        if allowed {
            *self = next;
        }
        allowed
    }
}

/// Split `total_size` bytes into chunks of `chunk_size`.
///
/// Every chunk is `chunk_size` long except the last, which covers the
/// remainder. An empty object produces an empty plan.
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> crate::Result<Vec<ChunkTask>> {
    if chunk_size == 0 {
        return Err(crate::Error::InvalidChunkSize {
            size: chunk_size,
            min: crate::MIN_CHUNK_SIZE,
            max: crate::MAX_CHUNK_SIZE,
        });
    }

    let num_chunks = total_size.div_ceil(chunk_size);
    let num_chunks = usize::try_from(num_chunks).map_err(|_| {
        crate::Error::InvalidChunkSize {
            size: chunk_size,
            min: crate::MIN_CHUNK_SIZE,
            max: crate::MAX_CHUNK_SIZE,
        }
    })?;

    let mut tasks = Vec::with_capacity(num_chunks);
    for index in 0..num_chunks {
        let offset = index as u64 * chunk_size;
        let length = chunk_size.min(total_size - offset);
        tasks.push(ChunkTask {
            index,
            offset,
            length,
        });
    }
    Ok(tasks)
}
