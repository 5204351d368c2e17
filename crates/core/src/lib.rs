//! Core domain types and shared logic for the depot file store.
//!
//! This crate defines the data model used across all other crates:
//! - Content addresses and SHA-256 content hashes
//! - File records and their API representation
//! - Chunk planning for ranged retrieval
//! - Configuration

pub mod address;
pub mod chunk;
pub mod config;
pub mod error;
pub mod file;
pub mod hash;

pub use address::ContentAddress;
pub use chunk::{ChunkState, ChunkTask, plan_chunks};
pub use error::{Error, Result};
pub use file::{FileRecord, FileResponse, NewFile, parse_file_id, validate_file_name};
pub use hash::{ContentHash, ContentHasher};

/// Default retrieval chunk size: 4 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Maximum retrieval chunk size: 64 MiB
pub const MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Minimum retrieval chunk size: 1 byte
pub const MIN_CHUNK_SIZE: u64 = 1;

/// Maximum length of a file name, in characters.
pub const MAX_FILE_NAME_LEN: usize = 255;
