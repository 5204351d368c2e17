//! Content store backends.

pub mod filesystem;
pub mod ipfs;
