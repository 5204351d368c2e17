//! HTTP front door for the depot file store.
//!
//! This crate provides:
//! - Multipart upload with dedup-aware indexing
//! - Chunked, concurrent retrieval of stored files
//! - Metadata lookup and health endpoints
//! - Prometheus metrics

pub mod deadline;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod service;
pub mod state;
pub mod trace;

pub use error::ApiError;
pub use routes::create_router;
pub use service::FileService;
pub use state::AppState;
pub use trace::TraceId;
