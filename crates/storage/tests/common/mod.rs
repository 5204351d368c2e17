pub mod fixtures;
pub mod kubo;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{seeded_bytes, sha256_hash, stream_in_parts};
#[allow(unused_imports)]
pub use kubo::MockKubo;
#[allow(unused_imports)]
pub use mocks::InstrumentedStore;
