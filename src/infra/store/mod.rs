//! Bundle store adapters.

mod memory;
mod s3;

pub use memory::InMemoryStore;
pub use s3::S3Store;
