//! Object storage for keeper
//!
//! Binary item payloads live outside the relational store under a
//! server-assigned handle. [`ObjectStore`] is the contract the keeper
//! service depends on; [`S3ObjectStore`] talks to MinIO or any S3-compatible
//! endpoint and [`LocalObjectStore`] keeps objects on the local filesystem.

pub mod constants;
pub mod error;
pub mod local;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub use error::{BoxError, StorageError, StorageResult};
pub use local::LocalObjectStore;
pub use s3::{S3Config, S3ObjectStore};

/// Upload body: chunks in send order, each possibly failing with the
/// producer's own error
pub type ChunkStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// Download body
pub type ObjectStream = BoxStream<'static, StorageResult<Bytes>>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `body` into the object at `handle` and return the number of
    /// bytes stored. Nothing is left behind when the body fails or the
    /// future is dropped before completion.
    async fn put(&self, handle: &str, body: ChunkStream, content_type: &str) -> StorageResult<u64>;

    /// `NotFound` when no object exists at `handle`
    async fn get(&self, handle: &str) -> StorageResult<ObjectStream>;

    /// Idempotent: deleting a missing object succeeds
    async fn delete(&self, handle: &str) -> StorageResult<()>;

    async fn exists(&self, handle: &str) -> StorageResult<bool>;
}
