//! Object store abstraction
//!
//! The gateway treats the backing store as an opaque key→blob map with one
//! extra primitive beyond get/put/delete: a conditional write keyed on the
//! object's etag, used by the delete path to rewrite the track index without
//! losing concurrent updates.
//!
//! Two implementations ship: [`FsStore`] for serving a local object root and
//! [`MemoryStore`] for tests.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised by object store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying IO fault.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A conditional write found a different etag than expected.
    #[error("Precondition failed for key: {key}")]
    PreconditionFailed {
        /// Key whose etag no longer matched.
        key: String,
    },

    /// The key cannot name an object in this store.
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Backend-specific fault.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// An object fetched from the store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Raw object bytes.
    pub data: Bytes,
    /// Content type recorded at put time, if the backend keeps one.
    pub content_type: Option<String>,
    /// Version tag for conditional writes (content hash).
    pub etag: String,
}

/// Key→blob store with get/put/delete plus conditional write.
///
/// `delete` is idempotent: deleting an absent key succeeds, matching the
/// semantics of bucket stores like R2/S3.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Write an object unconditionally. Returns the new etag.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<String, StoreError>;

    /// Write an object only if its current etag equals `expected`.
    ///
    /// `expected = None` requires the key to be absent. Returns the new etag,
    /// or [`StoreError::PreconditionFailed`] if another writer got there
    /// first.
    async fn put_if_match(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        expected: Option<&str>,
    ) -> Result<String, StoreError>;

    /// Remove an object. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Content-hash etag shared by both store implementations.
pub(crate) fn content_etag(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
