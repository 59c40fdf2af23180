mod gcs;
mod local;

pub use gcs::GcsStore;
pub use local::{LocalStore, UrlSigner};

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Signing error: {0}")]
    Signing(String),
}

/// Abstraction over object storage backends.
/// Keys are UUID-based -- the raw blobs are meaningless without the resource rows.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, ObjectStoreError>;
    /// Deleting a missing object is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError>;
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, ObjectStoreError>;
    /// A time-limited URL from which the object can be downloaded without credentials.
    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError>;
}

/// Reject keys that could escape a bucket or produce ambiguous paths.
pub(crate) fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(ObjectStoreError::Backend(format!("invalid object key: {key}")));
    }
    Ok(())
}
