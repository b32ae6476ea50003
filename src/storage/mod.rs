//! Object storage seam consumed by the backup pipeline.
//!
//! The pipeline only needs three operations: put a local file under a key,
//! list keys under a prefix, and delete a key. [`S3Store`] implements them
//! against S3-compatible storage; tests use an in-memory store.

mod s3;

pub use s3::S3Store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;

use crate::errors::StorageError;

/// Where an uploaded archive ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads the file at `path` as `key`. Completes fully or leaves no object.
    async fn put_object(&self, key: &str, path: &Path) -> Result<ObjectLocation, StorageError>;

    /// Every object whose key starts with `prefix`, across all result pages.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError>;

    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}
