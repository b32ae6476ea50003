// mysql-s3-backup/src/storage/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use std::path::Path;
use tracing::{debug, info};

use super::{ObjectLocation, ObjectStore, StoredObject};
use crate::config::StorageTarget;
use crate::errors::StorageError;

/// S3-compatible object store. One client is built at startup and shared by every job.
#[derive(Clone)]
pub struct S3Store {
    client: s3::Client,
    bucket: String,
}

impl S3Store {
    pub async fn connect(target: &StorageTarget) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(target.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &target.access_key,
                &target.secret_key,
                None, // session_token
                None, // expiry
                "Static", // provider_name
            ));
        if let Some(endpoint) = &target.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        // Custom endpoints (MinIO, Spaces, ...) generally expect path-style addressing.
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(target.endpoint_url.is_some())
            .build();

        info!(
            bucket = %target.bucket,
            region = %target.region,
            endpoint = target.endpoint_url.as_deref().unwrap_or("aws"),
            "S3 client initialized"
        );

        Self {
            client: s3::Client::from_conf(s3_config),
            bucket: target.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, key: &str, path: &Path) -> Result<ObjectLocation, StorageError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::LocalFile {
                path: path.to_path_buf(),
                source: std::io::Error::other(e),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Put {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(ObjectLocation {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        })
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| StorageError::List {
                    prefix: prefix.to_string(),
                    message: DisplayErrorContext(&e).to_string(),
                })?;

            for object in response.contents() {
                let (Some(key), Some(modified)) = (object.key(), object.last_modified()) else {
                    continue;
                };
                let Some(last_modified) =
                    DateTime::<Utc>::from_timestamp(modified.secs(), modified.subsec_nanos())
                else {
                    continue;
                };
                objects.push(StoredObject {
                    key: key.to_string(),
                    last_modified,
                });
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(prefix, count = objects.len(), "Listed stored backups");
        Ok(objects)
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }
}
