// mysql-s3-backup/src/backup/s3_upload.rs
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::errors::UploadError;
use crate::storage::{ObjectLocation, ObjectStore};

/// `<customer>/<database>/`: every backup of one database lives under this prefix.
pub fn namespace_prefix(customer_name: &str, db_name: &str) -> String {
    format!("{}/{}/", customer_name, db_name)
}

/// `<customer>/<database>/<archive file name>`.
pub fn object_key(customer_name: &str, db_name: &str, archive_file_name: &str) -> String {
    format!("{}{}", namespace_prefix(customer_name, db_name), archive_file_name)
}

/// Uploads a local archive to its deterministic key.
pub async fn upload_archive(
    store: &dyn ObjectStore,
    customer_name: &str,
    db_name: &str,
    archive_path: &Path,
    timeout: Option<Duration>,
) -> Result<ObjectLocation, UploadError> {
    let failure = |key: &str, reason: String| UploadError {
        path: archive_path.to_path_buf(),
        key: key.to_string(),
        reason,
    };

    let file_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| failure("", "archive path has no file name".to_string()))?;
    let key = object_key(customer_name, db_name, &file_name);

    info!(
        "Uploading {} to key {}",
        archive_path.display(),
        key
    );

    let put = store.put_object(&key, archive_path);
    let location = match timeout {
        Some(limit) => tokio::time::timeout(limit, put)
            .await
            .map_err(|_| failure(&key, format!("upload did not finish within {:?}", limit)))?,
        None => put.await,
    }
    .map_err(|e| failure(&key, e.to_string()))?;

    info!("Uploaded {} to {}", archive_path.display(), location);
    Ok(location)
}
