use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Failures talking to the object store. Stage errors wrap these.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to read local file {path}: {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("put_object failed for key {key}: {message}")]
    Put { key: String, message: String },

    #[error("list_objects failed for prefix {prefix}: {message}")]
    List { prefix: String, message: String },

    #[error("delete_object failed for key {key}: {message}")]
    Delete { key: String, message: String },
}

#[derive(Error, Debug)]
pub enum DumpError {
    #[error("failed to create temporary dump file: {0}")]
    TempFile(#[source] std::io::Error),

    #[error("failed to start dump tool {tool}: {source}")]
    Spawn {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed while waiting for dump tool: {0}")]
    Wait(#[source] std::io::Error),

    #[error("dump tool exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("dump tool did not finish within {0:?}")]
    TimedOut(Duration),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to open source file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create archive {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed while writing archive {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source path has no file name: {0}")]
    InvalidSource(PathBuf),

    #[error("archiver task aborted: {0}")]
    Aborted(String),
}

/// Every upload failure collapses into this one kind; callers do not retry.
#[derive(Error, Debug)]
#[error("upload of {path} to key {key} failed: {reason}")]
pub struct UploadError {
    pub path: PathBuf,
    pub key: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("failed to list backups under {prefix}: {source}")]
    List {
        prefix: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to delete expired backup {key} after {deleted_so_far} deletion(s): {source}")]
    Delete {
        key: String,
        deleted_so_far: usize,
        #[source]
        source: StorageError,
    },

    #[error("retention window of {0} days cannot be applied to the current date")]
    Cutoff(u32),
}

/// Outcome of one failed backup run. Retention failures are not part of
/// this type: they never fail a job whose upload succeeded.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("dump stage failed: {0}")]
    Dump(#[from] DumpError),

    #[error("compression stage failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("upload stage failed: {0}")]
    Upload(#[from] UploadError),
}

impl JobError {
    pub fn stage(&self) -> &'static str {
        match self {
            JobError::Dump(_) => "dump",
            JobError::Archive(_) => "compress",
            JobError::Upload(_) => "upload",
        }
    }
}
