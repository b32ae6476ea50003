// mysql-s3-backup/src/backup/job.rs
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::archive::compress_file;
use super::db_dump::DumpTool;
use super::retention::sweep_expired_backups;
use super::s3_upload::upload_archive;
use crate::clock::Clock;
use crate::config::DatabaseSpec;
use crate::errors::{ArchiveError, JobError};
use crate::storage::{ObjectLocation, ObjectStore};
use crate::utils::discard_local_file;

/// One end-to-end backup of one database. The scheduler only sees this seam.
#[async_trait]
pub trait BackupRunner: Send + Sync {
    async fn run_backup(&self, db: &DatabaseSpec) -> Result<ObjectLocation, JobError>;
}

/// dump -> compress -> upload -> retention sweep, strictly in that order.
pub struct JobRunner {
    store: Arc<dyn ObjectStore>,
    customer_name: String,
    dump_tool: DumpTool,
    upload_timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        customer_name: impl Into<String>,
        dump_tool: DumpTool,
        upload_timeout: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            customer_name: customer_name.into(),
            dump_tool,
            upload_timeout,
            clock,
        }
    }

    async fn run_stages(&self, db: &DatabaseSpec) -> Result<ObjectLocation, JobError> {
        let started = Instant::now();

        let dump_path = self.dump_tool.dump_database(db, self.clock.now()).await?;

        let source = dump_path.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || compress_file(&source))
            .await
            .map_err(|e| ArchiveError::Aborted(e.to_string()))??;
        // The raw dump is no longer needed once the archive exists.
        discard_local_file(dump_path);

        let location = upload_archive(
            self.store.as_ref(),
            &self.customer_name,
            &db.name,
            &archive,
            self.upload_timeout,
        )
        .await?;
        discard_local_file(archive);

        match sweep_expired_backups(
            self.store.as_ref(),
            &self.customer_name,
            &db.name,
            db.retention_days,
            self.clock.now(),
        )
        .await
        {
            Ok(0) => info!("No expired backups to remove"),
            Ok(deleted) => info!(deleted, "Removed expired backups"),
            Err(e) => warn!(error = %e, "Retention sweep failed; the new backup is unaffected"),
        }

        info!(
            location = %location,
            elapsed_secs = started.elapsed().as_secs(),
            "Backup completed"
        );
        Ok(location)
    }
}

#[async_trait]
impl BackupRunner for JobRunner {
    async fn run_backup(&self, db: &DatabaseSpec) -> Result<ObjectLocation, JobError> {
        let span = info_span!("backup", database = %db.name, run_id = %Uuid::new_v4());
        let result = self.run_stages(db).instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| error!(stage = e.stage(), error = %e, "Backup failed"));
        }
        result
    }
}
