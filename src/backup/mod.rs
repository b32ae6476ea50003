pub(crate) mod archive;    // Single-file tar.gz archiver
pub(crate) mod db_dump;    // Runs the external dump tool into a temp file
pub(crate) mod job;        // Composes the four stages into one backup run
pub(crate) mod retention;  // Deletes stored backups past their retention window
pub(crate) mod s3_upload;  // Key layout and archive upload

pub use db_dump::DumpTool;
pub use job::{BackupRunner, JobRunner};
