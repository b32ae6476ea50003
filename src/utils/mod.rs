use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};
use which::which;

const DEFAULT_DUMP_TOOL: &str = "mysqldump";

/// Resolves the dump tool: the configured binary if any, otherwise `mysqldump` from PATH.
pub fn find_dump_executable(configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) => {
            if !path.is_file() {
                anyhow::bail!(
                    "Configured mysqlBinPath {} does not exist or is not a file",
                    path.display()
                );
            }
            Ok(path.to_path_buf())
        }
        None => which(DEFAULT_DUMP_TOOL).context(
            "mysqldump executable not found in PATH. Install the MySQL client tools or set mysqlBinPath in config.json.",
        ),
    }
}

/// Deletes a job's local file as soon as it is no longer needed.
///
/// A file that cannot be removed is logged and left behind; it never fails the job.
pub fn discard_local_file(path: TempPath) {
    let shown = path.display().to_string();
    match path.close() {
        Ok(()) => debug!("Removed local file {}", shown),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove local file {}: {}", shown, e),
    }
}
