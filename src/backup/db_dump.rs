// mysql-s3-backup/src/backup/db_dump.rs
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempPath;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::DatabaseSpec;
use crate::errors::DumpError;

/// Minute-granularity stamp used in dump and archive file names.
pub const DUMP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H:%M";

/// The external dump utility plus where its output goes.
#[derive(Debug, Clone)]
pub struct DumpTool {
    pub executable: PathBuf,
    /// Directory for dump files; the system temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

/// `backup_<db>_<YYYY-MM-DD_HH:MM>.`; the temp allocator appends `<random>.sql`.
pub fn dump_file_prefix(db_name: &str, started_at: DateTime<Local>) -> String {
    format!("backup_{}_{}.", db_name, started_at.format(DUMP_TIMESTAMP_FORMAT))
}

impl DumpTool {
    /// Runs `<tool> -u<user> -p<password> <db>` with stdout redirected into a fresh
    /// temp file. The returned path deletes the file when dropped; on error it is
    /// already gone.
    pub async fn dump_database(
        &self,
        db: &DatabaseSpec,
        started_at: DateTime<Local>,
    ) -> Result<TempPath, DumpError> {
        info!(database = %db.name, "Starting dump");

        let prefix = dump_file_prefix(&db.name, started_at);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(".sql");
        let temp_file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(DumpError::TempFile)?;

        let (file, dump_path) = temp_file.into_parts();
        debug!(database = %db.name, path = %dump_path.display(), "Created dump file");

        let child = Command::new(&self.executable)
            .arg(format!("-u{}", db.credentials.username))
            .arg(format!("-p{}", db.credentials.password))
            .arg(&db.name)
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DumpError::Spawn {
                tool: self.executable.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| DumpError::TimedOut(limit))?,
            None => wait.await,
        }
        .map_err(DumpError::Wait)?;

        if !output.status.success() {
            return Err(DumpError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let size = std::fs::metadata(&dump_path).map(|m| m.len()).unwrap_or(0);
        info!(database = %db.name, bytes = size, "Dump completed");
        Ok(dump_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::test_support::{database, system_tool};
    use std::path::Path;
    use chrono::TimeZone;

    fn started_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 10, 2, 0, 0).single().unwrap()
    }

    fn tool(executable: PathBuf, dir: &Path) -> DumpTool {
        DumpTool {
            executable,
            temp_dir: Some(dir.to_path_buf()),
            timeout: None,
        }
    }

    fn dump_file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_dump_file_prefix() {
        assert_eq!(
            dump_file_prefix("orders", started_at()),
            "backup_orders_2026-03-10_02:00."
        );
    }

    #[tokio::test]
    async fn test_dump_captures_stdout_into_named_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // echo prints its arguments, which is exactly the dump tool's argv.
        let dump = tool(system_tool("echo"), dir.path());

        let path = dump
            .dump_database(&database("orders"), started_at())
            .await
            .unwrap();

        let name = dump_file_name(&path);
        assert!(name.starts_with("backup_orders_2026-03-10_02:00."), "{}", name);
        assert!(name.ends_with(".sql"), "{}", name);
        assert!(name.len() > "backup_orders_2026-03-10_02:00..sql".len());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), "-ubackup -psecret orders");

        drop(path);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_dumps_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let dump = tool(system_tool("echo"), dir.path());
        let db = database("orders");

        let (first, second) = tokio::join!(
            dump.dump_database(&db, started_at()),
            dump.dump_database(&db, started_at())
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first.to_path_buf(), second.to_path_buf());
        assert_eq!(dir_entries(dir.path()).len(), 2);
    }

    #[tokio::test]
    async fn test_failing_tool_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let dump = tool(system_tool("false"), dir.path());

        let err = dump
            .dump_database(&database("orders"), started_at())
            .await
            .unwrap_err();

        assert!(matches!(err, DumpError::Failed { .. }), "{:?}", err);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let dump = tool(dir.path().join("no-such-mysqldump"), dir.path());

        let err = dump
            .dump_database(&database("orders"), started_at())
            .await
            .unwrap_err();

        assert!(matches!(err, DumpError::Spawn { .. }), "{:?}", err);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_tool_times_out() {
        use crate::backup::test_support::write_script;

        let scripts = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let script = write_script(scripts.path(), "slow-dump", "exec sleep 30\n");
        let mut dump = tool(script, out.path());
        dump.timeout = Some(Duration::from_millis(200));

        let err = dump
            .dump_database(&database("orders"), started_at())
            .await
            .unwrap_err();

        assert!(matches!(err, DumpError::TimedOut(_)), "{:?}", err);
        assert!(dir_entries(out.path()).is_empty());
    }
}
