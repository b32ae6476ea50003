// mysql-s3-backup/src/backup/archive.rs
use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Builder;
use tempfile::TempPath;
use tracing::info;

use crate::errors::ArchiveError;

/// `<source>.tar.gz`, next to the source file.
pub fn archive_path_for(source: &Path) -> PathBuf {
    let mut path: OsString = source.as_os_str().to_owned();
    path.push(".tar.gz");
    PathBuf::from(path)
}

/// Wraps a single file into a GZipped TAR archive.
///
/// The entry is named after the source's base name and carries its size,
/// modification time and mode. The source file is left in place. The archive
/// is deleted when the returned path drops, and on any error.
pub fn compress_file(source: &Path) -> Result<TempPath, ArchiveError> {
    let entry_name = source
        .file_name()
        .ok_or_else(|| ArchiveError::InvalidSource(source.to_path_buf()))?
        .to_owned();

    let mut source_file = File::open(source).map_err(|e| ArchiveError::Open {
        path: source.to_path_buf(),
        source: e,
    })?;

    let archive_dest_path = archive_path_for(source);
    let archive_file = File::create(&archive_dest_path).map_err(|e| ArchiveError::Create {
        path: archive_dest_path.clone(),
        source: e,
    })?;
    let archive = TempPath::from_path(archive_dest_path);
    let write_error = |e: std::io::Error| ArchiveError::Write {
        path: archive.to_path_buf(),
        source: e,
    };

    let enc = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    // append_file takes size, mtime and mode from the open file's metadata.
    tar_builder
        .append_file(&entry_name, &mut source_file)
        .map_err(write_error)?;

    let encoder = tar_builder.into_inner().map_err(write_error)?;
    let archive_file = encoder.finish().map_err(write_error)?;
    archive_file.sync_all().map_err(write_error)?;

    info!("Tar.gz archive created at {}", archive.display());
    Ok(archive)
}
