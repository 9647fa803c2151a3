//! Filesystem helpers for package files
//!
//! Restores use copy-then-delete instead of rename so a backup survives until
//! its copy is complete.

use hearth_errors::Error;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Result type for filesystem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Copy `src` over `dst`, then delete `src`
///
/// # Errors
///
/// Returns an error if the copy fails (the source is kept) or if the source
/// cannot be removed afterwards.
pub async fn copy_then_delete(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .await
        .map_err(|e| Error::io_with_path(&e, src))?;
    fs::remove_file(src)
        .await
        .map_err(|e| Error::io_with_path(&e, src))
}

/// Remove a file, treating a missing file as success
///
/// Returns whether a file was removed.
///
/// # Errors
///
/// Returns an error for any failure other than the file not existing.
pub async fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io_with_path(&e, path)),
    }
}

/// Write a file through a temporary sibling and rename it into place
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the write
/// or rename fails.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)
        .await
        .map_err(|e| Error::io_with_path(&e, &tmp))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))
}

/// Regular files directly inside `dir`
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| Error::io_with_path(&e, dir))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_with_path(&e, dir))?
    {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
