//! Atomic file write helpers.
//!
//! Uses a temp file + rename pattern. On Windows, rename-over-existing fails, so we
//! use a backup-and-restore fallback to avoid data loss when overwriting.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Replace `path` with `bytes`, creating missing parent directories.
///
/// An existing file keeps its permission bits, so rewriting an executable
/// script leaves it executable.
pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let existing_permissions = fs::metadata(path).ok().map(|m| m.permissions());

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    if let Some(perms) = existing_permissions {
        fs::set_permissions(tmp.path(), perms)?;
    }

    if let Err(err) = tmp.persist(path) {
        if !path.exists() {
            return Err(err.error);
        }
        let backup_path = unused_backup_path(parent)?;
        fs::rename(path, &backup_path)?;

        if let Err(rename_err) = err.file.persist(path) {
            let _ = fs::rename(&backup_path, path);
            return Err(rename_err.error);
        }
        if let Err(e) = fs::remove_file(&backup_path) {
            tracing::warn!(
                path = %backup_path.display(),
                "Failed to remove backup after atomic write: {e}"
            );
        }
    }

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Wrote file atomically");
    Ok(())
}

/// A fresh name in `dir` that no existing file uses.
fn unused_backup_path(dir: &Path) -> io::Result<PathBuf> {
    let reserved = tempfile::Builder::new()
        .prefix(".anvil-backup-")
        .tempfile_in(dir)?
        .into_temp_path();
    let backup_path = reserved.to_path_buf();
    reserved.close()?;
    Ok(backup_path)
}
