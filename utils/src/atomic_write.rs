//! Atomic file write helpers.
//!
//! Uses a temp file + rename pattern. On platforms where rename-over-existing
//! fails, the current file is moved to `.bak` first and restored on failure.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// `fsync` the temp file before renaming, then best-effort sync the parent directory.
    #[default]
    Durable,
    /// Skip all syncing. Suitable for tests and throwaway data.
    Fast,
}

/// Recover from an incomplete atomic write by restoring the `.bak` file.
///
/// If `path` does not exist but `path.bak` does, a crash happened inside the
/// backup-rename window of [`atomic_write_with_sync`].
pub fn recover_bak_file(path: &Path) {
    let backup = path.with_extension("bak");
    if !path.exists() && backup.exists() {
        match fs::rename(&backup, path) {
            Ok(()) => {
                tracing::warn!(
                    path = %path.display(),
                    "Recovered .bak file from interrupted atomic write"
                );
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    "Failed to recover .bak file: {e}"
                );
            }
        }
    }
}

pub fn atomic_write_with_sync(
    path: impl AsRef<Path>,
    bytes: &[u8],
    sync: SyncPolicy,
) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    if sync == SyncPolicy::Durable {
        tmp.as_file().sync_all()?;
    }

    if let Err(err) = tmp.persist(path) {
        if !path.exists() {
            return Err(err.error);
        }

        let backup_path = path.with_extension("bak");
        let _ = fs::remove_file(&backup_path);
        fs::rename(path, &backup_path)?;

        if let Err(rename_err) = err.file.persist(path) {
            let _ = fs::rename(&backup_path, path);
            return Err(rename_err.error);
        }
        if let Err(e) = fs::remove_file(&backup_path) {
            tracing::warn!(
                path = %backup_path.display(),
                "Failed to remove .bak after atomic write: {e}"
            );
        }
    }

    if sync == SyncPolicy::Durable {
        best_effort_sync_parent_dir(parent);
    }

    Ok(())
}

#[cfg(unix)]
fn best_effort_sync_parent_dir(parent: &Path) {
    if let Err(e) = fs::File::open(parent).and_then(|d| d.sync_all()) {
        tracing::debug!(
            path = %parent.display(),
            "Parent directory sync_all failed (best-effort): {e}"
        );
    }
}

// Directory handles cannot be synced portably outside unix.
#[cfg(not(unix))]
fn best_effort_sync_parent_dir(_parent: &Path) {}
