//! Moving stored attachments when their declared type changes.
//!
//! File names embed the declared type, so reclassification renames the file.
//! Callers rename first, persist metadata second, and call [`restore`] if the
//! metadata write fails.

use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};
use tryon_core::error::{PersistenceError, ReclassifyError};
use tryon_core::{ImageKind, UserId, naming};

pub(crate) fn io_error(path: &Path, e: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Rename `current` to a fresh name tagged with `kind` in the same directory.
///
/// A missing source file is reported as [`ReclassifyError::MissingAsset`];
/// other I/O failures are persistence errors.
pub(crate) async fn relocate(
    user: &UserId,
    record_id: &str,
    current: &Path,
    kind: ImageKind,
) -> Result<PathBuf, ReclassifyError> {
    let dir = current.parent().unwrap_or_else(|| Path::new("."));
    let target = vacant(naming::input_path(dir, user, kind)).await;

    match tokio::fs::rename(current, &target).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(record = record_id, path = %current.display(), "Stored image is missing");
            return Err(ReclassifyError::MissingAsset {
                record_id: record_id.to_string(),
                path: current.to_path_buf(),
            });
        }
        Err(e) => return Err(io_error(current, e).into()),
    }
    debug!(from = %current.display(), to = %target.display(), "Relocated asset");
    Ok(target)
}

/// `base`, or `{stem}-N.png` beside it for the first N not taken.
async fn vacant(base: PathBuf) -> PathBuf {
    let dir = base.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string();
    let mut target = base;
    let mut bump = 0u32;
    while tokio::fs::try_exists(&target).await.unwrap_or(false) {
        bump += 1;
        target = dir.join(format!("{stem}-{bump}.png"));
    }
    target
}

/// Undo a [`relocate`] after the metadata write failed.
pub(crate) async fn restore(moved: &Path, original: &Path) {
    if let Err(e) = tokio::fs::rename(moved, original).await {
        error!(
            from = %moved.display(),
            to = %original.display(),
            error = %e,
            "Failed to restore asset after aborted reclassification"
        );
    }
}
