//! Local disk helpers for boot and data volumes.

use std::fs::OpenOptions;
use std::path::Path;

use unik_types::{UnikError, UnikResult};

/// Create an empty fixed-size volume backing file.
///
/// The file is sparse: it reports `size_mb` megabytes but only consumes
/// blocks as the guest writes them.
pub fn build_empty_volume(path: &Path, size_mb: u64) -> UnikResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            UnikError::Storage(format!(
                "creating volume directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| {
            UnikError::Storage(format!("creating volume file {}: {}", path.display(), e))
        })?;
    file.set_len(size_mb * 1024 * 1024).map_err(|e| {
        UnikError::Storage(format!(
            "sizing volume file {} to {}mb: {}",
            path.display(),
            size_mb,
            e
        ))
    })?;

    tracing::debug!(path = %path.display(), size_mb, "created empty volume");
    Ok(())
}

/// Copy a disk file, creating the destination directory if needed.
pub fn copy_file(src: &Path, dst: &Path) -> UnikResult<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            UnikError::Storage(format!("creating directory {}: {}", parent.display(), e))
        })?;
    }
    std::fs::copy(src, dst).map_err(|e| {
        UnikError::Storage(format!(
            "copying {} to {}: {}",
            src.display(),
            dst.display(),
            e
        ))
    })?;
    Ok(())
}
