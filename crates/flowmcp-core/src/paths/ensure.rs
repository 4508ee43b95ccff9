//! Directory creation and verification.

use std::fs;
use std::path::Path;

use super::error::PathError;

/// What to do when a directory is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectoryCreationStrategy {
    /// Create it (and parents).
    #[default]
    AutoCreate,
    /// Fail with `DirectoryNotFound`.
    Disallow,
}

/// Make sure `path` is an existing, writable directory.
pub fn ensure_directory(path: &Path, strategy: DirectoryCreationStrategy) -> Result<(), PathError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(PathError::NotADirectory(path.to_path_buf()));
        }
    } else if strategy == DirectoryCreationStrategy::AutoCreate {
        fs::create_dir_all(path).map_err(|e| PathError::CreateFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    } else {
        return Err(PathError::DirectoryNotFound(path.to_path_buf()));
    }

    verify_writable(path)
}

/// Probe writability by creating and removing a marker file.
pub fn verify_writable(path: &Path) -> Result<(), PathError> {
    let marker = path.join(".flowmcp_write_test");
    fs::write(&marker, b"ok").map_err(|e| PathError::NotWritable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let _ = fs::remove_file(&marker);
    Ok(())
}
