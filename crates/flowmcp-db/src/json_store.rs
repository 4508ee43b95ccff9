//! JSON blob primitives shared by the repositories.
//!
//! - Absent file: `Ok(None)`, never an error.
//! - Unparseable file: the original bytes are copied to
//!   `<file>.corrupted.<timestamp>.bak` and `RepositoryError::Corrupted` is
//!   returned. The original file is left in place.
//! - Writes go to a temporary sibling and are renamed over the target.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, warn};

use flowmcp_core::RepositoryError;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn storage_err(action: &str, path: &Path, e: &io::Error) -> RepositoryError {
    RepositoryError::Storage(format!("Failed to {action} {}: {e}", path.display()))
}

/// Reject keys that could escape the record directory.
pub fn validate_key(key: &str) -> Result<(), RepositoryError> {
    let invalid = key.trim().is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0']);
    if invalid {
        return Err(RepositoryError::Storage(format!("Invalid record key: {key:?}")));
    }
    Ok(())
}

/// `<dir>/<key>.json`, after validating the key.
pub fn record_path(dir: &Path, key: &str) -> Result<PathBuf, RepositoryError> {
    validate_key(key)?;
    Ok(dir.join(format!("{key}.json")))
}

/// Where a corrupted copy of `path` is written.
pub fn backup_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let file_name = path
        .file_name()
        .map_or_else(|| "record".into(), |n| n.to_string_lossy());
    path.with_file_name(format!("{file_name}.corrupted.{stamp}.bak"))
}

async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, RepositoryError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(storage_err("read", path, &e)),
    }
}

/// Read and parse a JSON file.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RepositoryError> {
    let Some(bytes) = read_bytes(path).await? else {
        return Ok(None);
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(parse_err) => {
            let backup = backup_path(path);
            fs::write(&backup, &bytes)
                .await
                .map_err(|e| storage_err("back up", path, &e))?;
            warn!(
                path = %path.display(),
                backup = %backup.display(),
                error = %parse_err,
                "Corrupted JSON record preserved"
            );
            Err(RepositoryError::Corrupted {
                path: path.to_path_buf(),
                backup,
            })
        }
    }
}

/// Serialize `value` and atomically replace `path`.
pub async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), RepositoryError> {
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| storage_err("create directory", parent, &e))?;
    }

    let file_name = path
        .file_name()
        .map_or_else(|| "record".into(), |n| n.to_string_lossy());
    let tmp = path.with_file_name(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    fs::write(&tmp, &body)
        .await
        .map_err(|e| storage_err("write", &tmp, &e))?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(storage_err("replace", path, &e));
    }
    debug!(path = %path.display(), bytes = body.len(), "Wrote JSON record");
    Ok(())
}

/// Delete `path`. Succeeds if it is already gone.
pub async fn remove_json(path: &Path) -> Result<(), RepositoryError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(storage_err("delete", path, &e)),
    }
}

/// Parse every `*.json` record in `dir`.
///
/// A missing directory lists as empty. Corrupted records are logged and
/// skipped so one bad file does not hide the rest. Listing never writes
/// backups; loading that record directly still fails and backs it up.
pub async fn list_json_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, RepositoryError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(storage_err("list", dir, &e)),
    };

    let mut records = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| storage_err("list", dir, &e))?
    {
        let path = entry.path();
        let is_record = path.extension().is_some_and(|ext| ext == "json")
            && !path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('.'));
        if !is_record {
            continue;
        }
        let Some(bytes) = read_bytes(&path).await? else {
            continue;
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Skipping corrupted record while listing"
                );
            }
        }
    }
    Ok(records)
}
