//! Platform-specific data root resolution.

use std::env;
use std::path::PathBuf;

use super::error::PathError;

/// Environment variable that overrides the data root.
pub const DATA_DIR_ENV: &str = "FLOWMCP_DATA_DIR";

/// Get the root directory for application data.
///
/// Resolution order:
/// 1. `FLOWMCP_DATA_DIR` environment variable (highest priority)
/// 2. System data directory (e.g., `~/.local/share/flowmcp`)
///
/// The directory is not created here; see [`super::ensure_directory`].
pub fn data_root() -> Result<PathBuf, PathError> {
    if let Ok(path) = env::var(DATA_DIR_ENV) {
        if path.trim().is_empty() {
            return Err(PathError::EmptyPath);
        }
        return Ok(PathBuf::from(path));
    }

    let data_dir = dirs::data_dir().ok_or(PathError::NoDataDir)?;
    Ok(data_dir.join("flowmcp"))
}
