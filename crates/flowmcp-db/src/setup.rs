//! Data directory setup.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use flowmcp_core::DataPaths;

/// Resolve the layout under `root` and create the record directories.
///
/// `mcp_servers.json` is not created; an absent file lists as no servers.
pub fn setup_data_dir(root: &Path) -> Result<DataPaths> {
    let paths = DataPaths::new(root);
    paths
        .ensure()
        .with_context(|| format!("Failed to prepare data directory {}", root.display()))?;
    debug!(root = %root.display(), "Data directory ready");
    Ok(paths)
}
