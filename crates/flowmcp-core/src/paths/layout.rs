//! File layout under the data root.

use std::path::{Path, PathBuf};

use super::ensure::{DirectoryCreationStrategy, ensure_directory};
use super::error::PathError;

const MCP_SERVERS_FILE: &str = "mcp_servers.json";
const CONVERSATIONS_DIR: &str = "conversations";
const FLOWS_DIR: &str = "flows";

pub fn mcp_servers_path(root: &Path) -> PathBuf {
    root.join(MCP_SERVERS_FILE)
}

pub fn conversations_dir(root: &Path) -> PathBuf {
    root.join(CONVERSATIONS_DIR)
}

pub fn flows_dir(root: &Path) -> PathBuf {
    root.join(FLOWS_DIR)
}

/// Resolved locations of every persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
    pub mcp_servers: PathBuf,
    pub conversations: PathBuf,
    pub flows: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            mcp_servers: mcp_servers_path(&root),
            conversations: conversations_dir(&root),
            flows: flows_dir(&root),
            root,
        }
    }

    /// Create the root and record directories if missing.
    pub fn ensure(&self) -> Result<(), PathError> {
        for dir in [&self.root, &self.conversations, &self.flows] {
            ensure_directory(dir, DirectoryCreationStrategy::AutoCreate)?;
        }
        Ok(())
    }
}
