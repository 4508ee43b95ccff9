//! Composition utilities for building `Repos` with JSON file backends.
//!
//! Construction only; no domain logic lives here.

use std::sync::Arc;

use flowmcp_core::{DataPaths, Repos};

use crate::repositories::{
    JsonConversationRepository, JsonFlowRepository, JsonServerConfigRepository,
};

/// Factory for creating repository instances backed by the data directory.
pub struct CoreFactory;

impl CoreFactory {
    /// Build all JSON repositories for the given layout.
    pub fn build_repos(paths: &DataPaths) -> Repos {
        Repos::new(
            Arc::new(JsonServerConfigRepository::new(&paths.mcp_servers)),
            Arc::new(JsonConversationRepository::new(&paths.conversations)),
            Arc::new(JsonFlowRepository::new(&paths.flows)),
        )
    }
}

/// A throwaway data directory with repositories wired to it.
///
/// The directory is removed when this value is dropped.
#[cfg(any(test, feature = "test-utils"))]
pub struct TestStore {
    _temp: tempfile::TempDir,
    pub paths: DataPaths,
    pub repos: Repos,
}

#[cfg(any(test, feature = "test-utils"))]
impl TestStore {
    pub fn new() -> anyhow::Result<Self> {
        let temp = tempfile::tempdir()?;
        let paths = crate::setup::setup_data_dir(temp.path())?;
        let repos = CoreFactory::build_repos(&paths);
        Ok(Self {
            _temp: temp,
            paths,
            repos,
        })
    }
}
