//! MCP server configurations stored in a single `mcp_servers.json`.
//!
//! File shape: `{ "mcpServers": { "<name>": { "name": "<name>", ... } } }`.
//! The map key is authoritative for the name.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use flowmcp_core::ports::{RepositoryError, ServerConfigRepository};
use flowmcp_core::ServerConfig;

use crate::json_store::{read_json, write_json};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServersFile {
    #[serde(default)]
    mcp_servers: BTreeMap<String, ServerConfig>,
}

/// JSON-file implementation of the server configuration repository.
pub struct JsonServerConfigRepository {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl JsonServerConfigRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read(&self) -> Result<ServersFile, RepositoryError> {
        let mut file: ServersFile = read_json(&self.path).await?.unwrap_or_default();
        for (key, config) in &mut file.mcp_servers {
            if config.name != *key {
                config.name.clone_from(key);
            }
        }
        Ok(file)
    }
}

#[async_trait]
impl ServerConfigRepository for JsonServerConfigRepository {
    async fn list(&self) -> Result<Vec<ServerConfig>, RepositoryError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.mcp_servers.into_values().collect())
    }

    async fn get(&self, name: &str) -> Result<ServerConfig, RepositoryError> {
        let _guard = self.lock.lock().await;
        self.read()
            .await?
            .mcp_servers
            .remove(name)
            .ok_or_else(|| RepositoryError::NotFound(format!("MCP server '{name}'")))
    }

    async fn insert(&self, config: ServerConfig) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        if file.mcp_servers.contains_key(&config.name) {
            return Err(RepositoryError::AlreadyExists(format!(
                "MCP server '{}'",
                config.name
            )));
        }
        file.mcp_servers.insert(config.name.clone(), config);
        write_json(&self.path, &file).await
    }

    async fn update(&self, config: &ServerConfig) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        let Some(slot) = file.mcp_servers.get_mut(&config.name) else {
            return Err(RepositoryError::NotFound(format!(
                "MCP server '{}'",
                config.name
            )));
        };
        *slot = config.clone();
        write_json(&self.path, &file).await
    }

    async fn delete(&self, name: &str) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        if file.mcp_servers.remove(name).is_none() {
            return Err(RepositoryError::NotFound(format!("MCP server '{name}'")));
        }
        write_json(&self.path, &file).await
    }
}
