//! MCP server configuration repository port.

use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::ServerConfig;

/// Repository trait for MCP server configuration persistence.
///
/// # Design Rules
///
/// - `name` is the key; it is unique across all records
/// - `update()` replaces the entire record atomically
/// - Records are returned in a stable order (by name)
#[async_trait]
pub trait ServerConfigRepository: Send + Sync {
    /// List all server configurations.
    async fn list(&self) -> Result<Vec<ServerConfig>, RepositoryError>;

    /// Get a server configuration by name.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no server with the given name exists
    async fn get(&self, name: &str) -> Result<ServerConfig, RepositoryError>;

    /// Insert a new server configuration.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if a server with the same name exists
    async fn insert(&self, config: ServerConfig) -> Result<(), RepositoryError>;

    /// Replace an existing server configuration.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no server with the given name exists
    async fn update(&self, config: &ServerConfig) -> Result<(), RepositoryError>;

    /// Delete a server configuration by name.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no server with the given name exists
    async fn delete(&self, name: &str) -> Result<(), RepositoryError>;
}
