//! Flow definition repository port.

use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::Flow;

/// Storage for flow definitions, addressed by flow id.
#[async_trait]
pub trait FlowRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Flow>, RepositoryError>;

    /// Get a flow. `Ok(None)` means no flow with that id exists.
    async fn get(&self, flow_id: &str) -> Result<Option<Flow>, RepositoryError>;

    /// # Errors
    ///
    /// - `AlreadyExists` if a flow with the same id exists
    async fn add(&self, flow: &Flow) -> Result<(), RepositoryError>;

    /// # Errors
    ///
    /// - `NotFound` if no flow with the given id exists
    async fn update(&self, flow: &Flow) -> Result<(), RepositoryError>;

    /// # Errors
    ///
    /// - `NotFound` if no flow with the given id exists
    async fn delete(&self, flow_id: &str) -> Result<(), RepositoryError>;
}
