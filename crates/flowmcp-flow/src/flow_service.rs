//! Flow definition CRUD.

use std::sync::Arc;

use flowmcp_core::{Flow, FlowRepository, RepositoryError};
use tracing::info;

use crate::error::FlowError;
use crate::graph::CompiledFlow;

/// Flow CRUD over the repository port. Graphs are validated before they are
/// stored, so every persisted flow compiles.
pub struct FlowService {
    repository: Arc<dyn FlowRepository>,
}

impl FlowService {
    pub fn new(repository: Arc<dyn FlowRepository>) -> Self {
        Self { repository }
    }

    pub async fn list(&self) -> Result<Vec<Flow>, FlowError> {
        Ok(self.repository.list().await?)
    }

    pub async fn get(&self, flow_id: &str) -> Result<Flow, FlowError> {
        self.repository
            .get(flow_id)
            .await?
            .ok_or_else(|| FlowError::FlowNotFound(flow_id.to_string()))
    }

    pub async fn add(&self, flow: &Flow) -> Result<(), FlowError> {
        CompiledFlow::compile(flow)?;
        self.repository.add(flow).await?;
        info!(flow_id = %flow.id, nodes = flow.nodes.len(), "Added flow");
        Ok(())
    }

    pub async fn update(&self, flow: &Flow) -> Result<(), FlowError> {
        CompiledFlow::compile(flow)?;
        self.repository.update(flow).await.map_err(|e| not_found(e, &flow.id))?;
        info!(flow_id = %flow.id, "Updated flow");
        Ok(())
    }

    pub async fn delete(&self, flow_id: &str) -> Result<(), FlowError> {
        self.repository
            .delete(flow_id)
            .await
            .map_err(|e| not_found(e, flow_id))?;
        info!(flow_id = %flow_id, "Deleted flow");
        Ok(())
    }

    /// Parse a flow definition from JSON and add it.
    pub async fn import_json(&self, json: &str) -> Result<Flow, FlowError> {
        let flow: Flow = serde_json::from_str(json)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        self.add(&flow).await?;
        Ok(flow)
    }
}

fn not_found(err: RepositoryError, flow_id: &str) -> FlowError {
    match err {
        RepositoryError::NotFound(_) => FlowError::FlowNotFound(flow_id.to_string()),
        other => other.into(),
    }
}
