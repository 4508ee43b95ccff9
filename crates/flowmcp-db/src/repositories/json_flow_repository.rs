//! Flow definitions stored as one JSON file per id under `flows/`.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use flowmcp_core::ports::{FlowRepository, RepositoryError};
use flowmcp_core::Flow;

use crate::json_store::{list_json_dir, read_json, record_path, remove_json, write_json};

pub struct JsonFlowRepository {
    dir: PathBuf,
    /// Makes the existence check and the write of add/update/delete atomic.
    lock: Mutex<()>,
}

impl JsonFlowRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    async fn exists(&self, flow_id: &str) -> Result<bool, RepositoryError> {
        let path = record_path(&self.dir, flow_id)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| RepositoryError::Storage(format!("Failed to stat {}: {e}", path.display())))
    }
}

#[async_trait]
impl FlowRepository for JsonFlowRepository {
    async fn list(&self) -> Result<Vec<Flow>, RepositoryError> {
        let mut flows: Vec<Flow> = list_json_dir(&self.dir).await?;
        flows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(flows)
    }

    async fn get(&self, flow_id: &str) -> Result<Option<Flow>, RepositoryError> {
        read_json(&record_path(&self.dir, flow_id)?).await
    }

    async fn add(&self, flow: &Flow) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        if self.exists(&flow.id).await? {
            return Err(RepositoryError::AlreadyExists(format!("Flow '{}'", flow.id)));
        }
        write_json(&record_path(&self.dir, &flow.id)?, flow).await
    }

    async fn update(&self, flow: &Flow) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        if !self.exists(&flow.id).await? {
            return Err(RepositoryError::NotFound(format!("Flow '{}'", flow.id)));
        }
        write_json(&record_path(&self.dir, &flow.id)?, flow).await
    }

    async fn delete(&self, flow_id: &str) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        if !self.exists(flow_id).await? {
            return Err(RepositoryError::NotFound(format!("Flow '{flow_id}'")));
        }
        remove_json(&record_path(&self.dir, flow_id)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmcp_core::{FlowNode, McpToolProperties, NodeKind, StartProperties};

    fn sample_flow() -> Flow {
        Flow::new("calc-flow", "Calculator")
            .with_node(FlowNode::new("start", NodeKind::Start(StartProperties::default())))
            .with_node(FlowNode::new(
                "tools",
                NodeKind::McpTool(McpToolProperties::bound_to("calc")),
            ))
            .with_edge("start", "tools")
    }

    #[tokio::test]
    async fn test_crud() {
        let temp = tempfile::tempdir().unwrap();
        let repo = JsonFlowRepository::new(temp.path().join("flows"));
        let flow = sample_flow();

        repo.add(&flow).await.unwrap();
        assert!(matches!(
            repo.add(&flow).await,
            Err(RepositoryError::AlreadyExists(_))
        ));
        assert_eq!(repo.get("calc-flow").await.unwrap(), Some(flow.clone()));

        let mut renamed = flow.clone();
        renamed.name = "Calc v2".into();
        repo.update(&renamed).await.unwrap();
        assert_eq!(repo.list().await.unwrap(), vec![renamed]);

        repo.delete("calc-flow").await.unwrap();
        assert!(repo.get("calc-flow").await.unwrap().is_none());
        assert!(matches!(
            repo.delete("calc-flow").await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let repo = JsonFlowRepository::new(temp.path());
        assert!(matches!(
            repo.update(&sample_flow()).await,
            Err(RepositoryError::NotFound(_))
        ));
    }
}
