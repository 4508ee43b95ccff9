//! Conversations stored as one JSON file per id under `conversations/`.

use std::path::PathBuf;

use async_trait::async_trait;

use flowmcp_core::ports::{ConversationRepository, RepositoryError};
use flowmcp_core::SharedState;

use crate::json_store::{list_json_dir, read_json, record_path, remove_json, write_json};

pub struct JsonConversationRepository {
    dir: PathBuf,
}

impl JsonConversationRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ConversationRepository for JsonConversationRepository {
    async fn load(&self, conversation_id: &str) -> Result<Option<SharedState>, RepositoryError> {
        read_json(&record_path(&self.dir, conversation_id)?).await
    }

    async fn save(&self, state: &SharedState) -> Result<(), RepositoryError> {
        write_json(&record_path(&self.dir, &state.conversation_id)?, state).await
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), RepositoryError> {
        remove_json(&record_path(&self.dir, conversation_id)?).await
    }

    async fn list(&self) -> Result<Vec<SharedState>, RepositoryError> {
        let mut states: Vec<SharedState> = list_json_dir(&self.dir).await?;
        states.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(states)
    }
}
