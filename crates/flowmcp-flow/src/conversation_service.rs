//! Conversation queries and metadata updates for adapters.

use std::sync::Arc;

use flowmcp_core::{ConversationUpdate, SharedState};

use crate::conversation_cache::ConversationCache;
use crate::error::FlowError;

pub struct ConversationService {
    cache: Arc<ConversationCache>,
}

impl ConversationService {
    pub fn new(cache: Arc<ConversationCache>) -> Self {
        Self { cache }
    }

    /// Stored conversations, most recently updated first.
    pub async fn list(&self) -> Result<Vec<SharedState>, FlowError> {
        self.cache.list().await
    }

    /// Live state if a run is in progress, else the stored record.
    pub async fn get(&self, conversation_id: &str) -> Result<Option<SharedState>, FlowError> {
        self.cache.get_or_load(conversation_id).await
    }

    pub async fn update(
        &self,
        conversation_id: &str,
        update: &ConversationUpdate,
    ) -> Result<SharedState, FlowError> {
        self.cache.update(conversation_id, update).await
    }

    pub async fn delete(&self, conversation_id: &str) -> Result<(), FlowError> {
        self.cache.delete(conversation_id).await
    }

    pub fn is_running(&self, conversation_id: &str) -> bool {
        self.cache.is_live(conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use flowmcp_db::TestStore;

    use super::*;

    #[tokio::test]
    async fn test_list_prefers_live_state() {
        let store = TestStore::new().unwrap();
        let cache = Arc::new(ConversationCache::new(Arc::clone(&store.repos.conversations)));
        let service = ConversationService::new(Arc::clone(&cache));

        let mut state = SharedState::new("c1", "Stored");
        cache.begin_run(&state).await.unwrap();
        state.title = "Live".to_string();
        cache.put_and_persist(&state).await.unwrap();

        let listed = service.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Live");
        assert!(service.is_running("c1"));

        service.delete("c1").await.unwrap();
        assert!(service.get("c1").await.unwrap().is_none());
        assert!(!service.is_running("c1"));
    }
}
