//! Cache-aside layer over conversation persistence.
//!
//! The live map holds conversations with a run in progress and is
//! authoritative for them. Everything else lives only in storage: a state
//! loaded from storage is returned to the caller but never promoted into the
//! live map, so a finished conversation cannot be revived as "running".

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use flowmcp_core::{ConversationRepository, ConversationUpdate, RepositoryError, SharedState};
use tracing::debug;

use crate::error::FlowError;

pub struct ConversationCache {
    repository: Arc<dyn ConversationRepository>,
    live: Mutex<HashMap<String, SharedState>>,
}

impl ConversationCache {
    pub fn new(repository: Arc<dyn ConversationRepository>) -> Self {
        Self {
            repository,
            live: Mutex::new(HashMap::new()),
        }
    }

    fn live(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedState>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live entry first, then storage. Storage hits are not promoted.
    pub async fn get_or_load(
        &self,
        conversation_id: &str,
    ) -> Result<Option<SharedState>, FlowError> {
        let live = self.live().get(conversation_id).cloned();
        if live.is_some() {
            return Ok(live);
        }
        Ok(self.repository.load(conversation_id).await?)
    }

    /// Register `state` as live, then persist it.
    ///
    /// Fails with `ConversationBusy` if the conversation is already live.
    pub async fn begin_run(&self, state: &SharedState) -> Result<(), FlowError> {
        {
            let mut live = self.live();
            if live.contains_key(&state.conversation_id) {
                return Err(FlowError::ConversationBusy(state.conversation_id.clone()));
            }
            live.insert(state.conversation_id.clone(), state.clone());
        }

        if let Err(e) = self.repository.save(state).await {
            self.evict(&state.conversation_id);
            return Err(e.into());
        }
        Ok(())
    }

    /// Persist `state`, then mirror it into the live entry if there is one.
    pub async fn put_and_persist(&self, state: &SharedState) -> Result<(), FlowError> {
        self.repository.save(state).await?;
        if let Some(entry) = self.live().get_mut(&state.conversation_id) {
            entry.clone_from(state);
        }
        Ok(())
    }

    /// Drop the live entry. Storage is untouched.
    pub fn evict(&self, conversation_id: &str) -> Option<SharedState> {
        let evicted = self.live().remove(conversation_id);
        if evicted.is_some() {
            debug!(conversation_id = %conversation_id, "Evicted live conversation");
        }
        evicted
    }

    pub fn is_live(&self, conversation_id: &str) -> bool {
        self.live().contains_key(conversation_id)
    }

    pub fn live_ids(&self) -> Vec<String> {
        self.live().keys().cloned().collect()
    }

    /// Apply a metadata update: persist first, then mirror, always bumping
    /// `updatedAt`.
    pub async fn update(
        &self,
        conversation_id: &str,
        update: &ConversationUpdate,
    ) -> Result<SharedState, FlowError> {
        let mut state = self
            .get_or_load(conversation_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(conversation_id.to_string()))?;
        state.apply(update);
        self.put_and_persist(&state).await?;
        Ok(state)
    }

    /// Evict and delete. Succeeds if the record is already gone.
    pub async fn delete(&self, conversation_id: &str) -> Result<(), FlowError> {
        self.evict(conversation_id);
        self.repository.delete(conversation_id).await?;
        Ok(())
    }

    /// All stored conversations, with live entries taking precedence.
    pub async fn list(&self) -> Result<Vec<SharedState>, FlowError> {
        let mut stored = self.repository.list().await?;
        let live = self.live();
        for state in &mut stored {
            if let Some(current) = live.get(&state.conversation_id) {
                state.clone_from(current);
            }
        }
        Ok(stored)
    }
}
