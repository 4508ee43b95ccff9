//! Conversation persistence port.

use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::SharedState;

/// Durable storage for conversation state, keyed by `conversationId`.
///
/// Persistence is lossless: `save` followed by `load` yields an equal value.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Load a conversation. `Ok(None)` means the record does not exist.
    ///
    /// # Errors
    ///
    /// - `Corrupted` if the record exists but cannot be parsed
    /// - `Storage` for any other read failure
    async fn load(&self, conversation_id: &str) -> Result<Option<SharedState>, RepositoryError>;

    /// Write a conversation, replacing any previous record.
    async fn save(&self, state: &SharedState) -> Result<(), RepositoryError>;

    /// Delete a conversation. Succeeds if the record is already absent.
    async fn delete(&self, conversation_id: &str) -> Result<(), RepositoryError>;

    /// List all stored conversations, most recently updated first.
    async fn list(&self) -> Result<Vec<SharedState>, RepositoryError>;
}
