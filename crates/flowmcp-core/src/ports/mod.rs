//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No file handles, process handles or socket types in any signature
//! - Repository traits are minimal and CRUD-focused
//! - "Record absent" is never reported as a storage failure

pub mod chat_model;
pub mod conversation_repository;
pub mod event_emitter;
pub mod flow_repository;
pub mod mcp_error;
pub mod server_config_repository;

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

// Re-export port traits for convenience
pub use chat_model::{ChatCompletion, ChatCompletionRequest, ChatModelError, ChatModelPort, EchoChatModel};
pub use conversation_repository::ConversationRepository;
pub use event_emitter::{AppEventEmitter, NoopEmitter};
pub use flow_repository::FlowRepository;
pub use mcp_error::{McpErrorCategory, McpServiceError, ToolInvocationError};
pub use server_config_repository::ServerConfigRepository;

/// Container for all repository trait objects.
///
/// Lets adapters wire repositories without depending on the concrete
/// `flowmcp-db` implementations.
#[derive(Clone)]
pub struct Repos {
    /// Persisted MCP server configurations.
    pub server_configs: Arc<dyn ServerConfigRepository>,
    /// Conversation (shared state) records.
    pub conversations: Arc<dyn ConversationRepository>,
    /// Flow definitions.
    pub flows: Arc<dyn FlowRepository>,
}

impl Repos {
    /// Create a new Repos container.
    pub fn new(
        server_configs: Arc<dyn ServerConfigRepository>,
        conversations: Arc<dyn ConversationRepository>,
        flows: Arc<dyn FlowRepository>,
    ) -> Self {
        Self {
            server_configs,
            conversations,
            flows,
        }
    }
}

/// Domain-specific errors for repository operations.
///
/// Abstracts away storage implementation details. Absence of a record is
/// `NotFound` (or `Ok(None)` where the port says so); every other variant is
/// fatal to the operation that produced it.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An entity with the same identifier already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Storage backend error (filesystem, etc.).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored record could not be parsed. The original bytes were copied to `backup`.
    #[error("Corrupted record {}: original preserved at {}", path.display(), backup.display())]
    Corrupted { path: PathBuf, backup: PathBuf },
}
