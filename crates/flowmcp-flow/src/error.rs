//! Flow engine error types.

use flowmcp_core::{ChatModelError, McpServiceError, RepositoryError};
use thiserror::Error;

/// Errors raised while validating or running a flow.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A node is misconfigured (missing server binding, bad template, step
    /// limit exceeded). Aborts the current node without side effects.
    #[error("Flow configuration error: {0}")]
    Configuration(String),

    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    /// The graph itself is malformed: duplicate ids, dangling edges, no start.
    #[error("Invalid flow graph: {0}")]
    InvalidGraph(String),

    /// A run is already in progress for this conversation.
    #[error("Conversation is already running: {0}")]
    ConversationBusy(String),

    #[error(transparent)]
    Mcp(#[from] McpServiceError),

    #[error(transparent)]
    Model(#[from] ChatModelError),

    #[error(transparent)]
    Persistence(#[from] RepositoryError),
}

impl FlowError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invalid_graph(message: impl Into<String>) -> Self {
        Self::InvalidGraph(message.into())
    }
}
