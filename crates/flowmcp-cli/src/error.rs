//! CLI-specific error types and mappings.
//!
//! This module provides error types for the CLI adapter and mappings
//! from the MCP and flow errors to exit codes.

use flowmcp_core::{McpErrorCategory, McpServiceError, RepositoryError};
use flowmcp_flow::FlowError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Domain error without a more specific category.
    #[error("{0}")]
    Core(String),

    /// Argument parsing error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Server unreachable or handshake failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server violated the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A named record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another run holds the conversation.
    #[error("Busy: {0}")]
    Busy(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 0: Success
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Core(_) => 1,
            Self::Arguments(_) => 2,   // EX_USAGE
            Self::NotFound(_) => 66,   // EX_NOINPUT
            Self::Connection(_) => 69, // EX_UNAVAILABLE
            Self::Storage(_) => 73,    // EX_CANTCREAT (closest fit)
            Self::Io(_) => 74,         // EX_IOERR
            Self::Busy(_) => 75,       // EX_TEMPFAIL
            Self::Protocol(_) => 76,   // EX_PROTOCOL
            Self::Config(_) => 78,     // EX_CONFIG
        }
    }

    /// Exit code for an error reaching `main`.
    pub fn exit_code_for(err: &anyhow::Error) -> i32 {
        if let Some(cli) = err.downcast_ref::<Self>() {
            return cli.exit_code();
        }
        if let Some(mcp) = err.downcast_ref::<McpServiceError>() {
            return Self::from(mcp).exit_code();
        }
        if let Some(flow) = err.downcast_ref::<FlowError>() {
            return Self::from(flow).exit_code();
        }
        if let Some(repo) = err.downcast_ref::<RepositoryError>() {
            return Self::from(repo).exit_code();
        }
        if err.downcast_ref::<std::io::Error>().is_some() {
            return 74;
        }
        1
    }
}

impl From<&McpServiceError> for CliError {
    fn from(err: &McpServiceError) -> Self {
        let message = err.to_string();
        match err {
            McpServiceError::NotFound(_) => Self::NotFound(message),
            McpServiceError::Repository(repo) => Self::from(repo),
            _ => match err.category() {
                McpErrorCategory::Connection => Self::Connection(message),
                McpErrorCategory::Protocol => Self::Protocol(message),
                McpErrorCategory::Configuration => Self::Config(message),
                McpErrorCategory::Tool | McpErrorCategory::Unknown => Self::Core(message),
            },
        }
    }
}

impl From<&FlowError> for CliError {
    fn from(err: &FlowError) -> Self {
        match err {
            FlowError::Mcp(mcp) => Self::from(mcp),
            FlowError::Persistence(repo) => Self::from(repo),
            FlowError::FlowNotFound(_) => Self::NotFound(err.to_string()),
            FlowError::ConversationBusy(_) => Self::Busy(err.to_string()),
            FlowError::Configuration(_) | FlowError::InvalidGraph(_) => {
                Self::Config(err.to_string())
            }
            FlowError::Model(_) => Self::Core(err.to_string()),
        }
    }
}

impl From<&RepositoryError> for CliError {
    fn from(err: &RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => Self::NotFound(err.to_string()),
            RepositoryError::AlreadyExists(_) => Self::Arguments(err.to_string()),
            _ => Self::Storage(err.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
