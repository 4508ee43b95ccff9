//! MCP service error types.
//!
//! `McpServiceError` wraps repository errors and adds supervisor-level failure
//! modes without leaking infrastructure details (OS process errors, socket
//! errors). `ToolInvocationError` is the typed result of a failed tool call.

use std::time::Duration;

use thiserror::Error;

use super::RepositoryError;

/// Why a single tool invocation failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolInvocationError {
    /// The caller's wait expired. The connection is left intact.
    #[error("Tool '{tool}' on '{server}' timed out after {}ms", after.as_millis())]
    Timeout {
        server: String,
        tool: String,
        after: Duration,
    },

    /// The call was cancelled in-protocol or by a forced reconnect.
    #[error("Tool call cancelled: {reason}")]
    Cancelled { reason: String },

    /// The server has no live connection.
    #[error("MCP server not connected: {0}")]
    NotConnected(String),

    /// The server answered with a JSON-RPC error.
    #[error("MCP server error {code}: {message}")]
    Server { code: i64, message: String },

    /// The transport failed or closed while the call was pending.
    #[error("MCP transport error: {0}")]
    Transport(String),
}

impl ToolInvocationError {
    /// Wire tag reported as `source` in events and API responses.
    pub const fn source_tag(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::NotConnected(_) => "not_connected",
            Self::Server { .. } => "server",
            Self::Transport(_) => "transport",
        }
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Domain-specific errors for MCP service operations.
#[derive(Debug, Error)]
pub enum McpServiceError {
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// No server with this name is configured.
    #[error("MCP server not found: {0}")]
    NotFound(String),

    /// The server is configured but disabled.
    #[error("MCP server is disabled: {0}")]
    Disabled(String),

    /// Spawning the transport or completing the handshake failed.
    #[error("Failed to connect to MCP server '{server}': {message}")]
    ConnectFailed { server: String, message: String },

    /// Protocol error (JSON-RPC communication failure).
    #[error("MCP protocol error: {0}")]
    Protocol(String),

    /// Tool invocation failed.
    #[error(transparent)]
    Tool(#[from] ToolInvocationError),

    /// Configuration validation error.
    #[error("Invalid MCP configuration: {0}")]
    InvalidConfig(String),

    /// Internal service error.
    #[error("Internal MCP error: {0}")]
    Internal(String),
}

impl McpServiceError {
    pub const fn category(&self) -> McpErrorCategory {
        match self {
            Self::Repository(_) | Self::Internal(_) => McpErrorCategory::Unknown,
            Self::NotFound(_) | Self::Disabled(_) | Self::InvalidConfig(_) => {
                McpErrorCategory::Configuration
            }
            Self::ConnectFailed { .. } => McpErrorCategory::Connection,
            Self::Protocol(_) => McpErrorCategory::Protocol,
            Self::Tool(_) => McpErrorCategory::Tool,
        }
    }

    /// `source` tag reported by the invocation surface.
    pub const fn source_tag(&self) -> &'static str {
        match self {
            Self::Tool(e) => e.source_tag(),
            Self::ConnectFailed { .. } | Self::Disabled(_) => "not_connected",
            Self::NotFound(_) | Self::InvalidConfig(_) => "config",
            Self::Protocol(_) => "protocol",
            Self::Repository(_) | Self::Internal(_) => "internal",
        }
    }
}

/// Categories of MCP errors for adapter-level handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpErrorCategory {
    /// Process spawn, handshake or socket error.
    Connection,
    /// Protocol communication error.
    Protocol,
    /// Tool invocation error.
    Tool,
    /// Configuration error.
    Configuration,
    /// Unknown/internal error.
    Unknown,
}
