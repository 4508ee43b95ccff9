//! MCP server lifecycle and tool execution event constructors.

use std::time::Duration;

use chrono::Utc;

use super::AppEvent;
use crate::domain::{ConnectionStatus, TransportKind};

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl AppEvent {
    pub fn mcp_server_added(server_name: impl Into<String>, transport: TransportKind) -> Self {
        Self::McpServerAdded {
            server_name: server_name.into(),
            transport,
        }
    }

    pub fn mcp_server_updated(server_name: impl Into<String>) -> Self {
        Self::McpServerUpdated {
            server_name: server_name.into(),
        }
    }

    pub fn mcp_server_removed(server_name: impl Into<String>) -> Self {
        Self::McpServerRemoved {
            server_name: server_name.into(),
        }
    }

    /// Create a status transition event stamped with the current time.
    pub fn mcp_status_changed(
        server_name: impl Into<String>,
        status: ConnectionStatus,
        message: Option<String>,
    ) -> Self {
        Self::McpServerStatusChanged {
            server_name: server_name.into(),
            status,
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_started(server_name: &str, tool_name: &str, token: &str) -> Self {
        Self::ToolExecutionStarted {
            server_name: server_name.to_string(),
            tool_name: tool_name.to_string(),
            token: token.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_completed(server_name: &str, tool_name: &str, token: &str, elapsed: Duration) -> Self {
        Self::ToolExecutionCompleted {
            server_name: server_name.to_string(),
            tool_name: tool_name.to_string(),
            token: token.to_string(),
            duration_ms: millis(elapsed),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_failed(
        server_name: &str,
        tool_name: &str,
        token: &str,
        source: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::ToolExecutionFailed {
            server_name: server_name.to_string(),
            tool_name: tool_name.to_string(),
            token: token.to_string(),
            source: source.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_cancelled(
        server_name: &str,
        tool_name: Option<&str>,
        token: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ToolExecutionCancelled {
            server_name: server_name.to_string(),
            tool_name: tool_name.map(str::to_string),
            token: token.map(str::to_string),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_timed_out(server_name: &str, tool_name: &str, token: &str, after: Duration) -> Self {
        Self::ToolExecutionTimedOut {
            server_name: server_name.to_string(),
            tool_name: tool_name.to_string(),
            token: token.to_string(),
            timeout_ms: millis(after),
            timestamp: Utc::now(),
        }
    }
}
