//! Canonical event union for all cross-adapter events.
//!
//! # Structure
//!
//! - `mcp` - MCP server lifecycle and tool execution events
//! - `flow` - Flow execution events
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "mcp_server_status_changed", "serverName": "calc", "status": "connected", ... }
//! ```

mod flow;
mod mcp;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionStatus, ConversationStatus, NodeType, TransportKind};

/// Canonical event types for all adapters.
///
/// Each variant carries enough context to be self-describing; per-server
/// variants always include `serverName` so consumers can filter on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AppEvent {
    // ========== MCP Server Events ==========
    /// An MCP server was added to the configuration.
    McpServerAdded {
        server_name: String,
        transport: TransportKind,
    },

    /// An MCP server's persisted configuration changed.
    McpServerUpdated { server_name: String },

    /// An MCP server was removed from the configuration.
    McpServerRemoved { server_name: String },

    /// A connection changed state.
    McpServerStatusChanged {
        server_name: String,
        status: ConnectionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    // ========== Tool Execution Events ==========
    ToolExecutionStarted {
        server_name: String,
        tool_name: String,
        token: String,
        timestamp: DateTime<Utc>,
    },

    ToolExecutionCompleted {
        server_name: String,
        tool_name: String,
        token: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    ToolExecutionFailed {
        server_name: String,
        tool_name: String,
        token: String,
        /// Error category (`server`, `transport`, `not_connected`).
        source: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A call was cancelled. Force cancellation has no token or tool.
    ToolExecutionCancelled {
        server_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    ToolExecutionTimedOut {
        server_name: String,
        tool_name: String,
        token: String,
        timeout_ms: u64,
        timestamp: DateTime<Utc>,
    },

    // ========== Flow Events ==========
    /// One node finished its finalize phase.
    FlowNodeExecuted {
        conversation_id: String,
        flow_id: String,
        node_id: String,
        node_type: NodeType,
        action: String,
        timestamp: DateTime<Utc>,
    },

    /// A flow run ended (completed or aborted).
    FlowRunCompleted {
        conversation_id: String,
        flow_id: String,
        status: ConversationStatus,
        steps: usize,
        timestamp: DateTime<Utc>,
    },
}

impl AppEvent {
    /// Get the event name for wire protocols.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::McpServerAdded { .. } => "mcp:added",
            Self::McpServerUpdated { .. } => "mcp:updated",
            Self::McpServerRemoved { .. } => "mcp:removed",
            Self::McpServerStatusChanged { .. } => "mcp:status",
            Self::ToolExecutionStarted { .. } => "tool:started",
            Self::ToolExecutionCompleted { .. } => "tool:completed",
            Self::ToolExecutionFailed { .. } => "tool:failed",
            Self::ToolExecutionCancelled { .. } => "tool:cancelled",
            Self::ToolExecutionTimedOut { .. } => "tool:timed_out",
            Self::FlowNodeExecuted { .. } => "flow:node_executed",
            Self::FlowRunCompleted { .. } => "flow:run_completed",
        }
    }

    /// The MCP server this event concerns, if any.
    pub fn server_name(&self) -> Option<&str> {
        match self {
            Self::McpServerAdded { server_name, .. }
            | Self::McpServerUpdated { server_name }
            | Self::McpServerRemoved { server_name }
            | Self::McpServerStatusChanged { server_name, .. }
            | Self::ToolExecutionStarted { server_name, .. }
            | Self::ToolExecutionCompleted { server_name, .. }
            | Self::ToolExecutionFailed { server_name, .. }
            | Self::ToolExecutionCancelled { server_name, .. }
            | Self::ToolExecutionTimedOut { server_name, .. } => Some(server_name),
            Self::FlowNodeExecuted { .. } | Self::FlowRunCompleted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = AppEvent::mcp_status_changed("calc", ConnectionStatus::Connected, None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "mcp_server_status_changed");
        assert_eq!(json["serverName"], "calc");
        assert_eq!(json["status"], "connected");
        assert!(json.get("message").is_none());
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(AppEvent::mcp_server_removed("calc").event_name(), "mcp:removed");
        assert_eq!(
            AppEvent::tool_cancelled("calc", None, None, "user").event_name(),
            "tool:cancelled"
        );
    }

    #[test]
    fn test_server_name_scoping() {
        assert_eq!(
            AppEvent::mcp_server_updated("calc").server_name(),
            Some("calc")
        );
        let flow_event = AppEvent::flow_run_completed("c1", "f1", ConversationStatus::Completed, 2);
        assert_eq!(flow_event.server_name(), None);
    }
}
