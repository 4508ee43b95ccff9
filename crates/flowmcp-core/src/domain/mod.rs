//! Core domain types.
//!
//! These types represent the pure domain model, independent of any
//! infrastructure concerns (files, processes, sockets).
//!
//! # Structure
//!
//! - `mcp` - MCP server configuration, connection state and tool types
//! - `flow` - Flow graph definitions (nodes, edges, successors)
//! - `conversation` - Shared conversation state threaded through a flow run

pub mod conversation;
pub mod flow;
pub mod mcp;

// Re-export MCP types at the domain level for convenience
pub use mcp::{
    AttemptStatus, ConnectionAttempt, ConnectionState, ConnectionStatus, NamespacedTool,
    ServerConfig, ServerConfigPatch, ToolDescriptor, TransportConfig, TransportKind,
    filter_enabled_tools, namespaced_tool_name, parse_namespaced_tool_name,
};

// Re-export flow types at the domain level for convenience
pub use flow::{
    DEFAULT_ACTION, FinishProperties, Flow, FlowEdge, FlowNode, McpToolProperties, NodeKind,
    NodeType, ProcessProperties, StartProperties, Successors,
};

// Re-export conversation types at the domain level for convenience
pub use conversation::{
    ChatMessage, ConversationStatus, ConversationUpdate, McpContext, MessageRole, SharedState,
    ToolCallRequest, TraceEntry,
};
