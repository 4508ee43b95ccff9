//! MCP (Model Context Protocol) server domain types.
//!
//! These types represent MCP servers in the system, independent of any
//! infrastructure concerns (storage, process management, sockets).
//!
//! # Design
//!
//! - `ServerConfig` - Persisted server record, keyed by unique `name`
//! - `TransportConfig` - Stdio (command/args/rootPath) or WebSocket (url)
//! - `ConnectionStatus` / `ConnectionState` - Runtime state machine snapshot
//! - `ConnectionAttempt` - Diagnostic record of one connect operation
//! - `ToolDescriptor` - Tool exposed by an MCP server
//! - `NamespacedTool` - Tool surfaced to a flow node as `tool:<server>:<name>`

mod tools;
mod types;

pub use tools::{
    NamespacedTool, filter_enabled_tools, namespaced_tool_name, parse_namespaced_tool_name,
};
pub use types::{
    AttemptStatus, ConnectionAttempt, ConnectionState, ConnectionStatus, ServerConfig,
    ServerConfigPatch, ToolDescriptor, TransportConfig, TransportKind,
};
