//! Core domain types, ports and settings for flowmcp.
//!
//! `flowmcp-core` has no infrastructure dependencies: the MCP supervisor
//! (`flowmcp-mcp`), the flow engine (`flowmcp-flow`) and the JSON store
//! (`flowmcp-db`) all meet here through the port traits.
//!
//! # Modules
//!
//! - [`domain`] - server configs, connection state, tools, flows, conversations
//! - [`ports`] - repository, event emitter and chat model traits; error taxonomy
//! - [`events`] - the `AppEvent` union pushed to subscribers
//! - [`settings`] - tunables read from `FLOWMCP_*` environment variables
//! - [`paths`] - data directory resolution and file layout
//! - [`contracts`] - adapter-facing request/response shapes

#![deny(unused_crate_dependencies)]

pub mod contracts;
pub mod domain;
pub mod events;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    AttemptStatus, ChatMessage, ConnectionAttempt, ConnectionState, ConnectionStatus,
    ConversationStatus, ConversationUpdate, DEFAULT_ACTION, FinishProperties, Flow, FlowEdge,
    FlowNode, McpContext, McpToolProperties, MessageRole, NamespacedTool, NodeKind, NodeType,
    ProcessProperties, ServerConfig, ServerConfigPatch, SharedState, StartProperties, Successors,
    ToolCallRequest, ToolDescriptor, TraceEntry, TransportConfig, TransportKind,
    filter_enabled_tools, namespaced_tool_name, parse_namespaced_tool_name,
};
pub use events::AppEvent;
pub use ports::{
    AppEventEmitter, ChatCompletion, ChatCompletionRequest, ChatModelError, ChatModelPort,
    ConversationRepository, EchoChatModel, FlowRepository, McpErrorCategory, McpServiceError,
    NoopEmitter, Repos, RepositoryError, ServerConfigRepository, ToolInvocationError,
};
pub use settings::{Settings, SettingsError, validate_settings};

// Re-export path utilities
pub use paths::{
    DATA_DIR_ENV, DataPaths, DirectoryCreationStrategy, PathError, data_root, ensure_directory,
    verify_writable,
};

#[cfg(test)]
use tokio_test as _;
