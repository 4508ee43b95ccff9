//! Flow execution engine.
//!
//! Interprets flow graphs (start, process, mcp-tool and finish nodes)
//! against a conversation's `SharedState`. `mcp-tool` nodes bind an MCP
//! server through `flowmcp_mcp::McpService`; process nodes call the chat
//! model port and dispatch the tool calls it requests.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod conversation_cache;
pub mod conversation_service;
pub mod error;
pub mod executor;
pub mod flow_service;
pub mod graph;
pub mod nodes;
pub mod template;

pub use conversation_cache::ConversationCache;
pub use conversation_service::ConversationService;
pub use error::FlowError;
pub use executor::{FlowExecutor, RunRequest, RunResponse};
pub use flow_service::FlowService;
pub use graph::CompiledFlow;
pub use nodes::{APPROVAL_REQUIRED_ACTION, NodeLifecycle, RunContext};
pub use template::{DEFAULT_PROMPT_TEMPLATE, PromptRenderer, RunVariables};

#[cfg(test)]
use tokio_test as _;
