//! MCP connection supervisor.
//!
//! Keeps one connection per configured MCP server, speaks JSON-RPC 2.0 to it
//! over a child process's stdio or a WebSocket, and exposes the registry API
//! (`McpService`) used by the flow engine and the CLI.
//!
//! # Layers
//!
//! - [`transport`] - byte pipes: `StdioTransport`, `WebSocketTransport`
//! - [`client`] - request/response correlation over one transport
//! - [`connection`] - per-server state machine, attempts, stderr, tool cache
//! - [`coordinator`] - tool calls with timeouts and cancellation tokens
//! - [`service`] - the registry: config CRUD, lifecycle, tool operations
//! - [`events`] - broadcast bus implementing `AppEventEmitter`

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod client;
pub mod connection;
pub mod coordinator;
pub mod events;
pub mod protocol;
pub mod service;
pub mod tool_cache;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::McpClient;
pub use connection::ServerConnection;
pub use coordinator::{ToolCoordinator, new_call_token};
pub use events::{EventBus, ServerEvents};
pub use service::{CallOptions, McpService, ServerDiagnostics, ServerInfo, ServerTools};
pub use transport::{DefaultConnector, StderrLog, Transport, TransportConnector, TransportError};

#[cfg(test)]
use tokio_test as _;
