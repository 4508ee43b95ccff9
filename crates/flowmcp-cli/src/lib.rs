//! Command-line adapter for flowmcp.
//!
//! `flowmcp server ...` manages MCP server configurations and connections,
//! `flowmcp flow ...` stores and runs flows, `flowmcp conversation ...`
//! inspects the conversations those runs produce. `bootstrap` is the
//! composition root; handlers only talk to the composed services.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tokio_test as _;

// Used by the binary only
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod conversation_commands;
pub mod error;
pub mod flow_commands;
pub mod handlers;
pub mod parser;
pub mod presentation;
pub mod server_commands;
pub mod utils;

// Re-export primary types for convenient access
pub use bootstrap::{CliConfig, CliContext, bootstrap};
pub use commands::Commands;
pub use conversation_commands::ConversationCommand;
pub use error::CliError;
pub use flow_commands::{FlowCommand, RunFlowArgs};
pub use parser::Cli;
pub use server_commands::{AddServerArgs, ServerCommand};
