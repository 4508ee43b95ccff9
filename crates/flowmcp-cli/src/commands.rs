//! Main commands enum and primary subcommands.
//!
//! This module defines the available commands for the CLI tool.

use clap::Subcommand;

use crate::conversation_commands::ConversationCommand;
use crate::flow_commands::FlowCommand;
use crate::server_commands::ServerCommand;

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Manage MCP server configurations and connections
    Server {
        #[command(subcommand)]
        command: ServerCommand,
    },

    /// Manage and run flows
    Flow {
        #[command(subcommand)]
        command: FlowCommand,
    },

    /// Inspect stored conversations
    Conversation {
        #[command(subcommand)]
        command: ConversationCommand,
    },

    /// Show resolved data paths and effective settings
    Paths,
}
