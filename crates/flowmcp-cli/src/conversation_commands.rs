//! Conversation subcommands.

use clap::Subcommand;

/// Conversation commands.
#[derive(Subcommand)]
pub enum ConversationCommand {
    /// List stored conversations, most recent first
    List,
    /// Print a conversation's messages and node trace
    Show { id: String },
    /// Delete a conversation
    Remove {
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}
