//! MCP server subcommands.

use clap::{Args, Subcommand};

use crate::parser::parse_key_val;

/// MCP server commands.
#[derive(Subcommand)]
pub enum ServerCommand {
    /// List configured servers with their connection status
    List,
    /// Add a server configuration (does not connect)
    Add(AddServerArgs),
    /// Remove a server configuration, disconnecting it first
    Remove {
        name: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Enable a server and connect it
    Enable { name: String },
    /// Disable a server and disconnect it
    Disable { name: String },
    /// Reconnect a server with its current configuration
    Restart { name: String },
    /// Show connection status of one server, or of all of them
    Status {
        name: Option<String>,
        /// Connect enabled servers before reporting
        #[arg(long)]
        connect: bool,
    },
    /// List the tools a server exposes
    Tools {
        name: String,
        /// Drop the cached tool list first
        #[arg(long)]
        refresh: bool,
    },
    /// Call a tool on a server
    Call {
        server: String,
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        /// Timeout in milliseconds
        #[arg(long = "timeout-ms")]
        timeout_ms: Option<u64>,
    },
    /// Cancel a call by token, or reconnect the server when no token is given
    Cancel {
        server: String,
        #[arg(long)]
        token: Option<String>,
        #[arg(long, default_value = "Cancelled by user")]
        reason: String,
    },
    /// Show recent connection attempts and captured stderr
    Diagnostics { name: String },
    /// Connect a stored configuration in isolation and list its tools
    Test { name: String },
}

/// Arguments for `server add`.
#[derive(Args)]
pub struct AddServerArgs {
    /// Unique server name
    pub name: String,

    /// Executable to spawn (stdio transport)
    #[arg(long, conflicts_with = "url", required_unless_present = "url")]
    pub command: Option<String>,

    /// Argument passed to the executable; repeat for several
    #[arg(long = "arg", allow_hyphen_values = true, requires = "command")]
    pub args: Vec<String>,

    /// Absolute working directory for the child process
    #[arg(long = "root-path", requires = "command")]
    pub root_path: Option<String>,

    /// WebSocket URL (ws:// or wss://)
    #[arg(long)]
    pub url: Option<String>,

    /// Environment variable for the server; repeat for several
    #[arg(long = "env", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Tool that may run without approval; repeat for several
    #[arg(long = "auto-approve")]
    pub auto_approve: Vec<String>,

    /// Store the server disabled
    #[arg(long)]
    pub disabled: bool,
}
