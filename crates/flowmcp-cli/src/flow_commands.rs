//! Flow subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::parser::parse_key_val;

/// Flow commands.
#[derive(Subcommand)]
pub enum FlowCommand {
    /// List stored flows
    List,
    /// Print a flow definition as JSON
    Show { id: String },
    /// Validate and store a flow definition from a JSON file
    Import { file: PathBuf },
    /// Delete a flow definition
    Remove {
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Run a flow for one user message
    Run(RunFlowArgs),
}

/// Arguments for `flow run`.
#[derive(Args)]
pub struct RunFlowArgs {
    pub flow_id: String,

    /// Resume an existing conversation
    #[arg(long = "conversation")]
    pub conversation_id: Option<String>,

    /// Template variable; repeat for several
    #[arg(long = "var", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,

    /// Run every visible tool without asking
    #[arg(long = "approve-all")]
    pub approve_all: bool,

    /// Print the node trace after the reply
    #[arg(long)]
    pub trace: bool,

    /// User message
    #[arg(trailing_var_arg = true)]
    pub input: Vec<String>,
}
