//! Main CLI parser and top-level argument handling.
//!
//! This module defines the root CLI structure with global options.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for the MCP supervisor and flow engine.
///
/// This is the top-level parser that handles global options and dispatches
/// to subcommands.
#[derive(Parser)]
#[command(name = "flowmcp")]
#[command(about = "Supervise MCP servers and run conversation flows against them")]
#[command(version)]
pub struct Cli {
    /// Override the data directory for this invocation
    #[arg(long = "data-dir", global = true, env = "FLOWMCP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Commands;
    use crate::flow_commands::FlowCommand;
    use crate::server_commands::ServerCommand;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from(["flowmcp", "--json", "--data-dir", "/tmp/flowmcp", "paths"]);
        assert!(cli.json);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/flowmcp")));
        assert!(matches!(cli.command, Some(Commands::Paths)));
    }

    #[test]
    fn test_server_add_collects_args_and_env() {
        let cli = Cli::parse_from([
            "flowmcp", "server", "add", "calc", "--command", "node", "--arg", "calc.js", "--arg",
            "--port=1", "--env", "API_KEY=secret", "--auto-approve", "add",
        ]);
        let Some(Commands::Server {
            command: ServerCommand::Add(args),
        }) = cli.command
        else {
            panic!("expected server add");
        };
        assert_eq!(args.name, "calc");
        assert_eq!(args.command.as_deref(), Some("node"));
        assert_eq!(args.args, ["calc.js", "--port=1"]);
        assert_eq!(args.env, [("API_KEY".to_string(), "secret".to_string())]);
        assert_eq!(args.auto_approve, ["add"]);
    }

    #[test]
    fn test_server_add_requires_one_transport() {
        assert!(Cli::try_parse_from(["flowmcp", "server", "add", "calc"]).is_err());
        assert!(
            Cli::try_parse_from([
                "flowmcp", "server", "add", "calc", "--command", "node", "--url", "ws://x"
            ])
            .is_err()
        );
    }

    #[test]
    fn test_flow_run_joins_input() {
        let cli = Cli::parse_from([
            "flowmcp", "flow", "run", "calc-flow", "--var", "lang=en", "add", "2", "and", "3",
        ]);
        let Some(Commands::Flow {
            command: FlowCommand::Run(args),
        }) = cli.command
        else {
            panic!("expected flow run");
        };
        assert_eq!(args.flow_id, "calc-flow");
        assert_eq!(args.input.join(" "), "add 2 and 3");
        assert_eq!(args.vars, [("lang".to_string(), "en".to_string())]);
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }
}
