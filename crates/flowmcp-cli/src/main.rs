//! CLI entry point - the composition root.
//!
//! Command dispatch routes to handlers, which use `CliContext` for all
//! dependency access.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use flowmcp_cli::{Cli, CliConfig, CliError, Commands, bootstrap, handlers};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = CliConfig::with_defaults()?.with_data_dir(cli.data_dir);
    let ctx = bootstrap(config).await?;

    let result = match command {
        Commands::Server { command } => handlers::server::execute(&ctx, command, cli.json).await,
        Commands::Flow { command } => handlers::flow::execute(&ctx, command, cli.json).await,
        Commands::Conversation { command } => {
            handlers::conversation::execute(&ctx, command, cli.json).await
        }
        Commands::Paths => handlers::paths::execute(&ctx, cli.json),
    };

    ctx.shutdown().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables before settings and the log filter read them
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = CliError::exit_code_for(&e);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
