//! Server command handler.
//!
//! Wraps the MCP registry: configuration CRUD, connection lifecycle,
//! tool listing and invocation.

use std::time::Duration;

use anyhow::{Context, Result};
use flowmcp_core::{ServerConfig, ServerConfigPatch, TransportConfig};
use flowmcp_mcp::CallOptions;
use serde_json::Value;

use crate::bootstrap::CliContext;
use crate::presentation::{
    format_local, print_json, print_separator, print_state, status_label, truncate_string,
};
use crate::server_commands::{AddServerArgs, ServerCommand};
use crate::utils::input;

/// Execute a server subcommand.
pub async fn execute(ctx: &CliContext, command: ServerCommand, json: bool) -> Result<()> {
    match command {
        ServerCommand::List => list(ctx, json).await,
        ServerCommand::Add(args) => add(ctx, args).await,
        ServerCommand::Remove { name, force } => remove(ctx, &name, force).await,
        ServerCommand::Enable { name } => set_disabled(ctx, &name, false).await,
        ServerCommand::Disable { name } => set_disabled(ctx, &name, true).await,
        ServerCommand::Restart { name } => {
            ctx.mcp().restart(&name).await?;
            println!("✓ Server '{name}' restarted.");
            Ok(())
        }
        ServerCommand::Status { name, connect } => status(ctx, name.as_deref(), connect, json).await,
        ServerCommand::Tools { name, refresh } => tools(ctx, &name, refresh, json).await,
        ServerCommand::Call {
            server,
            tool,
            args,
            timeout_ms,
        } => call(ctx, &server, &tool, &args, timeout_ms).await,
        ServerCommand::Cancel {
            server,
            token,
            reason,
        } => {
            ctx.mcp()
                .cancel_tool_call(&server, token.as_deref(), &reason)
                .await?;
            match token {
                Some(token) => println!("✓ Cancellation sent for call {token} on '{server}'."),
                None => println!("✓ Server '{server}' reconnected; in-flight calls cancelled."),
            }
            Ok(())
        }
        ServerCommand::Diagnostics { name } => diagnostics(ctx, &name, json).await,
        ServerCommand::Test { name } => test(ctx, &name, json).await,
    }
}

/// Build a configuration from `server add` arguments.
pub fn config_from_args(args: AddServerArgs) -> ServerConfig {
    let mut config = match args.command {
        Some(command) => ServerConfig::stdio(args.name, command, args.args),
        None => ServerConfig::websocket(args.name, args.url.unwrap_or_default()),
    };
    if let TransportConfig::Stdio { root_path, .. } = &mut config.transport {
        *root_path = args.root_path;
    }
    config.env.extend(args.env);
    config.auto_approve.extend(args.auto_approve);
    config.disabled = args.disabled;
    config
}

async fn list(ctx: &CliContext, json: bool) -> Result<()> {
    let servers = ctx.mcp().list_servers_with_status().await?;
    if json {
        return print_json(&servers);
    }

    if servers.is_empty() {
        println!("No MCP servers configured.");
        println!("Use 'flowmcp server add <name> --command <cmd>' to add one.");
        return Ok(());
    }

    println!("{:<20} {:<10} {:<9} {:<16} Target", "Name", "Transport", "Enabled", "Status");
    print_separator(90);
    for info in servers {
        let target = match &info.config.transport {
            TransportConfig::Stdio { command, args, .. } => {
                std::iter::once(command.as_str())
                    .chain(args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
            }
            TransportConfig::Websocket { url } => url.clone(),
        };
        println!(
            "{:<20} {:<10} {:<9} {:<16} {}",
            truncate_string(&info.config.name, 19),
            info.config.transport_kind().as_str(),
            if info.config.disabled { "no" } else { "yes" },
            status_label(info.state.status),
            truncate_string(&target, 40)
        );
    }
    Ok(())
}

async fn add(ctx: &CliContext, args: AddServerArgs) -> Result<()> {
    let config = config_from_args(args);
    let name = config.name.clone();
    ctx.mcp().add_config(config).await?;
    println!("✓ Server '{name}' added.");
    Ok(())
}

async fn remove(ctx: &CliContext, name: &str, force: bool) -> Result<()> {
    ctx.mcp().get_config(name).await?;

    if !force {
        let confirm = input::prompt_confirmation(&format!("Remove MCP server '{name}'?"))?;
        if !confirm {
            println!("Remove operation cancelled.");
            return Ok(());
        }
    }

    ctx.mcp().delete_config(name).await?;
    println!("✓ Server '{name}' removed.");
    Ok(())
}

async fn set_disabled(ctx: &CliContext, name: &str, disabled: bool) -> Result<()> {
    ctx.mcp()
        .update_config(name, &ServerConfigPatch::disabled(disabled))
        .await?;

    if disabled {
        println!("✓ Server '{name}' disabled.");
        return Ok(());
    }

    let state = ctx.mcp().get_server_status(name).await;
    println!("✓ Server '{name}' enabled.");
    print_state(name, &state);
    Ok(())
}

async fn status(ctx: &CliContext, name: Option<&str>, connect: bool, json: bool) -> Result<()> {
    let names: Vec<String> = match name {
        Some(name) => {
            ctx.mcp().get_config(name).await?;
            if connect {
                // Failures land in the connection state printed below.
                let _ = ctx.mcp().connect(name).await;
            }
            vec![name.to_string()]
        }
        None => {
            if connect {
                ctx.mcp().start_enabled_servers().await?;
            }
            ctx.mcp()
                .load_configs()
                .await?
                .into_iter()
                .map(|c| c.name)
                .collect()
        }
    };

    let mut states = Vec::with_capacity(names.len());
    for name in names {
        let state = ctx.mcp().get_server_status(&name).await;
        states.push((name, state));
    }

    if json {
        let map: serde_json::Map<String, Value> = states
            .into_iter()
            .map(|(name, state)| Ok((name, serde_json::to_value(state)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        return print_json(&map);
    }
    for (name, state) in &states {
        print_state(name, state);
    }
    Ok(())
}

async fn tools(ctx: &CliContext, name: &str, refresh: bool, json: bool) -> Result<()> {
    if refresh {
        ctx.mcp().clear_tool_cache(name).await;
    }
    let listing = ctx.mcp().list_server_tools(name).await?;
    if json {
        return print_json(&listing);
    }

    if listing.tools.is_empty() {
        println!(
            "No tools available from '{name}' ({}).",
            status_label(listing.status)
        );
        return Ok(());
    }

    println!("{} tool(s) from '{name}':\n", listing.tools.len());
    for tool in &listing.tools {
        match &tool.description {
            Some(description) => println!("  {:<24} {}", tool.name, truncate_string(description, 60)),
            None => println!("  {}", tool.name),
        }
    }
    Ok(())
}

async fn call(
    ctx: &CliContext,
    server: &str,
    tool: &str,
    args: &str,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let arguments: Value =
        serde_json::from_str(args).context("Tool arguments must be a JSON object")?;
    let mut options = CallOptions::default();
    if let Some(ms) = timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }

    let result = ctx.mcp().call_tool(server, tool, arguments, options).await?;
    print_json(&result)
}

async fn diagnostics(ctx: &CliContext, name: &str, json: bool) -> Result<()> {
    let diagnostics = ctx.mcp().server_diagnostics(name).await?;
    if json {
        return print_json(&diagnostics);
    }

    print_state(name, &diagnostics.state);
    if diagnostics.attempts.is_empty() {
        println!("  no connection attempts this session");
    } else {
        println!("  attempts:");
        for attempt in &diagnostics.attempts {
            println!(
                "    {} {:?} {}",
                format_local(attempt.timestamp),
                attempt.status,
                attempt.error.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

async fn test(ctx: &CliContext, name: &str, json: bool) -> Result<()> {
    let config = ctx.mcp().get_config(name).await?;
    let tools = ctx.mcp().test_connection(&config).await?;
    if json {
        return print_json(&tools);
    }
    println!("✓ '{name}' answered the handshake with {} tool(s).", tools.len());
    for tool in tools {
        println!("  {}", tool.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use flowmcp_core::{ConnectionStatus, TransportKind};

    use super::*;
    use crate::bootstrap::test_support::TestCli;

    fn add_args(name: &str) -> AddServerArgs {
        AddServerArgs {
            name: name.to_string(),
            command: Some("node".to_string()),
            args: vec!["server.js".to_string()],
            root_path: None,
            url: None,
            env: vec![("TOKEN".to_string(), "t".to_string())],
            auto_approve: vec!["add".to_string()],
            disabled: true,
        }
    }

    #[test]
    fn test_config_from_args() {
        let config = config_from_args(add_args("files"));
        assert_eq!(config.transport_kind(), TransportKind::Stdio);
        assert!(config.disabled);
        assert_eq!(config.env.get("TOKEN").map(String::as_str), Some("t"));
        assert!(config.auto_approve.contains("add"));

        let ws = config_from_args(AddServerArgs {
            command: None,
            args: Vec::new(),
            url: Some("ws://localhost:9000".to_string()),
            ..add_args("remote")
        });
        assert_eq!(ws.transport_kind(), TransportKind::Websocket);
    }

    #[tokio::test]
    async fn test_enable_disable_round_trip() {
        let cli = TestCli::new().await;

        execute(&cli.ctx, ServerCommand::Disable { name: "calc".into() }, false)
            .await
            .unwrap();
        assert!(cli.ctx.mcp().get_config("calc").await.unwrap().disabled);

        execute(&cli.ctx, ServerCommand::Enable { name: "calc".into() }, false)
            .await
            .unwrap();
        let state = cli.ctx.mcp().get_server_status("calc").await;
        assert_eq!(state.status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_call_rejects_non_json_args() {
        let cli = TestCli::new().await;
        let command = ServerCommand::Call {
            server: "calc".into(),
            tool: "add".into(),
            args: "a=1".into(),
            timeout_ms: None,
        };
        assert!(execute(&cli.ctx, command, false).await.is_err());
    }

    #[tokio::test]
    async fn test_forced_remove_deletes_config() {
        let cli = TestCli::new().await;
        execute(
            &cli.ctx,
            ServerCommand::Remove {
                name: "calc".into(),
                force: true,
            },
            false,
        )
        .await
        .unwrap();
        assert!(cli.ctx.mcp().load_configs().await.unwrap().is_empty());
    }
}
