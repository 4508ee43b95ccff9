//! Flow command handler.

use anyhow::{Context, Result};
use flowmcp_flow::{RunRequest, RunResponse};

use crate::bootstrap::CliContext;
use crate::flow_commands::{FlowCommand, RunFlowArgs};
use crate::presentation::{print_json, print_separator, truncate_string};
use crate::utils::input;

/// Execute a flow subcommand.
pub async fn execute(ctx: &CliContext, command: FlowCommand, json: bool) -> Result<()> {
    match command {
        FlowCommand::List => list(ctx, json).await,
        FlowCommand::Show { id } => print_json(&ctx.flows().get(&id).await?),
        FlowCommand::Import { file } => {
            let contents = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let flow = ctx.flows().import_json(&contents).await?;
            println!(
                "✓ Flow '{}' imported ({} nodes, {} edges).",
                flow.id,
                flow.nodes.len(),
                flow.edges.len()
            );
            Ok(())
        }
        FlowCommand::Remove { id, force } => remove(ctx, &id, force).await,
        FlowCommand::Run(args) => run(ctx, args, json).await,
    }
}

async fn list(ctx: &CliContext, json: bool) -> Result<()> {
    let flows = ctx.flows().list().await?;
    if json {
        return print_json(&flows);
    }

    if flows.is_empty() {
        println!("No flows stored.");
        println!("Use 'flowmcp flow import <file.json>' to add one.");
        return Ok(());
    }

    println!("{:<24} {:<30} {:>5} {:>5}", "ID", "Name", "Nodes", "Edges");
    print_separator(68);
    for flow in flows {
        println!(
            "{:<24} {:<30} {:>5} {:>5}",
            truncate_string(&flow.id, 23),
            truncate_string(&flow.name, 29),
            flow.nodes.len(),
            flow.edges.len()
        );
    }
    Ok(())
}

async fn remove(ctx: &CliContext, id: &str, force: bool) -> Result<()> {
    let flow = ctx.flows().get(id).await?;

    if !force {
        let confirm =
            input::prompt_confirmation(&format!("Remove flow '{}' ({})?", flow.id, flow.name))?;
        if !confirm {
            println!("Remove operation cancelled.");
            return Ok(());
        }
    }

    ctx.flows().delete(id).await?;
    println!("✓ Flow '{id}' removed.");
    Ok(())
}

/// Build the executor request from `flow run` arguments.
pub fn request_from_args(args: RunFlowArgs) -> RunRequest {
    let mut request = RunRequest::new(args.flow_id, args.input.join(" "))
        .approve_all_tools(args.approve_all);
    if let Some(id) = args.conversation_id {
        request = request.in_conversation(id);
    }
    for (key, value) in args.vars {
        request = request.with_variable(key, value);
    }
    request
}

async fn run(ctx: &CliContext, args: RunFlowArgs, json: bool) -> Result<()> {
    let show_trace = args.trace;
    let response = ctx.executor().run(request_from_args(args)).await?;
    if json {
        return print_json(&response);
    }
    print_run(&response, show_trace);
    Ok(())
}

fn print_run(response: &RunResponse, show_trace: bool) {
    if let Some(reply) = &response.reply {
        println!("{reply}");
    }

    if show_trace {
        println!();
        for entry in &response.trace {
            println!(
                "  {:<10} {:<20} -> {}",
                entry.node_type.as_str(),
                truncate_string(&entry.node_name, 19),
                entry.action
            );
        }
    }

    eprintln!(
        "conversation {} · {} step(s) · {:?}",
        response.conversation_id, response.steps, response.status
    );
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flowmcp_core::{ConversationStatus, MessageRole};

    use super::*;
    use crate::bootstrap::test_support::TestCli;

    const CALC_FLOW: &str = r#"{
        "id": "calc-flow",
        "name": "Calculator",
        "nodes": [
            { "id": "start", "type": "start", "properties": {} },
            { "id": "tools", "type": "mcp-tool", "properties": { "mcpServer": "calc", "enabledTools": ["add"] } },
            { "id": "answer", "type": "process", "properties": {} }
        ],
        "edges": [
            { "source": "start", "target": "tools" },
            { "source": "tools", "target": "answer" }
        ]
    }"#;

    fn run_args(input: &str) -> RunFlowArgs {
        RunFlowArgs {
            flow_id: "calc-flow".to_string(),
            conversation_id: Some("conv-1".to_string()),
            vars: vec![("lang".to_string(), "en".to_string())],
            approve_all: false,
            trace: false,
            input: input.split(' ').map(str::to_string).collect(),
        }
    }

    #[test]
    fn test_request_from_args() {
        let request = request_from_args(run_args("add 2 and 3"));
        assert_eq!(request.user_input, "add 2 and 3");
        assert_eq!(request.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(request.variables.get("lang").map(String::as_str), Some("en"));
        assert!(!request.approve_all_tools);
    }

    #[tokio::test]
    async fn test_import_then_run() {
        let cli = TestCli::new().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CALC_FLOW.as_bytes()).unwrap();

        execute(
            &cli.ctx,
            FlowCommand::Import {
                file: file.path().to_path_buf(),
            },
            false,
        )
        .await
        .unwrap();

        execute(
            &cli.ctx,
            FlowCommand::Run(run_args(r#"/call tool:calc:add {"a":2,"b":3}"#)),
            false,
        )
        .await
        .unwrap();

        let state = cli.ctx.conversations().get("conv-1").await.unwrap().unwrap();
        assert_eq!(state.status, ConversationStatus::Completed);
        assert!(state.messages.iter().any(|m| m.role == MessageRole::Tool));
    }

    #[tokio::test]
    async fn test_import_missing_file_fails() {
        let cli = TestCli::new().await;
        let command = FlowCommand::Import {
            file: "/nonexistent/flow.json".into(),
        };
        assert!(execute(&cli.ctx, command, false).await.is_err());
    }
}
