//! Conversation command handler.

use anyhow::{Result, anyhow};
use flowmcp_core::SharedState;

use crate::bootstrap::CliContext;
use crate::conversation_commands::ConversationCommand;
use crate::presentation::{format_local, print_json, print_separator, truncate_string};
use crate::utils::input;

/// Execute a conversation subcommand.
pub async fn execute(ctx: &CliContext, command: ConversationCommand, json: bool) -> Result<()> {
    match command {
        ConversationCommand::List => list(ctx, json).await,
        ConversationCommand::Show { id } => {
            let state = get(ctx, &id).await?;
            if json {
                return print_json(&state);
            }
            print_conversation(&state);
            Ok(())
        }
        ConversationCommand::Remove { id, force } => {
            if !force {
                let confirm = input::prompt_confirmation(&format!("Delete conversation '{id}'?"))?;
                if !confirm {
                    println!("Remove operation cancelled.");
                    return Ok(());
                }
            }
            ctx.conversations().delete(&id).await?;
            println!("✓ Conversation '{id}' deleted.");
            Ok(())
        }
    }
}

async fn get(ctx: &CliContext, id: &str) -> Result<SharedState> {
    ctx.conversations()
        .get(id)
        .await?
        .ok_or_else(|| anyhow!("Conversation not found: {id}"))
}

async fn list(ctx: &CliContext, json: bool) -> Result<()> {
    let conversations = ctx.conversations().list().await?;
    if json {
        return print_json(&conversations);
    }

    if conversations.is_empty() {
        println!("No conversations stored.");
        return Ok(());
    }

    println!(
        "{:<38} {:<28} {:<16} {:<10} Updated",
        "ID", "Title", "Flow", "Status"
    );
    print_separator(110);
    for state in conversations {
        println!(
            "{:<38} {:<28} {:<16} {:<10} {}",
            state.conversation_id,
            truncate_string(&state.title, 27),
            truncate_string(state.flow_id.as_deref().unwrap_or("--"), 15),
            format!("{:?}", state.status).to_lowercase(),
            format_local(state.updated_at)
        );
    }
    Ok(())
}

fn print_conversation(state: &SharedState) {
    println!("{} ({})", state.title, state.conversation_id);
    if let Some(flow) = &state.flow_id {
        println!("flow: {flow}");
    }
    if let Some(context) = &state.mcp_context {
        let tools: Vec<&str> = context.available_tools.iter().map(|t| t.name.as_str()).collect();
        println!("server: {} [{}]", context.server_name, tools.join(", "));
    }
    println!();

    for message in &state.messages {
        println!("[{:?}] {}", message.role, message.content);
        for call in &message.tool_calls {
            println!("    -> {} {}", call.name, call.arguments);
        }
    }

    if !state.node_execution_tracker.is_empty() {
        println!();
        println!("trace:");
        for entry in &state.node_execution_tracker {
            println!(
                "  {} {:<10} {:<20} -> {}",
                format_local(entry.timestamp),
                entry.node_type.as_str(),
                truncate_string(&entry.node_name, 19),
                entry.action
            );
        }
    }
}
