//! Paths command handler.
//!
//! Displays the resolved data layout and effective settings for
//! diagnostics and debugging.

use anyhow::Result;
use serde_json::json;

use crate::bootstrap::CliContext;
use crate::presentation::print_json;

/// Execute the paths command.
///
/// Prints every resolved path and effective setting in `key = value` format.
pub fn execute(ctx: &CliContext, json: bool) -> Result<()> {
    let paths = &ctx.paths;
    let settings = &ctx.settings;
    let tool_timeout = settings
        .effective_tool_timeout()
        .map_or_else(|| "none".to_string(), |t| format!("{}s", t.as_secs()));

    if json {
        return print_json(&json!({
            "dataDir": paths.root,
            "mcpServers": paths.mcp_servers,
            "conversations": paths.conversations,
            "flows": paths.flows,
            "settings": settings,
        }));
    }

    println!("data_dir = {}", paths.root.display());
    println!("mcp_servers = {}", paths.mcp_servers.display());
    println!("conversations = {}", paths.conversations.display());
    println!("flows = {}", paths.flows.display());
    println!(
        "tool_cache_ttl = {}s",
        settings.effective_tool_cache_ttl().as_secs()
    );
    println!(
        "connect_timeout = {}s",
        settings.effective_connect_timeout().as_secs()
    );
    println!("tool_timeout = {tool_timeout}");
    println!("stderr_tail_lines = {}", settings.effective_stderr_tail_lines());
    println!("max_tool_rounds = {}", settings.effective_max_tool_rounds());
    println!("max_flow_steps = {}", settings.effective_max_flow_steps());
    Ok(())
}
