//! Connection status display.

use chrono::{DateTime, Local, Utc};
use flowmcp_core::{ConnectionState, ConnectionStatus};

/// Render a timestamp in the local timezone.
pub fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Short label with a marker for the status column.
pub const fn status_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Connected => "● connected",
        ConnectionStatus::Connecting => "◌ connecting",
        ConnectionStatus::Initialization => "◌ initializing",
        ConnectionStatus::Disconnected => "○ disconnected",
        ConnectionStatus::Error => "✗ error",
    }
}

/// Print one server's state with its last error and stderr tail.
pub fn print_state(name: &str, state: &ConnectionState) {
    println!("{name}: {}", status_label(state.status));
    if let Some(at) = state.last_connected_at {
        println!("  last connected: {}", format_local(at));
    }
    if let Some(error) = &state.error {
        println!("  error: {error}");
    }
    if !state.stderr_output.is_empty() {
        println!("  stderr (last {} lines):", state.stderr_output.len());
        for line in &state.stderr_output {
            println!("    {line}");
        }
    }
}
