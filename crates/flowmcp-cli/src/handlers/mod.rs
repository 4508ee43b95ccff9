//! Command handlers that delegate to the composed services.
//!
//! Handlers follow the canonical pattern:
//! - Signature: `pub async fn execute(ctx: &CliContext, ...) -> Result<()>`
//! - Thin wrappers that:
//!   1. Parse/validate CLI-specific input
//!   2. Call `McpService`, `FlowService`, `ConversationService` or `FlowExecutor`
//!   3. Format output for the terminal (or JSON with `--json`)
//!
//! Handlers should NOT:
//! - Access repositories directly
//! - Contain business logic

pub mod conversation;
pub mod flow;
pub mod paths;
pub mod server;
