//! Node lifecycles.
//!
//! Every node kind runs the same three phases:
//!
//! 1. `prepare` reads the shared state and the node's properties
//! 2. `execute` does the node's work (model turn, MCP round trip) without
//!    touching the shared state
//! 3. `finalize` writes results into the shared state, appends one trace
//!    entry and returns the action label that selects the next edge
//!
//! The executor dispatches on `NodeKind`, so each node type only carries the
//! properties relevant to it.

mod finish;
mod mcp_tool;
mod process;
mod start;

use async_trait::async_trait;
use flowmcp_core::{
    ChatModelPort, FlowNode, NodeKind, Settings, SharedState, Successors, TraceEntry,
};
use flowmcp_mcp::McpService;

pub use finish::FinishNode;
pub use mcp_tool::McpToolNode;
pub use process::{APPROVAL_REQUIRED_ACTION, ProcessNode};
pub use start::StartNode;

use crate::error::FlowError;
use crate::template::{PromptRenderer, RunVariables};

/// Collaborators and per-run options available to every phase.
pub struct RunContext<'a> {
    pub mcp: &'a McpService,
    pub model: &'a dyn ChatModelPort,
    pub renderer: &'a PromptRenderer,
    pub settings: &'a Settings,
    pub vars: &'a RunVariables,
    /// Run model-requested tools without checking `autoApprove`.
    pub approve_all_tools: bool,
}

#[async_trait]
pub trait NodeLifecycle: Send + Sync {
    type Prepared: Send + Sync;
    type Output: Send;

    async fn prepare(
        &self,
        state: &SharedState,
        ctx: &RunContext<'_>,
    ) -> Result<Self::Prepared, FlowError>;

    async fn execute(
        &self,
        prepared: &Self::Prepared,
        ctx: &RunContext<'_>,
    ) -> Result<Self::Output, FlowError>;

    fn finalize(
        &self,
        prepared: Self::Prepared,
        output: Self::Output,
        state: &mut SharedState,
        successors: &Successors,
    ) -> String;
}

/// Run all three phases of `node`. The state is only written by `finalize`.
pub async fn run_node<N: NodeLifecycle>(
    node: &N,
    state: &mut SharedState,
    ctx: &RunContext<'_>,
    successors: &Successors,
) -> Result<String, FlowError> {
    let prepared = node.prepare(state, ctx).await?;
    let output = node.execute(&prepared, ctx).await?;
    Ok(node.finalize(prepared, output, state, successors))
}

/// Dispatch on the node kind and run its lifecycle.
pub async fn execute_node(
    node: &FlowNode,
    state: &mut SharedState,
    ctx: &RunContext<'_>,
    successors: &Successors,
) -> Result<String, FlowError> {
    match &node.kind {
        NodeKind::Start(props) => {
            run_node(&StartNode::new(node, props), state, ctx, successors).await
        }
        NodeKind::Process(props) => {
            run_node(&ProcessNode::new(node, props), state, ctx, successors).await
        }
        NodeKind::McpTool(props) => {
            run_node(&McpToolNode::new(node, props), state, ctx, successors).await
        }
        NodeKind::Finish(props) => {
            run_node(&FinishNode::new(node, props), state, ctx, successors).await
        }
    }
}

fn trace_entry(node: &FlowNode, action: &str) -> TraceEntry {
    TraceEntry::new(node.node_type(), &node.id, node.display_name(), action)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use flowmcp_core::{EchoChatModel, NoopEmitter, ServerConfig, Settings};
    use flowmcp_db::TestStore;
    use flowmcp_mcp::McpService;
    use flowmcp_mcp::testing::FakeConnector;

    use super::RunContext;
    use crate::template::{PromptRenderer, RunVariables};

    /// Registry with a `calc` calculator server on a fake transport.
    pub struct Fixture {
        pub _store: TestStore,
        pub connector: Arc<FakeConnector>,
        pub mcp: McpService,
        pub model: EchoChatModel,
        pub renderer: PromptRenderer,
        pub settings: Settings,
        pub vars: RunVariables,
    }

    impl Fixture {
        pub async fn new() -> Self {
            let store = TestStore::new().unwrap();
            let connector = Arc::new(FakeConnector::new());
            let mcp = McpService::with_connector(
                Arc::clone(&store.repos.server_configs),
                Arc::new(NoopEmitter::new()),
                connector.clone(),
                Settings::with_defaults(),
            );
            mcp.add_config(
                ServerConfig::stdio("calc", "node", vec!["calc.js".to_string()])
                    .with_auto_approve("add"),
            )
            .await
            .unwrap();
            Self {
                _store: store,
                connector,
                mcp,
                model: EchoChatModel::new(),
                renderer: PromptRenderer::new(),
                settings: Settings::with_defaults(),
                vars: RunVariables {
                    user_input: "hello".to_string(),
                    conversation_id: "c1".to_string(),
                    flow_id: "f1".to_string(),
                    title: "Test".to_string(),
                    ..RunVariables::default()
                },
            }
        }

        pub fn ctx(&self) -> RunContext<'_> {
            RunContext {
                mcp: &self.mcp,
                model: &self.model,
                renderer: &self.renderer,
                settings: &self.settings,
                vars: &self.vars,
                approve_all_tools: false,
            }
        }
    }
}
