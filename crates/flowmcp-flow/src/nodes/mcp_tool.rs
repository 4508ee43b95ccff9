//! MCP tool node: binds a server and exposes (a subset of) its tools.

use std::collections::BTreeMap;

use async_trait::async_trait;
use flowmcp_core::{
    DEFAULT_ACTION, FlowNode, McpContext, McpToolProperties, SharedState, Successors,
    ToolDescriptor, filter_enabled_tools,
};
use tracing::debug;

use super::{NodeLifecycle, RunContext, trace_entry};
use crate::error::FlowError;

pub struct McpToolNode<'a> {
    node: &'a FlowNode,
    props: &'a McpToolProperties,
}

impl<'a> McpToolNode<'a> {
    pub const fn new(node: &'a FlowNode, props: &'a McpToolProperties) -> Self {
        Self { node, props }
    }
}

pub struct ToolBinding {
    server_name: String,
    enabled_tools: Vec<String>,
    env: BTreeMap<String, String>,
}

#[async_trait]
impl NodeLifecycle for McpToolNode<'_> {
    type Prepared = ToolBinding;
    type Output = Vec<ToolDescriptor>;

    async fn prepare(
        &self,
        _state: &SharedState,
        _ctx: &RunContext<'_>,
    ) -> Result<ToolBinding, FlowError> {
        let server_name = self
            .props
            .mcp_server
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                FlowError::configuration(format!(
                    "mcp-tool node '{}' has no MCP server bound",
                    self.node.id
                ))
            })?;

        Ok(ToolBinding {
            server_name: server_name.to_string(),
            enabled_tools: self.props.enabled_tools.clone(),
            env: self.props.env.clone(),
        })
    }

    async fn execute(
        &self,
        binding: &ToolBinding,
        ctx: &RunContext<'_>,
    ) -> Result<Vec<ToolDescriptor>, FlowError> {
        ctx.mcp
            .ensure_connected_with_env(&binding.server_name, &binding.env)
            .await?;
        let listed = ctx.mcp.list_server_tools(&binding.server_name).await?;
        debug!(
            server_name = %binding.server_name,
            tools = listed.tools.len(),
            "Listed tools for mcp-tool node"
        );
        Ok(listed.tools)
    }

    fn finalize(
        &self,
        binding: ToolBinding,
        tools: Vec<ToolDescriptor>,
        state: &mut SharedState,
        _successors: &Successors,
    ) -> String {
        let available_tools =
            filter_enabled_tools(&binding.server_name, &tools, &binding.enabled_tools);
        let names: Vec<String> = available_tools.iter().map(|t| t.name.clone()).collect();

        state.mcp_server = Some(binding.server_name.clone());
        state.mcp_context = Some(McpContext {
            server_name: binding.server_name.clone(),
            available_tools,
            env: binding.env,
        });

        state.record_trace(
            trace_entry(self.node, DEFAULT_ACTION)
                .with_detail("serverName", binding.server_name)
                .with_detail("discoveredTools", tools.len())
                .with_detail("availableTools", names),
        );
        DEFAULT_ACTION.to_string()
    }
}

#[cfg(test)]
mod tests {
    use flowmcp_core::{ConnectionStatus, McpServiceError, NodeKind, ServerConfigPatch};

    use super::*;
    use crate::nodes::run_node;
    use crate::nodes::test_support::Fixture;

    async fn run(fx: &Fixture, props: McpToolProperties) -> Result<(String, SharedState), FlowError> {
        let flow_node = FlowNode::new("tools", NodeKind::McpTool(props.clone()));
        let mut state = SharedState::new("c1", "Test");
        let action = run_node(
            &McpToolNode::new(&flow_node, &props),
            &mut state,
            &fx.ctx(),
            &Successors::new(),
        )
        .await?;
        Ok((action, state))
    }

    #[tokio::test]
    async fn test_allow_list_limits_context_tools() {
        let fx = Fixture::new().await;
        let (action, state) = run(
            &fx,
            McpToolProperties::bound_to("calc").with_enabled_tools(["add"]),
        )
        .await
        .unwrap();

        assert_eq!(action, DEFAULT_ACTION);
        assert_eq!(state.mcp_server.as_deref(), Some("calc"));
        let context = state.mcp_context.unwrap();
        assert_eq!(context.available_tools.len(), 1);
        assert_eq!(context.available_tools[0].name, "tool:calc:add");

        let trace = &state.node_execution_tracker[0];
        assert_eq!(trace.details["serverName"], "calc");
        assert_eq!(trace.details["discoveredTools"], 3);
    }

    #[tokio::test]
    async fn test_empty_allow_list_exposes_all_tools() {
        let fx = Fixture::new().await;
        let (_, state) = run(&fx, McpToolProperties::bound_to("calc")).await.unwrap();
        assert_eq!(state.mcp_context.unwrap().available_tools.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_binding_fails_before_connecting() {
        let fx = Fixture::new().await;
        let err = run(&fx, McpToolProperties::default()).await.unwrap_err();
        assert!(matches!(err, FlowError::Configuration(msg) if msg.contains("tools")));
        assert_eq!(fx.connector.open_count("calc"), 0);
    }

    #[tokio::test]
    async fn test_env_overrides_reach_the_spawned_server() {
        let fx = Fixture::new().await;
        let mut props = McpToolProperties::bound_to("calc");
        props.env.insert("API_KEY".to_string(), "secret".to_string());

        let (_, state) = run(&fx, props).await.unwrap();
        assert_eq!(state.mcp_context.unwrap().env["API_KEY"], "secret");

        let opened = fx.connector.opened_configs("calc");
        assert_eq!(opened[0].env.get("API_KEY").map(String::as_str), Some("secret"));
        assert_eq!(
            fx.mcp.get_server_status("calc").await.status,
            ConnectionStatus::Connected
        );
    }

    #[tokio::test]
    async fn test_disabled_server_is_an_mcp_error() {
        let fx = Fixture::new().await;
        fx.mcp
            .update_config("calc", &ServerConfigPatch::disabled(true))
            .await
            .unwrap();
        let err = run(&fx, McpToolProperties::bound_to("calc")).await.unwrap_err();
        assert!(matches!(err, FlowError::Mcp(McpServiceError::Disabled(_))));
    }
}
