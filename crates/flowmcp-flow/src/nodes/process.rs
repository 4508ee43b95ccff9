//! Process node: one model turn, with tool calls dispatched to the registry.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use flowmcp_core::{
    ChatCompletionRequest, ChatMessage, DEFAULT_ACTION, FlowNode, McpServiceError,
    NamespacedTool, ProcessProperties, SharedState, Successors, ToolCallRequest,
    parse_namespaced_tool_name,
};
use flowmcp_mcp::CallOptions;
use serde_json::json;
use tracing::{debug, info};

use super::{NodeLifecycle, RunContext, trace_entry};
use crate::error::FlowError;

/// Action returned when the model asked for a tool that needs approval.
pub const APPROVAL_REQUIRED_ACTION: &str = "approval_required";

pub struct ProcessNode<'a> {
    node: &'a FlowNode,
    props: &'a ProcessProperties,
}

impl<'a> ProcessNode<'a> {
    pub const fn new(node: &'a FlowNode, props: &'a ProcessProperties) -> Self {
        Self { node, props }
    }
}

pub struct PreparedTurn {
    request: ChatCompletionRequest,
    /// Visible tools by namespaced name.
    tools: HashMap<String, NamespacedTool>,
    /// Namespaced names that may run without approval.
    approved: HashSet<String>,
}

#[derive(Default)]
pub struct TurnOutput {
    messages: Vec<ChatMessage>,
    rounds: u32,
    tool_calls: usize,
    pending_approval: Vec<String>,
    rounds_exhausted: bool,
}

enum Dispatch {
    Ran(String),
    NeedsApproval,
}

impl ProcessNode<'_> {
    async fn dispatch(
        &self,
        call: &ToolCallRequest,
        prepared: &PreparedTurn,
        ctx: &RunContext<'_>,
    ) -> Dispatch {
        let Some(tool) = prepared.tools.get(&call.name) else {
            let error = match parse_namespaced_tool_name(&call.name) {
                Some((server, tool)) => {
                    format!("Tool '{tool}' on server '{server}' is not available to this node")
                }
                None => format!(
                    "Malformed tool name '{}', expected tool:<server>:<name>",
                    call.name
                ),
            };
            return Dispatch::Ran(json!({ "error": error, "source": "config" }).to_string());
        };
        if !prepared.approved.contains(&call.name) {
            return Dispatch::NeedsApproval;
        }

        let result = ctx
            .mcp
            .call_tool(
                &tool.server_name,
                &tool.original_name,
                call.arguments.clone(),
                CallOptions::default(),
            )
            .await;

        let content = match result {
            Ok(value) => value.to_string(),
            Err(McpServiceError::Tool(e)) => {
                json!({ "error": e.to_string(), "source": e.source_tag() }).to_string()
            }
            Err(e) => json!({ "error": e.to_string(), "source": e.source_tag() }).to_string(),
        };
        Dispatch::Ran(content)
    }
}

#[async_trait]
impl NodeLifecycle for ProcessNode<'_> {
    type Prepared = PreparedTurn;
    type Output = TurnOutput;

    async fn prepare(
        &self,
        state: &SharedState,
        ctx: &RunContext<'_>,
    ) -> Result<PreparedTurn, FlowError> {
        let instruction = self
            .props
            .prompt
            .as_deref()
            .map(|t| ctx.renderer.render(t, ctx.vars))
            .transpose()?;
        let system_prompt = match (state.system_prompt.clone(), instruction) {
            (Some(base), Some(extra)) => Some(format!("{base}\n\n{extra}")),
            (base, extra) => base.or(extra),
        };

        let visible: Vec<NamespacedTool> = state
            .mcp_context
            .as_ref()
            .map(|c| c.available_tools.clone())
            .unwrap_or_default();

        let approved = if ctx.approve_all_tools {
            visible.iter().map(|t| t.name.clone()).collect()
        } else {
            let servers: BTreeSet<&str> =
                visible.iter().map(|t| t.server_name.as_str()).collect();
            let mut approved = HashSet::new();
            for server in servers {
                let config = ctx.mcp.get_config(server).await?;
                approved.extend(
                    visible
                        .iter()
                        .filter(|t| t.server_name == server)
                        .filter(|t| config.auto_approve.contains(&t.original_name))
                        .map(|t| t.name.clone()),
                );
            }
            approved
        };

        Ok(PreparedTurn {
            request: ChatCompletionRequest {
                model: self.props.model.clone(),
                temperature: self.props.temperature,
                system_prompt,
                messages: state.messages.clone(),
                tools: visible.clone(),
            },
            tools: visible.into_iter().map(|t| (t.name.clone(), t)).collect(),
            approved,
        })
    }

    async fn execute(
        &self,
        prepared: &PreparedTurn,
        ctx: &RunContext<'_>,
    ) -> Result<TurnOutput, FlowError> {
        let max_rounds = ctx.settings.effective_max_tool_rounds();
        let mut request = prepared.request.clone();
        let mut output = TurnOutput::default();

        for round in 1..=max_rounds {
            output.rounds = round;
            let completion = ctx.model.complete(request.clone()).await?;
            let calls = completion.tool_calls.clone();

            let reply =
                ChatMessage::assistant(completion.content).with_tool_calls(completion.tool_calls);
            request.messages.push(reply.clone());
            output.messages.push(reply);

            if calls.is_empty() {
                return Ok(output);
            }

            for call in &calls {
                output.tool_calls += 1;
                let message = match self.dispatch(call, prepared, ctx).await {
                    Dispatch::Ran(content) => ChatMessage::tool(&call.id, content),
                    Dispatch::NeedsApproval => {
                        info!(tool = %call.name, node_id = %self.node.id, "Tool call needs approval");
                        output.pending_approval.push(call.name.clone());
                        ChatMessage::tool(
                            &call.id,
                            json!({ "error": format!("Approval required to run '{}'", call.name) })
                                .to_string(),
                        )
                    }
                };
                request.messages.push(message.clone());
                output.messages.push(message);
            }

            if !output.pending_approval.is_empty() {
                return Ok(output);
            }
        }

        debug!(node_id = %self.node.id, max_rounds, "Tool round limit reached");
        output.rounds_exhausted = true;
        Ok(output)
    }

    fn finalize(
        &self,
        _prepared: PreparedTurn,
        output: TurnOutput,
        state: &mut SharedState,
        _successors: &Successors,
    ) -> String {
        for message in output.messages {
            state.push_message(message);
        }

        let action = if output.pending_approval.is_empty() {
            DEFAULT_ACTION
        } else {
            APPROVAL_REQUIRED_ACTION
        };

        let mut entry = trace_entry(self.node, action)
            .with_detail("rounds", output.rounds)
            .with_detail("toolCalls", output.tool_calls);
        if output.rounds_exhausted {
            entry = entry.with_detail("roundsExhausted", true);
        }
        if !output.pending_approval.is_empty() {
            entry = entry.with_detail("pendingApproval", output.pending_approval);
        }
        state.record_trace(entry);
        action.to_string()
    }
}

#[cfg(test)]
mod tests {
    use flowmcp_core::{
        ChatCompletion, ChatModelError, ChatModelPort, McpContext, MessageRole, NodeKind,
        filter_enabled_tools,
    };
    use mockall::mock;

    use super::*;
    use crate::nodes::test_support::Fixture;
    use crate::nodes::{RunContext, run_node};

    mock! {
        pub Model {}

        #[async_trait]
        impl ChatModelPort for Model {
            async fn complete(
                &self,
                request: ChatCompletionRequest,
            ) -> Result<ChatCompletion, ChatModelError>;
        }
    }

    async fn state_with_calc_tools(fx: &Fixture) -> SharedState {
        let tools = fx.mcp.list_server_tools("calc").await.unwrap().tools;
        let mut state = SharedState::new("c1", "Test");
        state.system_prompt = Some("Be brief.".to_string());
        state.push_message(ChatMessage::user("add please"));
        state.mcp_context = Some(McpContext {
            server_name: "calc".to_string(),
            available_tools: filter_enabled_tools("calc", &tools, &[]),
            env: Default::default(),
        });
        state
    }

    fn call(name: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: "call-1".to_string(),
            name: name.to_string(),
            arguments: json!({"a": 2, "b": 3}),
        }
    }

    async fn run(
        model: &MockModel,
        fx: &Fixture,
        state: &mut SharedState,
        approve_all_tools: bool,
        props: ProcessProperties,
    ) -> String {
        let node = FlowNode::new("chat", NodeKind::Process(props.clone()));
        let ctx = RunContext {
            model,
            approve_all_tools,
            ..fx.ctx()
        };
        run_node(&ProcessNode::new(&node, &props), state, &ctx, &Successors::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_auto_approved_tool_runs_and_result_is_fed_back() {
        let fx = Fixture::new().await;
        let mut state = state_with_calc_tools(&fx).await;

        let mut model = MockModel::new();
        let mut seq = mockall::Sequence::new();
        model
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| {
                req.tools.len() == 3 && req.system_prompt.as_deref() == Some("Be brief.\n\nUse tools.")
            })
            .returning(|_| Ok(ChatCompletion::default().with_tool_call(call("tool:calc:add"))));
        model
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| {
                req.messages
                    .last()
                    .is_some_and(|m| m.role == MessageRole::Tool && m.content.contains("\"5\""))
            })
            .returning(|_| Ok(ChatCompletion::text("It is 5.")));

        let props = ProcessProperties {
            prompt: Some("Use tools.".to_string()),
            ..ProcessProperties::default()
        };
        let action = run(&model, &fx, &mut state, false, props).await;

        assert_eq!(action, DEFAULT_ACTION);
        let roles: Vec<_> = state.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::Tool,
                MessageRole::Assistant
            ]
        );
        assert_eq!(state.messages[2].tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(state.messages[3].content, "It is 5.");

        let trace = state.node_execution_tracker.last().unwrap();
        assert_eq!(trace.details["rounds"], 2);
        assert_eq!(trace.details["toolCalls"], 1);
    }

    #[tokio::test]
    async fn test_unapproved_tool_stops_with_approval_action() {
        let fx = Fixture::new().await;
        let mut state = state_with_calc_tools(&fx).await;
        let server = fx.connector.server("calc");

        let mut model = MockModel::new();
        model
            .expect_complete()
            .times(1)
            .returning(|_| Ok(ChatCompletion::default().with_tool_call(call("tool:calc:subtract"))));

        let action = run(&model, &fx, &mut state, false, ProcessProperties::default()).await;

        assert_eq!(action, APPROVAL_REQUIRED_ACTION);
        assert!(state.messages.last().unwrap().content.contains("Approval required"));
        assert!(
            !server.received_methods().contains(&"tools/call".to_string()),
            "unapproved tool must not reach the server"
        );
        let trace = state.node_execution_tracker.last().unwrap();
        assert_eq!(trace.details["pendingApproval"][0], "tool:calc:subtract");
    }

    #[tokio::test]
    async fn test_approve_all_runs_any_visible_tool() {
        let fx = Fixture::new().await;
        let mut state = state_with_calc_tools(&fx).await;

        let mut model = MockModel::new();
        let mut seq = mockall::Sequence::new();
        model
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ChatCompletion::default().with_tool_call(call("tool:calc:subtract"))));
        model
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ChatCompletion::text("done")));

        let action = run(&model, &fx, &mut state, true, ProcessProperties::default()).await;
        assert_eq!(action, DEFAULT_ACTION);
        assert!(state.messages[2].content.contains("\"-1\""));
    }

    #[tokio::test]
    async fn test_invisible_tool_reports_error_to_model() {
        let fx = Fixture::new().await;
        let mut state = state_with_calc_tools(&fx).await;

        let mut model = MockModel::new();
        let mut seq = mockall::Sequence::new();
        model
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ChatCompletion::default().with_tool_call(call("tool:fs:read"))));
        model
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ChatCompletion::text("sorry")));

        run(&model, &fx, &mut state, true, ProcessProperties::default()).await;
        assert!(state.messages[2].content.contains("server 'fs' is not available"));
    }

    #[tokio::test]
    async fn test_malformed_tool_name_reports_expected_shape() {
        let fx = Fixture::new().await;
        let mut state = state_with_calc_tools(&fx).await;

        let mut model = MockModel::new();
        let mut seq = mockall::Sequence::new();
        model
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ChatCompletion::default().with_tool_call(call("add"))));
        model
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ChatCompletion::text("sorry")));

        run(&model, &fx, &mut state, true, ProcessProperties::default()).await;
        assert!(state.messages[2].content.contains("expected tool:<server>:<name>"));
    }

    #[tokio::test]
    async fn test_round_limit_is_recorded() {
        let fx = Fixture::new().await;
        let mut state = state_with_calc_tools(&fx).await;

        let mut model = MockModel::new();
        model
            .expect_complete()
            .returning(|_| Ok(ChatCompletion::default().with_tool_call(call("tool:calc:add"))));

        run(&model, &fx, &mut state, false, ProcessProperties::default()).await;
        let trace = state.node_execution_tracker.last().unwrap();
        assert_eq!(trace.details["rounds"], 5);
        assert_eq!(trace.details["roundsExhausted"], true);
    }

    #[tokio::test]
    async fn test_model_failure_aborts_node() {
        let fx = Fixture::new().await;
        let mut state = SharedState::new("c1", "Test");
        let mut model = MockModel::new();
        model
            .expect_complete()
            .returning(|_| Err(ChatModelError::Provider("rate limited".to_string())));

        let props = ProcessProperties::default();
        let node = FlowNode::new("chat", NodeKind::Process(props.clone()));
        let ctx = RunContext {
            model: &model,
            ..fx.ctx()
        };
        let err = run_node(&ProcessNode::new(&node, &props), &mut state, &ctx, &Successors::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Model(_)));
        assert!(state.node_execution_tracker.is_empty());
    }
}
