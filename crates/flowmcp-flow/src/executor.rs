//! Flow executor.
//!
//! Walks a compiled flow against one conversation: each node runs its
//! prepare/execute/finalize lifecycle, the returned action selects the next
//! edge (falling back to the first declared successor), and the state is
//! persisted after every node. A node with no successors ends the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use flowmcp_core::{
    AppEvent, AppEventEmitter, ChatModelPort, ConversationStatus, Flow, FlowRepository,
    MessageRole, Settings, SharedState, TraceEntry,
};
use flowmcp_mcp::McpService;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::conversation_cache::ConversationCache;
use crate::error::FlowError;
use crate::graph::CompiledFlow;
use crate::nodes::{RunContext, execute_node};
use crate::template::{PromptRenderer, RunVariables};

const TITLE_MAX_CHARS: usize = 60;

/// One inbound run request.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub flow_id: String,
    /// Existing conversation to resume; a new one is created when absent.
    pub conversation_id: Option<String>,
    pub user_input: String,
    /// Extra template variables.
    pub variables: BTreeMap<String, String>,
    pub approve_all_tools: bool,
}

impl RunRequest {
    pub fn new(flow_id: impl Into<String>, user_input: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            user_input: user_input.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn approve_all_tools(mut self, approve: bool) -> Self {
        self.approve_all_tools = approve;
        self
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub conversation_id: String,
    pub status: ConversationStatus,
    pub steps: usize,
    /// Content of the last assistant message, if any.
    pub reply: Option<String>,
    /// Trace entries appended by this run.
    pub trace: Vec<TraceEntry>,
    pub state: SharedState,
}

pub struct FlowExecutor {
    flows: Arc<dyn FlowRepository>,
    conversations: Arc<ConversationCache>,
    mcp: Arc<McpService>,
    model: Arc<dyn ChatModelPort>,
    emitter: Arc<dyn AppEventEmitter>,
    renderer: PromptRenderer,
    settings: Settings,
}

impl FlowExecutor {
    pub fn new(
        flows: Arc<dyn FlowRepository>,
        conversations: Arc<ConversationCache>,
        mcp: Arc<McpService>,
        model: Arc<dyn ChatModelPort>,
        emitter: Arc<dyn AppEventEmitter>,
        settings: Settings,
    ) -> Self {
        Self {
            flows,
            conversations,
            mcp,
            model,
            emitter,
            renderer: PromptRenderer::new(),
            settings,
        }
    }

    pub fn conversations(&self) -> &Arc<ConversationCache> {
        &self.conversations
    }

    /// Run `request.flow_id` for one conversation.
    ///
    /// The conversation is looked up live first, then in storage, and
    /// created when absent. It is live for the duration of the run and
    /// evicted afterwards; a second concurrent run for the same conversation
    /// fails with `ConversationBusy`.
    pub async fn run(&self, request: RunRequest) -> Result<RunResponse, FlowError> {
        let flow = self
            .flows
            .get(&request.flow_id)
            .await?
            .ok_or_else(|| FlowError::FlowNotFound(request.flow_id.clone()))?;
        let graph = CompiledFlow::compile(&flow)?;

        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut state = match self.conversations.get_or_load(&conversation_id).await? {
            Some(state) => state,
            None => SharedState::new(&conversation_id, title_for(&flow, &request.user_input)),
        };
        state.flow_id = Some(flow.id.clone());
        state.status = ConversationStatus::Running;
        state.touch();
        self.conversations.begin_run(&state).await?;

        let trace_start = state.node_execution_tracker.len();
        let vars = RunVariables {
            user_input: request.user_input.clone(),
            conversation_id: conversation_id.clone(),
            flow_id: flow.id.clone(),
            title: state.title.clone(),
            extra: request.variables.clone(),
        };

        info!(
            conversation_id = %conversation_id,
            flow_id = %flow.id,
            "Flow run started"
        );

        let mut steps = 0;
        let outcome = self
            .walk(&graph, &mut state, &vars, request.approve_all_tools, &mut steps)
            .await;

        state.status = match &outcome {
            Ok(()) => ConversationStatus::Completed,
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    flow_id = %flow.id,
                    error = %e,
                    "Flow run aborted"
                );
                ConversationStatus::Error
            }
        };
        state.touch();

        let persisted = self.conversations.put_and_persist(&state).await;
        self.conversations.evict(&conversation_id);
        self.emitter.emit(AppEvent::flow_run_completed(
            &conversation_id,
            &flow.id,
            state.status,
            steps,
        ));

        outcome?;
        persisted?;

        info!(
            conversation_id = %conversation_id,
            flow_id = %flow.id,
            steps,
            "Flow run completed"
        );

        let reply = state
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant && !m.content.is_empty())
            .map(|m| m.content.clone());
        Ok(RunResponse {
            conversation_id,
            status: state.status,
            steps,
            reply,
            trace: state.node_execution_tracker[trace_start..].to_vec(),
            state,
        })
    }

    async fn walk(
        &self,
        graph: &CompiledFlow,
        state: &mut SharedState,
        vars: &RunVariables,
        approve_all_tools: bool,
        steps: &mut usize,
    ) -> Result<(), FlowError> {
        let ctx = RunContext {
            mcp: &self.mcp,
            model: self.model.as_ref(),
            renderer: &self.renderer,
            settings: &self.settings,
            vars,
            approve_all_tools,
        };
        let max_steps =
            usize::try_from(self.settings.effective_max_flow_steps()).unwrap_or(usize::MAX);
        let mut current = graph.start().to_string();

        loop {
            if *steps >= max_steps {
                return Err(FlowError::configuration(format!(
                    "flow exceeded {max_steps} steps"
                )));
            }
            let (Some(node), Some(successors)) =
                (graph.node(&current), graph.successors(&current))
            else {
                return Err(FlowError::invalid_graph(format!("unknown node '{current}'")));
            };

            let action = execute_node(node, state, &ctx, successors).await?;
            *steps += 1;
            state.touch();
            self.conversations.put_and_persist(state).await?;

            self.emitter.emit(AppEvent::flow_node_executed(
                &state.conversation_id,
                graph.flow_id(),
                &node.id,
                node.node_type(),
                &action,
            ));

            match successors.resolve(&action) {
                Some(next) => {
                    debug!(
                        conversation_id = %state.conversation_id,
                        node_id = %node.id,
                        action = %action,
                        next = %next,
                        "Advancing"
                    );
                    current = next.to_string();
                }
                None => return Ok(()),
            }
        }
    }
}

/// Title for a new conversation: the opening input, else the flow name.
fn title_for(flow: &Flow, user_input: &str) -> String {
    let input = user_input.trim();
    if input.is_empty() {
        return flow.name.clone();
    }
    let mut title: String = input.chars().take(TITLE_MAX_CHARS).collect();
    if input.chars().count() > TITLE_MAX_CHARS {
        title.push('…');
    }
    title
}
