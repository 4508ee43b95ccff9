//! End-to-end flow runs against a fake calculator MCP server.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flowmcp_core::{
    AppEvent, ConversationRepository, ConversationStatus, FinishProperties, Flow, FlowNode,
    McpToolProperties, NodeKind, NodeType, ProcessProperties, RepositoryError, ServerConfig,
    Settings, SharedState, StartProperties,
};
use flowmcp_db::TestStore;
use flowmcp_flow::{APPROVAL_REQUIRED_ACTION, ConversationCache, FlowError, FlowExecutor, RunRequest};
use flowmcp_mcp::testing::FakeConnector;
use flowmcp_mcp::{EventBus, McpService};

struct Harness {
    store: TestStore,
    bus: EventBus,
    executor: FlowExecutor,
}

/// Conversation store that keeps a copy of every saved snapshot.
struct RecordingConversations {
    inner: Arc<dyn ConversationRepository>,
    saved: Mutex<Vec<SharedState>>,
}

impl RecordingConversations {
    fn new(inner: Arc<dyn ConversationRepository>) -> Self {
        Self {
            inner,
            saved: Mutex::new(Vec::new()),
        }
    }

    fn saved(&self) -> Vec<SharedState> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationRepository for RecordingConversations {
    async fn load(&self, conversation_id: &str) -> Result<Option<SharedState>, RepositoryError> {
        self.inner.load(conversation_id).await
    }

    async fn save(&self, state: &SharedState) -> Result<(), RepositoryError> {
        self.saved.lock().unwrap().push(state.clone());
        self.inner.save(state).await
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), RepositoryError> {
        self.inner.delete(conversation_id).await
    }

    async fn list(&self) -> Result<Vec<SharedState>, RepositoryError> {
        self.inner.list().await
    }
}

impl Harness {
    async fn new(settings: Settings) -> Self {
        let store = TestStore::new().unwrap();
        let conversations = Arc::clone(&store.repos.conversations);
        Self::with_conversations(store, conversations, settings).await
    }

    async fn with_conversations(
        store: TestStore,
        conversations: Arc<dyn ConversationRepository>,
        settings: Settings,
    ) -> Self {
        let bus = EventBus::default();
        let mcp = Arc::new(McpService::with_connector(
            Arc::clone(&store.repos.server_configs),
            Arc::new(bus.clone()),
            Arc::new(FakeConnector::new()),
            settings.clone(),
        ));
        mcp.add_config(
            ServerConfig::stdio("calc", "node", vec!["calc.js".to_string()])
                .with_auto_approve("add"),
        )
        .await
        .unwrap();

        let executor = FlowExecutor::new(
            Arc::clone(&store.repos.flows),
            Arc::new(ConversationCache::new(conversations)),
            mcp,
            Arc::new(flowmcp_core::EchoChatModel::new()),
            Arc::new(bus.clone()),
            settings,
        );
        Self {
            store,
            bus,
            executor,
        }
    }

    async fn add_flow(&self, flow: &Flow) {
        self.store.repos.flows.add(flow).await.unwrap();
    }
}

fn start() -> FlowNode {
    FlowNode::new("start", NodeKind::Start(StartProperties::default()))
}

fn calc_tools() -> FlowNode {
    FlowNode::new(
        "tools",
        NodeKind::McpTool(McpToolProperties::bound_to("calc").with_enabled_tools(["add"])),
    )
}

fn process() -> FlowNode {
    FlowNode::new("answer", NodeKind::Process(ProcessProperties::default()))
}

fn finish(message: Option<&str>) -> FlowNode {
    FlowNode::new(
        "finish",
        NodeKind::Finish(FinishProperties {
            message: message.map(str::to_string),
        }),
    )
}

fn calc_flow() -> Flow {
    Flow::new("calc-flow", "Calculator")
        .with_node(start())
        .with_node(calc_tools())
        .with_edge("start", "tools")
}

#[tokio::test]
async fn mcp_tool_node_exposes_only_enabled_tools() {
    let harness = Harness::new(Settings::with_defaults()).await;
    harness.add_flow(&calc_flow()).await;

    let response = harness
        .executor
        .run(RunRequest::new("calc-flow", "what can you do?"))
        .await
        .unwrap();

    assert_eq!(response.status, ConversationStatus::Completed);
    assert_eq!(response.steps, 2);
    let context = response.state.mcp_context.as_ref().unwrap();
    assert_eq!(context.server_name, "calc");
    let names: Vec<&str> = context.available_tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["tool:calc:add"]);
    assert_eq!(response.state.mcp_server.as_deref(), Some("calc"));

    let nodes: Vec<&str> = response.trace.iter().map(|t| t.node_id.as_str()).collect();
    assert_eq!(nodes, ["start", "tools"]);
}

#[tokio::test]
async fn process_node_runs_approved_tool() {
    let harness = Harness::new(Settings::with_defaults()).await;
    let flow = calc_flow()
        .with_node(process())
        .with_node(finish(None))
        .with_edge("tools", "answer")
        .with_edge("answer", "finish");
    harness.add_flow(&flow).await;

    let response = harness
        .executor
        .run(RunRequest::new("calc-flow", r#"/call tool:calc:add {"a": 2, "b": 3}"#))
        .await
        .unwrap();

    assert_eq!(response.status, ConversationStatus::Completed);
    let reply = response.reply.unwrap();
    assert!(reply.starts_with("Tool result:"), "unexpected reply: {reply}");
    assert!(reply.contains(r#""text":"5""#), "unexpected reply: {reply}");

    let answer = response.trace.iter().find(|t| t.node_id == "answer").unwrap();
    assert_eq!(answer.action, "default");
    assert_eq!(answer.details["toolCalls"], 1);
}

#[tokio::test]
async fn unapproved_tool_falls_back_to_first_successor() {
    let harness = Harness::new(Settings::with_defaults()).await;
    let flow = Flow::new("sub-flow", "Subtract")
        .with_node(start())
        .with_node(FlowNode::new(
            "tools",
            NodeKind::McpTool(McpToolProperties::bound_to("calc")),
        ))
        .with_node(process())
        .with_node(finish(Some("Stopped for {{title}}")))
        .with_edge("start", "tools")
        .with_edge("tools", "answer")
        .with_edge("answer", "finish");
    harness.add_flow(&flow).await;

    let response = harness
        .executor
        .run(
            RunRequest::new("sub-flow", r#"/call tool:calc:subtract {"a": 5, "b": 3}"#)
                .in_conversation("conv-1"),
        )
        .await
        .unwrap();

    let answer = response.trace.iter().find(|t| t.node_id == "answer").unwrap();
    assert_eq!(answer.action, APPROVAL_REQUIRED_ACTION);
    assert_eq!(response.trace.last().unwrap().node_type, NodeType::Finish);
    assert_eq!(response.status, ConversationStatus::Completed);
    assert!(response.reply.unwrap().starts_with("Stopped for "));
}

#[tokio::test]
async fn unmatched_action_takes_first_of_several_successors() {
    let store = TestStore::new().unwrap();
    let recorder = Arc::new(RecordingConversations::new(Arc::clone(
        &store.repos.conversations,
    )));
    let harness = Harness::with_conversations(
        store,
        Arc::clone(&recorder) as Arc<dyn ConversationRepository>,
        Settings::with_defaults(),
    )
    .await;

    let flow = Flow::new("branch-flow", "Branching")
        .with_node(start())
        .with_node(FlowNode::new(
            "tools",
            NodeKind::McpTool(McpToolProperties::bound_to("calc")),
        ))
        .with_node(process())
        .with_node(FlowNode::new("done", NodeKind::Finish(FinishProperties::default())))
        .with_node(FlowNode::new(
            "failed",
            NodeKind::Finish(FinishProperties {
                message: Some("error branch".to_string()),
            }),
        ))
        .with_edge("start", "tools")
        .with_edge("tools", "answer")
        .with_edge("answer", "done")
        .with_action_edge("answer", "failed", "error");
    harness.add_flow(&flow).await;

    let response = harness
        .executor
        .run(
            RunRequest::new("branch-flow", r#"/call tool:calc:subtract {"a": 5, "b": 3}"#)
                .in_conversation("conv-branch"),
        )
        .await
        .unwrap();

    let nodes: Vec<&str> = response.trace.iter().map(|t| t.node_id.as_str()).collect();
    assert_eq!(nodes, ["start", "tools", "answer", "done"]);
    assert_eq!(response.trace[2].action, APPROVAL_REQUIRED_ACTION);
    assert_eq!(response.status, ConversationStatus::Completed);

    let snapshots = recorder.saved();
    assert!(snapshots.len() >= nodes.len());
    for pair in snapshots.windows(2) {
        assert!(
            pair[1].updated_at >= pair[0].updated_at,
            "updatedAt went backwards: {} -> {}",
            pair[0].updated_at,
            pair[1].updated_at
        );
    }
    let stored = harness
        .store
        .repos
        .conversations
        .load("conv-branch")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.updated_at, snapshots.last().unwrap().updated_at);
    assert!(stored.updated_at >= stored.created_at);
}

#[tokio::test]
async fn approve_all_tools_runs_any_visible_tool() {
    let harness = Harness::new(Settings::with_defaults()).await;
    let flow = Flow::new("sub-flow", "Subtract")
        .with_node(start())
        .with_node(FlowNode::new(
            "tools",
            NodeKind::McpTool(McpToolProperties::bound_to("calc")),
        ))
        .with_node(process())
        .with_edge("start", "tools")
        .with_edge("tools", "answer");
    harness.add_flow(&flow).await;

    let response = harness
        .executor
        .run(
            RunRequest::new("sub-flow", r#"/call tool:calc:subtract {"a": 5, "b": 3}"#)
                .approve_all_tools(true),
        )
        .await
        .unwrap();

    let answer = response.trace.last().unwrap();
    assert_eq!(answer.action, "default");
    assert!(response.reply.unwrap().contains(r#""text":"2""#));
}

#[tokio::test]
async fn resumed_conversation_is_not_left_live() {
    let harness = Harness::new(Settings::with_defaults()).await;
    harness.add_flow(&calc_flow()).await;

    let first = harness
        .executor
        .run(RunRequest::new("calc-flow", "first").in_conversation("conv-1"))
        .await
        .unwrap();
    assert!(!harness.executor.conversations().is_live("conv-1"));

    let second = harness
        .executor
        .run(RunRequest::new("calc-flow", "second").in_conversation("conv-1"))
        .await
        .unwrap();

    assert_eq!(second.state.title, first.state.title);
    assert_eq!(second.state.node_execution_tracker.len(), 4);
    assert_eq!(second.trace.len(), 2);
    assert!(!harness.executor.conversations().is_live("conv-1"));

    let stored = harness
        .store
        .repos
        .conversations
        .load("conv-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ConversationStatus::Completed);
    let user_turns: Vec<&str> = stored
        .messages
        .iter()
        .filter(|m| m.role == flowmcp_core::MessageRole::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(user_turns, ["first", "second"]);
}

#[tokio::test]
async fn cycle_stops_at_step_limit() {
    let settings = Settings {
        max_flow_steps: Some(5),
        ..Settings::with_defaults()
    };
    let harness = Harness::new(settings).await;
    let flow = Flow::new("loop", "Loop")
        .with_node(start())
        .with_node(process())
        .with_edge("start", "answer")
        .with_edge("answer", "start");
    harness.add_flow(&flow).await;

    let err = harness
        .executor
        .run(RunRequest::new("loop", "spin").in_conversation("conv-loop"))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Configuration(_)), "got {err:?}");

    let stored = harness
        .store
        .repos
        .conversations
        .load("conv-loop")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ConversationStatus::Error);
    assert_eq!(stored.node_execution_tracker.len(), 5);
    assert!(!harness.executor.conversations().is_live("conv-loop"));
}

#[tokio::test]
async fn missing_server_binding_marks_conversation_failed() {
    let harness = Harness::new(Settings::with_defaults()).await;
    let flow = Flow::new("unbound", "Unbound")
        .with_node(start())
        .with_node(FlowNode::new(
            "tools",
            NodeKind::McpTool(McpToolProperties::default()),
        ))
        .with_edge("start", "tools");
    harness.add_flow(&flow).await;

    let err = harness
        .executor
        .run(RunRequest::new("unbound", "hi").in_conversation("conv-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Configuration(_)));

    let stored = harness
        .store
        .repos
        .conversations
        .load("conv-2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ConversationStatus::Error);
    assert_eq!(stored.node_execution_tracker.len(), 1);
}

#[tokio::test]
async fn missing_flow_is_not_found() {
    let harness = Harness::new(Settings::with_defaults()).await;
    let err = harness
        .executor
        .run(RunRequest::new("ghost", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::FlowNotFound(id) if id == "ghost"));
}

#[tokio::test]
async fn run_emits_node_and_completion_events() {
    let harness = Harness::new(Settings::with_defaults()).await;
    harness.add_flow(&calc_flow()).await;
    let mut events = harness.bus.subscribe();

    let response = harness
        .executor
        .run(RunRequest::new("calc-flow", "hi"))
        .await
        .unwrap();

    let mut executed = Vec::new();
    let mut completed = None;
    while let Ok(event) = events.try_recv() {
        match event {
            AppEvent::FlowNodeExecuted { node_id, .. } => executed.push(node_id),
            AppEvent::FlowRunCompleted {
                conversation_id,
                status,
                steps,
                ..
            } => completed = Some((conversation_id, status, steps)),
            _ => {}
        }
    }

    assert_eq!(executed, ["start", "tools"]);
    assert_eq!(
        completed,
        Some((response.conversation_id, ConversationStatus::Completed, 2))
    );
}
