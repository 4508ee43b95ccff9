//! Conversation (shared state) domain types.
//!
//! `SharedState` is the unit threaded through a flow run and persisted
//! between requests. Every field round-trips through storage unchanged.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flow::NodeType;
use super::mcp::NamespacedTool;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    /// Parse a role from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }

    /// Convert role to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub id: String,
    /// Namespaced tool name (`tool:<server>:<name>`).
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Set on `tool` messages: the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Result of a tool call, linked back to the request id.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageRole::Tool, content);
        msg.tool_call_id = Some(call_id.into());
        msg
    }

    #[must_use]
    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = calls;
        self
    }
}

/// Lifecycle of a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Created or idle between runs.
    #[default]
    Active,
    /// A flow run is in progress.
    Running,
    /// The last run reached a terminal node.
    Completed,
    /// The last run aborted with an error.
    Error,
}

/// The MCP server and tool set visible to the current node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpContext {
    pub server_name: String,
    pub available_tools: Vec<NamespacedTool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// One execution-trace entry, appended by every node's finalize phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub node_type: NodeType,
    pub node_id: String,
    pub node_name: String,
    pub timestamp: DateTime<Utc>,
    /// Action label returned by finalize.
    pub action: String,
    /// Kind-specific diagnostic fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl TraceEntry {
    pub fn new(
        node_type: NodeType,
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            node_type,
            node_id: node_id.into(),
            node_name: node_name.into(),
            timestamp: Utc::now(),
            action: action.into(),
            details: serde_json::Map::new(),
        }
    }

    /// Attach a diagnostic field.
    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Conversation state threaded through a flow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedState {
    pub conversation_id: String,
    #[serde(default)]
    pub flow_id: Option<String>,
    pub title: String,
    /// Canonical conversation order; append-only during a run.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub mcp_server: Option<String>,
    #[serde(default)]
    pub mcp_context: Option<McpContext>,
    #[serde(default)]
    pub node_execution_tracker: Vec<TraceEntry>,
    #[serde(default)]
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SharedState {
    pub fn new(conversation_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            flow_id: None,
            title: title.into(),
            messages: Vec::new(),
            system_prompt: None,
            mcp_server: None,
            mcp_context: None,
            node_execution_tracker: Vec::new(),
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_flow(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self
    }

    /// Bump `updated_at`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn record_trace(&mut self, entry: TraceEntry) {
        self.node_execution_tracker.push(entry);
    }

    /// Last message sent by the user, if any.
    pub fn last_user_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    }

    /// Apply a metadata update and bump `updated_at`.
    pub fn apply(&mut self, update: &ConversationUpdate) {
        if let Some(ref title) = update.title {
            self.title.clone_from(title);
        }
        if let Some(ref flow_id) = update.flow_id {
            self.flow_id.clone_from(flow_id);
        }
        if let Some(ref prompt) = update.system_prompt {
            self.system_prompt.clone_from(prompt);
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        self.touch();
    }
}

/// Partial metadata update for a conversation.
///
/// `Option<Option<T>>` fields: `None` = unchanged, `Some(None)` = cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationUpdate {
    pub title: Option<String>,
    pub flow_id: Option<Option<String>>,
    pub system_prompt: Option<Option<String>>,
    pub status: Option<ConversationStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut state = SharedState::new("c1", "Chat");
        let future = Utc::now() + chrono::Duration::hours(1);
        state.updated_at = future;
        state.touch();
        assert_eq!(state.updated_at, future);
    }

    #[test]
    fn test_apply_rebinds_flow_and_bumps_updated_at() {
        let mut state = SharedState::new("c1", "Chat").with_flow("old");
        let before = state.updated_at;
        state.apply(&ConversationUpdate {
            flow_id: Some(Some("new".to_string())),
            ..ConversationUpdate::default()
        });
        assert_eq!(state.flow_id.as_deref(), Some("new"));
        assert_eq!(state.title, "Chat");
        assert!(state.updated_at >= before);
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let mut state = SharedState::new("c1", "Chat");
        state.push_message(ChatMessage::user("hi"));
        state.record_trace(
            TraceEntry::new(NodeType::Start, "start", "Start", "default")
                .with_detail("seededMessages", 1),
        );
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["nodeExecutionTracker"][0]["nodeType"], "start");
        assert_eq!(json["nodeExecutionTracker"][0]["details"]["seededMessages"], 1);
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn test_last_user_message() {
        let mut state = SharedState::new("c1", "Chat");
        state.push_message(ChatMessage::user("first"));
        state.push_message(ChatMessage::assistant("reply"));
        state.push_message(ChatMessage::user("second"));
        state.push_message(ChatMessage::tool("call-1", "{}"));
        assert_eq!(state.last_user_message().unwrap().content, "second");
    }
}
