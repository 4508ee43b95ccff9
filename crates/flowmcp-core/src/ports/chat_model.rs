//! Chat model port.
//!
//! The process node talks to a language model only through this trait. The
//! provider HTTP client lives outside the core; `EchoChatModel` is a
//! deterministic stand-in used by the CLI and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ChatMessage, MessageRole, NamespacedTool, ToolCallRequest};

/// Errors returned by a chat model implementation.
#[derive(Debug, Error)]
pub enum ChatModelError {
    #[error("Model provider error: {0}")]
    Provider(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

/// One completion request: the whole conversation plus the visible tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Namespaced tools the model may call.
    #[serde(default)]
    pub tools: Vec<NamespacedTool>,
}

/// Model output: text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletion {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatCompletion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_call(mut self, call: ToolCallRequest) -> Self {
        self.tool_calls.push(call);
        self
    }
}

#[async_trait]
pub trait ChatModelPort: Send + Sync {
    async fn complete(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletion, ChatModelError>;
}

/// Deterministic model that echoes the user.
///
/// A user message of the form `/call <tool:server:name> <json-args>` turns
/// into a tool call when that tool is visible; the next turn then echoes the
/// tool result.
#[derive(Debug, Clone, Default)]
pub struct EchoChatModel;

impl EchoChatModel {
    pub const fn new() -> Self {
        Self
    }

    fn parse_call(content: &str, tools: &[NamespacedTool]) -> Option<ToolCallRequest> {
        let rest = content.trim().strip_prefix("/call ")?;
        let (name, args) = rest
            .trim()
            .split_once(char::is_whitespace)
            .unwrap_or((rest.trim(), "{}"));
        if !tools.iter().any(|t| t.name == name) {
            return None;
        }
        let arguments = serde_json::from_str(args.trim()).ok()?;
        Some(ToolCallRequest {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            arguments,
        })
    }
}

#[async_trait]
impl ChatModelPort for EchoChatModel {
    async fn complete(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletion, ChatModelError> {
        let Some(last) = request.messages.last() else {
            return Ok(ChatCompletion::text(""));
        };
        match last.role {
            MessageRole::Tool => Ok(ChatCompletion::text(format!("Tool result: {}", last.content))),
            MessageRole::User => Ok(Self::parse_call(&last.content, &request.tools).map_or_else(
                || ChatCompletion::text(format!("Echo: {}", last.content)),
                |call| ChatCompletion::default().with_tool_call(call),
            )),
            MessageRole::System | MessageRole::Assistant => Ok(ChatCompletion::text(String::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolDescriptor;

    fn request(messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages,
            tools: vec![NamespacedTool::new("calc", &ToolDescriptor::new("add"))],
            ..ChatCompletionRequest::default()
        }
    }

    #[tokio::test]
    async fn test_echo_user_message() {
        let reply = EchoChatModel::new()
            .complete(request(vec![ChatMessage::user("hello")]))
            .await
            .unwrap();
        assert_eq!(reply.content, "Echo: hello");
        assert!(reply.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_call_syntax_produces_tool_call() {
        let reply = EchoChatModel::new()
            .complete(request(vec![ChatMessage::user(
                r#"/call tool:calc:add {"a":1,"b":2}"#,
            )]))
            .await
            .unwrap();
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].name, "tool:calc:add");
        assert_eq!(reply.tool_calls[0].arguments["b"], 2);
    }

    #[tokio::test]
    async fn test_call_to_invisible_tool_is_echoed() {
        let reply = EchoChatModel::new()
            .complete(request(vec![ChatMessage::user("/call tool:fs:read {}")]))
            .await
            .unwrap();
        assert!(reply.tool_calls.is_empty());
        assert!(reply.content.starts_with("Echo:"));
    }
}
