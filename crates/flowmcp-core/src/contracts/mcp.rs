//! MCP tool invocation and status surfaces.

use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionState, ConnectionStatus};
use crate::ports::ToolInvocationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocationRequest {
    pub server_name: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: serde_json::Value,
    /// Timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// `{result}` on success, `{error, source}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolInvocationResponse {
    Success {
        result: serde_json::Value,
    },
    Failure {
        error: String,
        /// `timeout`, `cancelled`, `server`, `transport` or `not_connected`.
        source: String,
    },
}

impl ToolInvocationResponse {
    pub fn from_result(result: Result<serde_json::Value, &ToolInvocationError>) -> Self {
        match result {
            Ok(result) => Self::Success { result },
            Err(e) => Self::Failure {
                error: e.to_string(),
                source: e.source_tag().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub server_name: String,
    /// Correlation token of the call. Absent means force cancel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CancelResponse {
    Success { success: bool },
    Failure { error: String },
}

/// Status query result. Stderr tail is only present for errored stdio servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusResponse {
    pub name: String,
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stderr_output: Vec<String>,
}

impl ServerStatusResponse {
    pub fn from_state(name: impl Into<String>, state: &ConnectionState) -> Self {
        let errored = state.status == ConnectionStatus::Error;
        Self {
            name: name.into(),
            status: state.status,
            message: state.error.clone(),
            stderr_output: if errored {
                state.stderr_output.clone()
            } else {
                Vec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_response_carries_source() {
        let err = ToolInvocationError::Timeout {
            server: "calc".into(),
            tool: "add".into(),
            after: Duration::from_secs(1),
        };
        let json = serde_json::to_value(ToolInvocationResponse::from_result(Err(&err))).unwrap();
        assert_eq!(json["source"], "timeout");
        assert!(json["error"].as_str().unwrap().contains("timed out"));
    }

    #[test]
    fn test_status_response_hides_stderr_unless_errored() {
        let mut state = ConnectionState {
            status: ConnectionStatus::Connected,
            stderr_output: vec!["booting".into()],
            ..ConnectionState::default()
        };
        assert!(ServerStatusResponse::from_state("calc", &state).stderr_output.is_empty());

        state.status = ConnectionStatus::Error;
        state.error = Some("exited".into());
        let response = ServerStatusResponse::from_state("calc", &state);
        assert_eq!(response.stderr_output, vec!["booting".to_string()]);
        assert_eq!(response.message.as_deref(), Some("exited"));
    }
}
