//! Tool execution coordinator.
//!
//! Each call gets a correlation token. The token maps to the server and the
//! JSON-RPC request id, which is what in-protocol cancellation needs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use flowmcp_core::{AppEvent, AppEventEmitter, ToolInvocationError};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::McpClient;

struct InFlight {
    server_name: String,
    tool_name: String,
    request_id: u64,
    client: Arc<McpClient>,
}

/// Tracks in-flight tool calls by token.
pub struct ToolCoordinator {
    inflight: Mutex<HashMap<String, InFlight>>,
    emitter: Arc<dyn AppEventEmitter>,
}

/// Generate a fresh call token.
pub fn new_call_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl ToolCoordinator {
    pub fn new(emitter: Arc<dyn AppEventEmitter>) -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            emitter,
        }
    }

    /// Number of calls currently awaiting a result.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Run one tool call on `client` under `token`.
    ///
    /// On timeout only the caller's wait is abandoned: the connection stays up
    /// and a late response is discarded.
    pub async fn invoke(
        &self,
        client: Arc<McpClient>,
        tool_name: &str,
        arguments: Value,
        timeout: Option<Duration>,
        token: String,
    ) -> Result<Value, ToolInvocationError> {
        let server_name = client.server_name().to_string();
        let call = client.start_tool_call(tool_name, arguments)?;
        let request_id = call.id();

        self.lock().insert(
            token.clone(),
            InFlight {
                server_name: server_name.clone(),
                tool_name: tool_name.to_string(),
                request_id,
                client: Arc::clone(&client),
            },
        );
        self.emitter
            .emit(AppEvent::tool_started(&server_name, tool_name, &token));

        let started = Instant::now();
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    client.abandon(request_id);
                    Err(ToolInvocationError::Timeout {
                        server: server_name.clone(),
                        tool: tool_name.to_string(),
                        after: limit,
                    })
                }
            },
            None => call.wait().await,
        };

        self.lock().remove(&token);
        self.report(&server_name, tool_name, &token, started.elapsed(), &result);
        result
    }

    /// Cancel the call registered under `token` on `server_name`.
    ///
    /// Unknown or finished tokens are a no-op. Returns whether a live call
    /// was cancelled.
    pub fn cancel(&self, server_name: &str, token: &str, reason: &str) -> bool {
        let entry = {
            let mut inflight = self.lock();
            let owner = inflight.get(token).map(|c| c.server_name.clone());
            match owner {
                Some(owner) if owner == server_name => inflight.remove(token),
                Some(owner) => {
                    debug!(
                        token = %token,
                        expected = %server_name,
                        actual = %owner,
                        "Cancel token belongs to another server, ignoring"
                    );
                    None
                }
                None => None,
            }
        };

        let Some(call) = entry else {
            debug!(server_name = %server_name, token = %token, "Cancel for unknown or finished call");
            return false;
        };

        info!(
            server_name = %server_name,
            tool_name = %call.tool_name,
            token = %token,
            reason = %reason,
            "Cancelling tool call"
        );
        call.client.cancel(call.request_id, reason)
    }

    fn report(
        &self,
        server_name: &str,
        tool_name: &str,
        token: &str,
        elapsed: Duration,
        result: &Result<Value, ToolInvocationError>,
    ) {
        let event = match result {
            Ok(_) => AppEvent::tool_completed(server_name, tool_name, token, elapsed),
            Err(ToolInvocationError::Timeout { after, .. }) => {
                warn!(server_name = %server_name, tool_name = %tool_name, timeout_ms = after.as_millis(), "Tool call timed out");
                AppEvent::tool_timed_out(server_name, tool_name, token, *after)
            }
            Err(ToolInvocationError::Cancelled { reason }) => {
                AppEvent::tool_cancelled(server_name, Some(tool_name), Some(token), reason.clone())
            }
            Err(e) => {
                debug!(server_name = %server_name, tool_name = %tool_name, error = %e, "Tool call failed");
                AppEvent::tool_failed(server_name, tool_name, token, e.source_tag(), e.to_string())
            }
        };
        self.emitter.emit(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, InFlight>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::events::EventBus;
    use crate::testing::{FakeServer, FakeTransport};

    async fn connected(server: &FakeServer) -> Arc<McpClient> {
        let client = Arc::new(McpClient::start(
            "calc",
            Box::new(FakeTransport::new(server.clone())),
        ));
        client.initialize().await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_timeout_is_reported_distinctly() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let coordinator = ToolCoordinator::new(Arc::new(bus));
        let client = connected(&FakeServer::calculator()).await;

        let err = coordinator
            .invoke(
                Arc::clone(&client),
                "hang",
                json!({}),
                Some(Duration::from_millis(30)),
                new_call_token(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.source_tag(), "timeout");
        assert_eq!(client.pending_count(), 0);
        assert_eq!(coordinator.in_flight(), 0);

        // The connection is still usable.
        let ok = coordinator
            .invoke(client, "add", json!({"a": 2, "b": 2}), None, new_call_token())
            .await
            .unwrap();
        assert_eq!(ok["content"][0]["text"], "4");

        let names: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.event_name())
            .collect();
        assert_eq!(
            names,
            vec!["tool:started", "tool:timed_out", "tool:started", "tool:completed"]
        );
    }

    #[tokio::test]
    async fn test_cancel_by_token() {
        let coordinator = Arc::new(ToolCoordinator::new(Arc::new(EventBus::new(16))));
        let client = connected(&FakeServer::calculator()).await;
        let token = new_call_token();

        let call = {
            let coordinator = Arc::clone(&coordinator);
            let token = token.clone();
            tokio::spawn(async move {
                coordinator
                    .invoke(client, "hang", json!({}), None, token)
                    .await
            })
        };

        while coordinator.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(!coordinator.cancel("other", &token, "wrong server"));
        assert!(coordinator.cancel("calc", &token, "user abort"));
        assert!(!coordinator.cancel("calc", &token, "twice"));

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ToolInvocationError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_unknown_token_is_noop() {
        let coordinator = ToolCoordinator::new(Arc::new(flowmcp_core::NoopEmitter::new()));
        assert!(!coordinator.cancel("calc", "no-such-token", "late"));
    }
}
