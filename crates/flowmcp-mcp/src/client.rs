//! MCP JSON-RPC client multiplexed over one transport.
//!
//! A driver task owns the transport. Callers register a oneshot waiter keyed
//! by request id and the driver routes each response to its waiter. When the
//! transport goes away every waiter still registered is failed, so no caller
//! hangs on a dead server. Once failed, the waiter table refuses new
//! registrations, so a request racing the shutdown is rejected up front.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use flowmcp_core::{ToolDescriptor, ToolInvocationError};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::protocol::{
    self, InboundMessage, Inbound, InitializeResult, JsonRpcError, JsonRpcNotification,
    JsonRpcRequest, ServerCapabilities, ToolsListPage,
};
use crate::transport::{StderrLog, Transport};

/// Upper bound on `tools/list` pages followed for one listing.
const MAX_TOOL_PAGES: usize = 50;

type CallResult = Result<Value, ToolInvocationError>;
type PendingMap = Arc<Mutex<PendingTable>>;

/// Waiters keyed by request id, sealed once the driver shuts down.
#[derive(Default)]
struct PendingTable {
    waiters: HashMap<u64, oneshot::Sender<CallResult>>,
    sealed: bool,
}

impl PendingTable {
    /// Returns the waiter back if the table is already sealed.
    fn register(
        &mut self,
        id: u64,
        waiter: oneshot::Sender<CallResult>,
    ) -> Result<(), oneshot::Sender<CallResult>> {
        if self.sealed {
            return Err(waiter);
        }
        self.waiters.insert(id, waiter);
        Ok(())
    }

    fn take(&mut self, id: u64) -> Option<oneshot::Sender<CallResult>> {
        self.waiters.remove(&id)
    }

    fn seal_and_drain(&mut self) -> Vec<oneshot::Sender<CallResult>> {
        self.sealed = true;
        self.waiters.drain().map(|(_, waiter)| waiter).collect()
    }
}

enum Command {
    Send(String),
    Close(oneshot::Sender<()>),
}

/// A request that has been written to the server and awaits its response.
#[derive(Debug)]
pub struct PendingRequest {
    id: u64,
    rx: oneshot::Receiver<CallResult>,
}

impl PendingRequest {
    /// JSON-RPC id of the request, used for in-protocol cancellation.
    pub const fn id(&self) -> u64 {
        self.id
    }

    pub async fn wait(self) -> CallResult {
        self.rx
            .await
            .unwrap_or_else(|_| Err(ToolInvocationError::Transport("connection closed".to_string())))
    }
}

/// Client for one MCP server connection.
pub struct McpClient {
    server_name: String,
    commands: mpsc::UnboundedSender<Command>,
    pending: PendingMap,
    next_id: AtomicU64,
    closed: watch::Receiver<Option<String>>,
    stderr: Option<StderrLog>,
    capabilities: Mutex<Option<ServerCapabilities>>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Take ownership of `transport` and start the driver task.
    pub fn start(server_name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        let server_name = server_name.into();
        let stderr = transport.stderr();
        let pending: PendingMap = Arc::default();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed) = watch::channel(None);

        tokio::spawn(drive(
            server_name.clone(),
            transport,
            command_rx,
            Arc::clone(&pending),
            closed_tx,
        ));

        Self {
            server_name,
            commands,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            stderr,
            capabilities: Mutex::new(None),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Whether the driver has stopped (transport closed for any reason).
    pub fn is_closed(&self) -> bool {
        self.closed.borrow().is_some()
    }

    /// Receiver that yields `Some(reason)` once the transport is gone.
    pub fn close_signal(&self) -> watch::Receiver<Option<String>> {
        self.closed.clone()
    }

    /// Current stderr tail (stdio transports only).
    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr.as_ref().map(StderrLog::tail).unwrap_or_default()
    }

    pub fn stderr_log(&self) -> Option<StderrLog> {
        self.stderr.clone()
    }

    /// Number of requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().waiters.len()
    }

    /// Run the MCP handshake: `initialize` then `notifications/initialized`.
    pub async fn initialize(&self) -> Result<InitializeResult, ToolInvocationError> {
        let value = self
            .request(protocol::METHOD_INITIALIZE, Some(protocol::initialize_params()))
            .await?;
        let result: InitializeResult = serde_json::from_value(value).map_err(|e| {
            ToolInvocationError::Transport(format!("malformed initialize result: {e}"))
        })?;

        *self
            .capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(result.capabilities.clone());

        self.notify(protocol::METHOD_INITIALIZED, None)?;
        Ok(result)
    }

    /// List every tool the server exposes, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolInvocationError> {
        let advertises_tools = self
            .capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(|c| c.tools.is_some());
        if !advertises_tools {
            return Ok(Vec::new());
        }

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let value = self.request(protocol::METHOD_TOOLS_LIST, params).await?;
            let page: ToolsListPage = serde_json::from_value(value).map_err(|e| {
                ToolInvocationError::Transport(format!("malformed tools/list result: {e}"))
            })?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        warn!(
            server_name = %self.server_name,
            pages = MAX_TOOL_PAGES,
            "tools/list pagination limit reached, returning partial list"
        );
        Ok(tools)
    }

    /// Issue `tools/call` without waiting, so the caller can race or cancel it.
    ///
    /// The raw result (`content`, `isError`, ...) is returned untouched.
    pub fn start_tool_call(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<PendingRequest, ToolInvocationError> {
        let params = json!({
            "name": tool_name,
            "arguments": arguments
        });
        self.start_request(protocol::METHOD_TOOLS_CALL, Some(params))
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> CallResult {
        self.start_request(method, params)?.wait().await
    }

    /// Register a waiter and write the request.
    pub fn start_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<PendingRequest, ToolInvocationError> {
        if self.is_closed() {
            return Err(ToolInvocationError::NotConnected(self.server_name.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))
            .map_err(|e| ToolInvocationError::Transport(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        if self.lock_pending().register(id, tx).is_err() {
            return Err(ToolInvocationError::NotConnected(self.server_name.clone()));
        }

        if self.commands.send(Command::Send(line)).is_err() {
            self.lock_pending().take(id);
            return Err(ToolInvocationError::NotConnected(self.server_name.clone()));
        }

        Ok(PendingRequest { id, rx })
    }

    /// Send a notification (no response expected).
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ToolInvocationError> {
        let line = serde_json::to_string(&JsonRpcNotification::new(method, params))
            .map_err(|e| ToolInvocationError::Transport(e.to_string()))?;
        self.commands
            .send(Command::Send(line))
            .map_err(|_| ToolInvocationError::NotConnected(self.server_name.clone()))
    }

    /// Cancel request `id` in-protocol.
    ///
    /// The waiter receives `Cancelled` immediately and the server is told via
    /// `notifications/cancelled`. Returns `false` if the request already
    /// finished or was never issued.
    pub fn cancel(&self, id: u64, reason: &str) -> bool {
        let Some(waiter) = self.lock_pending().take(id) else {
            return false;
        };

        let _ = waiter.send(Err(ToolInvocationError::Cancelled {
            reason: reason.to_string(),
        }));

        if let Err(e) = self.notify(
            protocol::METHOD_CANCELLED,
            Some(protocol::cancelled_params(id, reason)),
        ) {
            debug!(server_name = %self.server_name, request_id = id, error = %e, "Could not deliver cancellation notice");
        }
        true
    }

    /// Stop waiting for request `id`; a late response is dropped.
    pub fn abandon(&self, id: u64) {
        self.lock_pending().take(id);
    }

    /// Close the transport and wait for the driver to release it.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn fail_pending(pending: &PendingMap, error: &ToolInvocationError) {
    let waiters = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .seal_and_drain();
    for waiter in waiters {
        let _ = waiter.send(Err(error.clone()));
    }
}

async fn drive(
    server_name: String,
    mut transport: Box<dyn Transport>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    pending: PendingMap,
    closed: watch::Sender<Option<String>>,
) {
    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(line)) => {
                    if let Err(e) = transport.send(line).await {
                        break format!("write failed: {e}");
                    }
                }
                Some(Command::Close(ack)) => {
                    commands.close();
                    transport.close().await;
                    fail_pending(&pending, &ToolInvocationError::Cancelled {
                        reason: "connection closed".to_string(),
                    });
                    let _ = closed.send(Some("closed by client".to_string()));
                    let _ = ack.send(());
                    debug!(server_name = %server_name, "MCP client closed");
                    return;
                }
                None => break "client dropped".to_string(),
            },
            inbound = transport.recv() => match inbound {
                Some(line) => handle_inbound(&server_name, &line, &pending, transport.as_mut()).await,
                None => break "server closed connection".to_string(),
            },
        }
    };

    commands.close();
    fail_pending(&pending, &ToolInvocationError::Transport(reason.clone()));
    transport.close().await;
    debug!(server_name = %server_name, reason = %reason, "MCP client driver exiting");
    let _ = closed.send(Some(reason));
}

async fn handle_inbound(
    server_name: &str,
    line: &str,
    pending: &PendingMap,
    transport: &mut dyn Transport,
) {
    let Ok(message) = serde_json::from_str::<InboundMessage>(line.trim()) else {
        // Launchers such as npx print banners on stdout before the server starts.
        debug!(server_name = %server_name, line = %line, "Skipping non-JSON-RPC output");
        return;
    };

    match message.classify() {
        Some(Inbound::Response { id, outcome }) => {
            let waiter = pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(id);
            let Some(waiter) = waiter else {
                debug!(server_name = %server_name, request_id = id, "Dropping response with no waiter");
                return;
            };
            let result = outcome.map_err(|e| ToolInvocationError::Server {
                code: e.code,
                message: e.message,
            });
            let _ = waiter.send(result);
        }
        Some(Inbound::Request { id, method }) => {
            let outcome = if method == protocol::METHOD_PING {
                Ok(json!({}))
            } else {
                Err(JsonRpcError {
                    code: protocol::METHOD_NOT_FOUND,
                    message: format!("Method not supported by client: {method}"),
                    data: None,
                })
            };
            if let Some(reply) = protocol::response_line(&id, outcome) {
                if let Err(e) = transport.send(reply).await {
                    debug!(server_name = %server_name, error = %e, "Failed to answer server request");
                }
            }
        }
        Some(Inbound::Notification { method }) => {
            debug!(server_name = %server_name, method = %method, "Server notification");
        }
        None => {
            debug!(server_name = %server_name, line = %line, "Unroutable JSON-RPC message");
        }
    }
}
