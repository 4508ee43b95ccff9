//! In-process fake MCP servers for tests.
//!
//! `FakeServer` answers `initialize`, `tools/list` and `tools/call` the way a
//! small calculator server would. `FakeConnector` hands out `FakeTransport`s
//! and records every configuration it was asked to open, so tests can count
//! spawns and check which env/args a (re)connect used.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use flowmcp_core::{ServerConfig, ToolDescriptor};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};

use crate::transport::{StderrLog, Transport, TransportConnector, TransportError};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ServerInner {
    name: String,
    tools: Mutex<Vec<ToolDescriptor>>,
    received: Mutex<Vec<String>>,
    preamble: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    fail_list: AtomicBool,
    crashes: watch::Sender<u64>,
    stderr: StderrLog,
}

/// Scriptable fake MCP server shared by every transport opened to it.
#[derive(Clone)]
pub struct FakeServer {
    inner: Arc<ServerInner>,
}

impl FakeServer {
    pub fn new(name: &str, tools: Vec<ToolDescriptor>) -> Self {
        let (crashes, _) = watch::channel(0);
        Self {
            inner: Arc::new(ServerInner {
                name: name.to_string(),
                tools: Mutex::new(tools),
                received: Mutex::new(Vec::new()),
                preamble: Mutex::new(Vec::new()),
                list_calls: AtomicUsize::new(0),
                fail_list: AtomicBool::new(false),
                crashes,
                stderr: StderrLog::new(50),
            }),
        }
    }

    /// Exposes `add`, `subtract` and `hang` (never answers).
    pub fn calculator() -> Self {
        Self::new(
            "fake-calc",
            vec![
                ToolDescriptor::new("add").with_description("a + b"),
                ToolDescriptor::new("subtract").with_description("a - b"),
                ToolDescriptor::new("hang").with_description("never returns"),
            ],
        )
    }

    /// Number of `tools/list` requests answered so far.
    pub fn list_calls(&self) -> usize {
        self.inner.list_calls.load(Ordering::SeqCst)
    }

    /// Every method received, in order (requests and notifications).
    pub fn received_methods(&self) -> Vec<String> {
        lock(&self.inner.received).clone()
    }

    /// Make subsequent `tools/list` calls fail with an internal error.
    pub fn fail_tool_listing(&self, fail: bool) {
        self.inner.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_tools(&self, tools: Vec<ToolDescriptor>) {
        *lock(&self.inner.tools) = tools;
    }

    /// Print a raw line on stdout when the next transport opens.
    pub fn emit_raw(&self, line: &str) {
        lock(&self.inner.preamble).push(line.to_string());
    }

    /// Kill every open transport, leaving `message` on stderr.
    pub fn crash(&self, message: &str) {
        self.inner.stderr.push(message);
        self.inner.crashes.send_modify(|n| *n += 1);
    }

    fn handle(&self, request: &Value) -> Option<Result<Value, (i64, String)>> {
        let method = request.get("method")?.as_str()?;
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        let outcome = match method {
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": { "name": self.inner.name, "version": "0.0.1" },
                "capabilities": { "tools": {} }
            })),
            "tools/list" => {
                self.inner.list_calls.fetch_add(1, Ordering::SeqCst);
                if self.inner.fail_list.load(Ordering::SeqCst) {
                    Err((-32603, "tool listing unavailable".to_string()))
                } else {
                    let tools = lock(&self.inner.tools).clone();
                    Ok(json!({ "tools": tools }))
                }
            }
            "tools/call" => {
                let name = params.get("name").and_then(Value::as_str).unwrap_or("");
                let args = params.get("arguments").cloned().unwrap_or(Value::Null);
                let a = args.get("a").and_then(Value::as_i64).unwrap_or(0);
                let b = args.get("b").and_then(Value::as_i64).unwrap_or(0);
                match name {
                    "add" => Ok(text_result(&(a + b).to_string())),
                    "subtract" => Ok(text_result(&(a - b).to_string())),
                    "hang" => return None,
                    other => Err((-32602, format!("Unknown tool: {other}"))),
                }
            }
            other => Err((-32601, format!("Method not found: {other}"))),
        };
        Some(outcome)
    }
}

fn text_result(text: &str) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": false
    })
}

/// Transport speaking to a `FakeServer` without any I/O.
pub struct FakeTransport {
    server: FakeServer,
    outbox: mpsc::UnboundedSender<String>,
    inbox: mpsc::UnboundedReceiver<String>,
    crashes: watch::Receiver<u64>,
    closed: bool,
}

impl FakeTransport {
    pub fn new(server: FakeServer) -> Self {
        let (outbox, inbox) = mpsc::unbounded_channel();
        for line in lock(&server.inner.preamble).iter() {
            let _ = outbox.send(line.clone());
        }
        let crashes = server.inner.crashes.subscribe();
        Self {
            server,
            outbox,
            inbox,
            crashes,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&mut self, message: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let request: Value = serde_json::from_str(&message)
            .map_err(|e| TransportError::Io(std::io::Error::other(e)))?;
        if let Some(method) = request.get("method").and_then(Value::as_str) {
            lock(&self.server.inner.received).push(method.to_string());
        }

        let Some(id) = request.get("id").cloned() else {
            return Ok(());
        };
        if request.get("method").is_none() {
            // Reply to a server-initiated request.
            return Ok(());
        }

        if let Some(outcome) = self.server.handle(&request) {
            let reply = match outcome {
                Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                Err((code, message)) => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": code, "message": message }
                }),
            };
            let _ = self.outbox.send(reply.to_string());
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        tokio::select! {
            line = self.inbox.recv() => line,
            changed = self.crashes.changed() => {
                if changed.is_ok() {
                    self.closed = true;
                }
                None
            }
        }
    }

    async fn close(&mut self) {
        self.closed = true;
    }

    fn stderr(&self) -> Option<StderrLog> {
        Some(self.server.inner.stderr.clone())
    }
}

/// Connector that opens `FakeTransport`s by server name.
#[derive(Default)]
pub struct FakeConnector {
    servers: Mutex<HashMap<String, FakeServer>>,
    opened: Mutex<Vec<ServerConfig>>,
    refused: Mutex<HashSet<String>>,
    open_delay: Mutex<Duration>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `server` under `name`. Unknown names get a fresh calculator.
    #[must_use]
    pub fn with_server(self, name: &str, server: FakeServer) -> Self {
        lock(&self.servers).insert(name.to_string(), server);
        self
    }

    /// Delay every open, widening the window for racing connects.
    #[must_use]
    pub fn with_open_delay(self, delay: Duration) -> Self {
        *lock(&self.open_delay) = delay;
        self
    }

    /// Server registered under `name`, created on first use.
    pub fn server(&self, name: &str) -> FakeServer {
        lock(&self.servers)
            .entry(name.to_string())
            .or_insert_with(FakeServer::calculator)
            .clone()
    }

    /// Make opens for `name` fail as if the executable were missing.
    pub fn refuse(&self, name: &str) {
        lock(&self.refused).insert(name.to_string());
    }

    pub fn allow(&self, name: &str) {
        lock(&self.refused).remove(name);
    }

    /// How many transports were opened (spawned) for `name`.
    pub fn open_count(&self, name: &str) -> usize {
        lock(&self.opened).iter().filter(|c| c.name == name).count()
    }

    /// Configurations used for `name`, oldest first.
    pub fn opened_configs(&self, name: &str) -> Vec<ServerConfig> {
        lock(&self.opened)
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TransportConnector for FakeConnector {
    async fn open(&self, config: &ServerConfig) -> Result<Box<dyn Transport>, TransportError> {
        let delay = *lock(&self.open_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if lock(&self.refused).contains(&config.name) {
            return Err(TransportError::Spawn(format!(
                "Failed to spawn '{}': No such file or directory",
                config.name
            )));
        }

        lock(&self.opened).push(config.clone());
        let server = self.server(&config.name);
        Ok(Box::new(FakeTransport::new(server)))
    }
}
