//! Connection state machine for one configured server.
//!
//! `disconnected -> connecting -> initialization -> connected`, with `error`
//! reachable from any live state. Connect, disconnect and restart take the
//! same async lock, so at most one transport exists per server and a restart
//! fully tears down before it reconnects.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use flowmcp_core::{
    AppEvent, AppEventEmitter, AttemptStatus, ConnectionAttempt, ConnectionState,
    ConnectionStatus, McpServiceError, ServerConfig, ToolDescriptor, ToolInvocationError,
};
use tracing::{debug, info, warn};

use crate::client::McpClient;
use crate::tool_cache::ToolCache;
use crate::transport::{StderrLog, TransportConnector};

/// Connection attempts retained for diagnostics.
pub const MAX_ATTEMPTS: usize = 20;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State readable without waiting on the lifecycle lock.
struct Shared {
    name: String,
    state: Mutex<ConnectionState>,
    attempts: Mutex<VecDeque<ConnectionAttempt>>,
    stderr: Mutex<Option<StderrLog>>,
    /// Bumped whenever the live transport is replaced or dropped.
    generation: AtomicU64,
    emitter: Arc<dyn AppEventEmitter>,
}

impl Shared {
    fn status(&self) -> ConnectionStatus {
        lock(&self.state).status
    }

    fn transition(&self, status: ConnectionStatus, error: Option<String>, stderr: Vec<String>) {
        {
            let mut state = lock(&self.state);
            state.status = status;
            state.error.clone_from(&error);
            state.stderr_output = stderr;
            if status == ConnectionStatus::Connected {
                state.last_connected_at = Some(Utc::now());
            }
        }
        debug!(server_name = %self.name, status = %status, "Connection status changed");
        self.emitter
            .emit(AppEvent::mcp_status_changed(&self.name, status, error));
    }

    fn begin_attempt(&self) -> String {
        let attempt = ConnectionAttempt::pending();
        let id = attempt.request_id.clone();
        let mut attempts = lock(&self.attempts);
        if attempts.len() >= MAX_ATTEMPTS {
            attempts.pop_front();
        }
        attempts.push_back(attempt);
        id
    }

    fn finish_attempt(&self, request_id: &str, status: AttemptStatus, error: Option<String>) {
        let mut attempts = lock(&self.attempts);
        if let Some(attempt) = attempts.iter_mut().find(|a| a.request_id == request_id) {
            attempt.status = status;
            attempt.error = error;
        }
    }

    fn stderr_tail(&self) -> Vec<String> {
        lock(&self.stderr)
            .as_ref()
            .map(StderrLog::tail)
            .unwrap_or_default()
    }

    /// The driver of transport `generation` stopped on its own.
    fn on_transport_lost(&self, generation: u64, reason: &str) {
        if self.generation.load(Ordering::SeqCst) != generation
            || self.status() != ConnectionStatus::Connected
        {
            return;
        }
        warn!(server_name = %self.name, reason = %reason, "MCP server connection lost");
        self.transition(
            ConnectionStatus::Error,
            Some(format!("Connection lost: {reason}")),
            self.stderr_tail(),
        );
    }
}

/// One server's connection, owned by the registry.
pub struct ServerConnection {
    shared: Arc<Shared>,
    slot: tokio::sync::Mutex<Option<Arc<McpClient>>>,
    tools: ToolCache,
    connector: Arc<dyn TransportConnector>,
    connect_timeout: Duration,
}

impl ServerConnection {
    pub fn new(
        name: impl Into<String>,
        connector: Arc<dyn TransportConnector>,
        emitter: Arc<dyn AppEventEmitter>,
        tool_cache_ttl: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(ConnectionState::default()),
                attempts: Mutex::new(VecDeque::new()),
                stderr: Mutex::new(None),
                generation: AtomicU64::new(0),
                emitter,
            }),
            slot: tokio::sync::Mutex::new(None),
            tools: ToolCache::new(tool_cache_ttl),
            connector,
            connect_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Snapshot of the current state. Never triggers a connection attempt.
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared.state).clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Recent connection attempts, oldest first.
    pub fn attempts(&self) -> Vec<ConnectionAttempt> {
        lock(&self.shared.attempts).iter().cloned().collect()
    }

    /// Live stderr tail of the current (or last) transport.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.shared.stderr_tail()
    }

    /// The connected client, if any.
    pub async fn client(&self) -> Option<Arc<McpClient>> {
        let slot = self.slot.lock().await;
        slot.as_ref()
            .filter(|c| !c.is_closed() && self.status() == ConnectionStatus::Connected)
            .cloned()
    }

    /// Connect using `config`. No-op when already connected.
    ///
    /// Concurrent callers queue on the lifecycle lock and the later ones
    /// observe the connection the first one established.
    pub async fn connect(&self, config: &ServerConfig) -> Result<Arc<McpClient>, McpServiceError> {
        let mut slot = self.slot.lock().await;
        self.connect_locked(&mut slot, config).await
    }

    /// Close the transport and drop cached tools. Idempotent.
    pub async fn disconnect(&self) {
        let mut slot = self.slot.lock().await;
        self.disconnect_locked(&mut slot).await;
    }

    /// Disconnect, then connect with `config` (the current persisted one).
    pub async fn restart(&self, config: &ServerConfig) -> Result<Arc<McpClient>, McpServiceError> {
        let mut slot = self.slot.lock().await;
        self.disconnect_locked(&mut slot).await;
        self.connect_locked(&mut slot, config).await
    }

    /// Tools of the connected server, served from cache within the TTL.
    ///
    /// A failed live listing falls back to the last good listing of the
    /// same transport, if there is one.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpServiceError> {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        if let Some(tools) = self.tools.fresh(generation) {
            debug!(server_name = %self.name(), "Tool list served from cache");
            return Ok(tools);
        }

        let client = self
            .client()
            .await
            .ok_or_else(|| ToolInvocationError::NotConnected(self.name().to_string()))?;

        match client.list_tools().await {
            Ok(tools) => {
                if self.shared.generation.load(Ordering::SeqCst) == generation {
                    self.tools.store(generation, tools.clone());
                }
                Ok(tools)
            }
            Err(e) => match self.tools.stale(generation) {
                Some(tools) => {
                    warn!(
                        server_name = %self.name(),
                        error = %e,
                        "Live tool listing failed, serving cached tools"
                    );
                    Ok(tools)
                }
                None => Err(e.into()),
            },
        }
    }

    /// Drop the cached tool list.
    pub fn clear_tool_cache(&self) {
        self.tools.clear();
    }

    async fn connect_locked(
        &self,
        slot: &mut Option<Arc<McpClient>>,
        config: &ServerConfig,
    ) -> Result<Arc<McpClient>, McpServiceError> {
        if let Some(client) = slot.as_ref() {
            if !client.is_closed() && self.status() == ConnectionStatus::Connected {
                return Ok(Arc::clone(client));
            }
        }

        // A transport left behind by a failure or a lost connection.
        if let Some(stale) = slot.take() {
            stale.close().await;
        }
        self.tools.clear();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let attempt = self.shared.begin_attempt();
        self.shared
            .transition(ConnectionStatus::Connecting, None, Vec::new());

        let transport = match self.connector.open(config).await {
            Ok(transport) => transport,
            Err(e) => return Err(self.fail(&attempt, e.to_string(), Vec::new())),
        };

        self.shared
            .transition(ConnectionStatus::Initialization, None, Vec::new());

        let client = Arc::new(McpClient::start(self.name(), transport));
        *lock(&self.shared.stderr) = client.stderr_log();

        let init = match tokio::time::timeout(self.connect_timeout, client.initialize()).await {
            Ok(Ok(init)) => init,
            Ok(Err(e)) => {
                let stderr = client.stderr_tail();
                client.close().await;
                return Err(self.fail(&attempt, format!("Handshake failed: {e}"), stderr));
            }
            Err(_) => {
                let stderr = client.stderr_tail();
                client.close().await;
                return Err(self.fail(
                    &attempt,
                    format!(
                        "Handshake timed out after {}s",
                        self.connect_timeout.as_secs()
                    ),
                    stderr,
                ));
            }
        };

        self.shared
            .finish_attempt(&attempt, AttemptStatus::Success, None);
        self.shared
            .transition(ConnectionStatus::Connected, None, Vec::new());

        info!(
            server_name = %self.name(),
            transport = %config.transport_kind().as_str(),
            remote = %init.server_info.name,
            protocol_version = %init.protocol_version,
            "MCP server connected"
        );

        self.watch_for_loss(&client, generation);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    async fn disconnect_locked(&self, slot: &mut Option<Arc<McpClient>>) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.tools.clear();

        if let Some(client) = slot.take() {
            client.close().await;
        }

        if self.status() != ConnectionStatus::Disconnected {
            self.shared
                .transition(ConnectionStatus::Disconnected, None, Vec::new());
            info!(server_name = %self.name(), "MCP server disconnected");
        }
    }

    fn fail(&self, attempt: &str, message: String, stderr: Vec<String>) -> McpServiceError {
        warn!(server_name = %self.name(), error = %message, "MCP server connection failed");
        self.shared
            .finish_attempt(attempt, AttemptStatus::Failed, Some(message.clone()));
        self.shared
            .transition(ConnectionStatus::Error, Some(message.clone()), stderr);
        McpServiceError::ConnectFailed {
            server: self.name().to_string(),
            message,
        }
    }

    fn watch_for_loss(&self, client: &McpClient, generation: u64) {
        let shared = Arc::clone(&self.shared);
        let mut signal = client.close_signal();
        tokio::spawn(async move {
            let reason = match signal.wait_for(Option::is_some).await {
                Ok(reason) => reason.clone().unwrap_or_default(),
                Err(_) => "client dropped".to_string(),
            };
            shared.on_transport_lost(generation, &reason);
        });
    }
}

#[cfg(test)]
mod tests {
    use flowmcp_core::{AppEvent, NoopEmitter};

    use super::*;
    use crate::events::EventBus;
    use crate::testing::FakeConnector;

    fn connection(connector: Arc<FakeConnector>, emitter: Arc<dyn AppEventEmitter>) -> ServerConnection {
        ServerConnection::new(
            "calc",
            connector,
            emitter,
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
    }

    fn calc() -> ServerConfig {
        ServerConfig::stdio("calc", "calc-server", vec![])
    }

    #[tokio::test]
    async fn test_concurrent_connects_spawn_once() {
        let connector = Arc::new(FakeConnector::new().with_open_delay(Duration::from_millis(20)));
        let conn = connection(Arc::clone(&connector), Arc::new(NoopEmitter::new()));
        let config = calc();

        let (a, b) = tokio::join!(conn.connect(&config), conn.connect(&config));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.open_count("calc"), 1);
        assert_eq!(conn.status(), ConnectionStatus::Connected);
        assert!(conn.state().last_connected_at.is_some());
    }

    #[tokio::test]
    async fn test_reconnect_yields_fresh_transport_and_empty_cache() {
        let connector = Arc::new(FakeConnector::new());
        let server = connector.server("calc");
        let conn = connection(Arc::clone(&connector), Arc::new(NoopEmitter::new()));
        let config = calc();

        let first = conn.connect(&config).await.unwrap();
        conn.list_tools().await.unwrap();
        assert_eq!(server.list_calls(), 1);

        conn.disconnect().await;
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        assert!(first.is_closed());

        let second = conn.connect(&config).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(connector.open_count("calc"), 2);

        conn.list_tools().await.unwrap();
        assert_eq!(server.list_calls(), 2, "old cache entry must not survive reconnect");
    }

    #[tokio::test]
    async fn test_spawn_failure_records_error_and_attempt() {
        let connector = Arc::new(FakeConnector::new());
        connector.refuse("calc");
        let conn = connection(Arc::clone(&connector), Arc::new(NoopEmitter::new()));

        let err = conn.connect(&calc()).await.unwrap_err();
        assert!(matches!(err, McpServiceError::ConnectFailed { .. }));

        let state = conn.state();
        assert_eq!(state.status, ConnectionStatus::Error);
        assert!(state.error.unwrap().contains("No such file"));

        let attempts = conn.attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, AttemptStatus::Failed);

        connector.allow("calc");
        conn.connect(&calc()).await.unwrap();
        assert_eq!(conn.attempts()[1].status, AttemptStatus::Success);
    }

    #[tokio::test]
    async fn test_lost_connection_moves_to_error_with_stderr() {
        let connector = Arc::new(FakeConnector::new());
        let server = connector.server("calc");
        let conn = connection(Arc::clone(&connector), Arc::new(NoopEmitter::new()));
        conn.connect(&calc()).await.unwrap();

        server.crash("Traceback: KeyError 'a'");

        tokio::time::timeout(Duration::from_secs(2), async {
            while conn.status() != ConnectionStatus::Error {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let state = conn.state();
        assert!(state.error.unwrap().starts_with("Connection lost"));
        assert_eq!(state.stderr_output, vec!["Traceback: KeyError 'a'"]);

        // Reconnect replaces the dead transport.
        conn.connect(&calc()).await.unwrap();
        assert_eq!(connector.open_count("calc"), 2);
    }

    #[tokio::test]
    async fn test_restart_emits_disconnected_then_connecting() {
        let bus = EventBus::new(64);
        let mut events = bus.subscribe();
        let connector = Arc::new(FakeConnector::new());
        let conn = connection(connector, Arc::new(bus.clone()));

        conn.connect(&calc()).await.unwrap();
        conn.restart(&calc()).await.unwrap();

        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let AppEvent::McpServerStatusChanged { status, .. } = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Initialization,
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnected,
                ConnectionStatus::Connecting,
                ConnectionStatus::Initialization,
                ConnectionStatus::Connected,
            ]
        );
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let conn = connection(Arc::new(FakeConnector::new()), Arc::new(NoopEmitter::new()));
        conn.disconnect().await;
        conn.disconnect().await;
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
    }
}
