//! High-level MCP service: the server registry.
//!
//! This service provides the API used by the flow engine and the CLI. It owns
//! the persisted server configurations (through the repository port), one
//! `ServerConnection` per server name, and the tool execution coordinator.
//! It is constructed once at startup and shared behind an `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use flowmcp_core::contracts::{
    CancelRequest, CancelResponse, ToolInvocationRequest, ToolInvocationResponse,
};
use flowmcp_core::{
    AppEvent, AppEventEmitter, ConnectionAttempt, ConnectionState, ConnectionStatus,
    McpServiceError, RepositoryError, ServerConfig, ServerConfigPatch, ServerConfigRepository,
    Settings, ToolDescriptor,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::McpClient;
use crate::connection::ServerConnection;
use crate::coordinator::{ToolCoordinator, new_call_token};
use crate::transport::{DefaultConnector, TransportConnector};

/// Server configuration with its runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub config: ServerConfig,
    pub state: ConnectionState,
}

/// Result of a tool listing: the tools plus the status they were read under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTools {
    pub server_name: String,
    pub status: ConnectionStatus,
    pub tools: Vec<ToolDescriptor>,
}

/// Detail view of one server, kept apart from the primary error messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDiagnostics {
    pub name: String,
    pub state: ConnectionState,
    pub attempts: Vec<ConnectionAttempt>,
    pub stderr: Vec<String>,
}

/// Options for a single tool call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the configured default timeout.
    pub timeout: Option<Duration>,
    /// Correlation token; generated when absent.
    pub token: Option<String>,
}

impl CallOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Resets the startup flag however the startup pass ends.
struct StartupGuard<'a>(&'a AtomicBool);

impl Drop for StartupGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// MCP service providing unified access to MCP server management.
pub struct McpService {
    repository: Arc<dyn ServerConfigRepository>,
    emitter: Arc<dyn AppEventEmitter>,
    connector: Arc<dyn TransportConnector>,
    connections: RwLock<HashMap<String, Arc<ServerConnection>>>,
    coordinator: ToolCoordinator,
    settings: Settings,
    starting_up: AtomicBool,
}

impl McpService {
    /// Create a service that opens real stdio/WebSocket transports.
    pub fn new(
        repository: Arc<dyn ServerConfigRepository>,
        emitter: Arc<dyn AppEventEmitter>,
        settings: Settings,
    ) -> Self {
        let connector = Arc::new(DefaultConnector::new(settings.effective_stderr_tail_lines()));
        Self::with_connector(repository, emitter, connector, settings)
    }

    /// Create a service with a custom transport connector.
    pub fn with_connector(
        repository: Arc<dyn ServerConfigRepository>,
        emitter: Arc<dyn AppEventEmitter>,
        connector: Arc<dyn TransportConnector>,
        settings: Settings,
    ) -> Self {
        Self {
            repository,
            coordinator: ToolCoordinator::new(Arc::clone(&emitter)),
            emitter,
            connector,
            connections: RwLock::new(HashMap::new()),
            settings,
            starting_up: AtomicBool::new(false),
        }
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// List all server configurations.
    pub async fn load_configs(&self) -> Result<Vec<ServerConfig>, McpServiceError> {
        Ok(self.repository.list().await?)
    }

    /// Get a server configuration by name.
    pub async fn get_config(&self, name: &str) -> Result<ServerConfig, McpServiceError> {
        self.repository.get(name).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => McpServiceError::NotFound(name.to_string()),
            other => other.into(),
        })
    }

    /// Add a new server configuration. Does not connect.
    pub async fn add_config(&self, config: ServerConfig) -> Result<(), McpServiceError> {
        config.validate().map_err(McpServiceError::InvalidConfig)?;

        let name = config.name.clone();
        let transport = config.transport_kind();
        self.repository.insert(config).await?;

        self.emitter.emit(AppEvent::mcp_server_added(&name, transport));
        info!(server_name = %name, transport = transport.as_str(), "Added MCP server configuration");
        Ok(())
    }

    /// Apply `patch` to the named configuration and persist it.
    ///
    /// The update succeeds once the record is saved. Enabling then connects
    /// the server; a failed connect is recorded in the connection state, not
    /// returned here. Disabling tears the connection down and drops its state.
    pub async fn update_config(
        &self,
        name: &str,
        patch: &ServerConfigPatch,
    ) -> Result<ServerConfig, McpServiceError> {
        let mut config = self.get_config(name).await?;
        let was_disabled = config.disabled;

        config.apply(patch);
        config.validate().map_err(McpServiceError::InvalidConfig)?;
        self.repository.update(&config).await?;

        self.emitter.emit(AppEvent::mcp_server_updated(name));
        info!(server_name = %name, disabled = config.disabled, "Updated MCP server configuration");

        if config.disabled && !was_disabled {
            self.drop_connection(name).await;
        } else if !config.disabled && was_disabled {
            if let Err(e) = self.connect_with(&config).await {
                warn!(server_name = %name, error = %e, "Server enabled but failed to connect");
            }
        }

        Ok(config)
    }

    /// Tear down the server's connection and delete its configuration.
    pub async fn delete_config(&self, name: &str) -> Result<(), McpServiceError> {
        self.drop_connection(name).await;

        self.repository.delete(name).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => McpServiceError::NotFound(name.to_string()),
            other => other.into(),
        })?;

        self.emitter.emit(AppEvent::mcp_server_removed(name));
        info!(server_name = %name, "Removed MCP server configuration");
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect every enabled server.
    ///
    /// Concurrent calls collapse into one pass: callers that find a pass in
    /// progress return `Ok(0)` immediately. A server that fails to connect is
    /// logged and skipped. Returns the number of servers connected.
    pub async fn start_enabled_servers(&self) -> Result<usize, McpServiceError> {
        if self
            .starting_up
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Startup pass already running, skipping");
            return Ok(0);
        }
        let _guard = StartupGuard(&self.starting_up);

        let configs = self.repository.list().await?;
        let mut connected = 0;

        for config in configs.iter().filter(|c| !c.disabled) {
            match self.connect_with(config).await {
                Ok(_) => connected += 1,
                Err(e) => {
                    warn!(
                        server_name = %config.name,
                        error = %e,
                        "Failed to start MCP server"
                    );
                }
            }
        }

        info!(connected, total = configs.len(), "MCP startup pass finished");
        Ok(connected)
    }

    /// Whether a startup pass is currently running.
    pub fn is_starting_up(&self) -> bool {
        self.starting_up.load(Ordering::SeqCst)
    }

    /// Connect the named server (no-op when already connected).
    pub async fn connect(&self, name: &str) -> Result<(), McpServiceError> {
        self.ensure_connected(name).await.map(|_| ())
    }

    /// Close the named server's transport. Idempotent.
    pub async fn disconnect(&self, name: &str) {
        if let Some(connection) = self.existing(name).await {
            connection.disconnect().await;
        }
    }

    /// Disconnect then reconnect using the current persisted configuration.
    pub async fn restart(&self, name: &str) -> Result<(), McpServiceError> {
        let config = self.enabled_config(name).await?;
        let connection = self.connection(name).await;
        connection.restart(&config).await?;
        info!(server_name = %name, "MCP server restarted");
        Ok(())
    }

    /// Cancel everything in flight on a server by reconnecting it.
    ///
    /// Used when no call token is known. Every pending call to the server
    /// fails with `Cancelled` as a side effect of closing the transport.
    pub async fn force_cancel(&self, name: &str, reason: &str) -> Result<(), McpServiceError> {
        let config = self.enabled_config(name).await?;
        let connection = self.connection(name).await;

        warn!(server_name = %name, reason = %reason, "Force-cancelling by reconnect");
        self.emitter.emit(AppEvent::tool_cancelled(name, None, None, reason));

        connection.disconnect().await;
        connection.connect(&config).await?;
        Ok(())
    }

    /// Disconnect every server.
    pub async fn shutdown(&self) {
        let connections: Vec<_> = self.connections.read().await.values().cloned().collect();
        for connection in connections {
            connection.disconnect().await;
        }
        info!("MCP service shut down");
    }

    /// Connect a throwaway copy of `config`, list its tools and disconnect.
    ///
    /// Nothing is persisted and the registry's connections are untouched.
    pub async fn test_connection(
        &self,
        config: &ServerConfig,
    ) -> Result<Vec<ToolDescriptor>, McpServiceError> {
        config.validate().map_err(McpServiceError::InvalidConfig)?;

        let connect_failed = |message: String| McpServiceError::ConnectFailed {
            server: config.name.clone(),
            message,
        };

        let transport = self
            .connector
            .open(config)
            .await
            .map_err(|e| connect_failed(e.to_string()))?;
        let client = McpClient::start(&config.name, transport);

        let timeout = self.settings.effective_connect_timeout();
        let result = match tokio::time::timeout(timeout, client.initialize()).await {
            Ok(Ok(_)) => client.list_tools().await.map_err(McpServiceError::from),
            Ok(Err(e)) => Err(connect_failed(format!("Handshake failed: {e}"))),
            Err(_) => Err(connect_failed(format!(
                "Handshake timed out after {}s",
                timeout.as_secs()
            ))),
        };

        client.close().await;
        result
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Current connection state. Pure read: never connects.
    pub async fn get_server_status(&self, name: &str) -> ConnectionState {
        self.existing(name)
            .await
            .map(|c| c.state())
            .unwrap_or_default()
    }

    /// All configured servers with their runtime state.
    pub async fn list_servers_with_status(&self) -> Result<Vec<ServerInfo>, McpServiceError> {
        let configs = self.repository.list().await?;
        let mut infos = Vec::with_capacity(configs.len());

        for config in configs {
            let state = self.get_server_status(&config.name).await;
            infos.push(ServerInfo { config, state });
        }

        Ok(infos)
    }

    /// State, recent connection attempts and stderr tail of one server.
    pub async fn server_diagnostics(
        &self,
        name: &str,
    ) -> Result<ServerDiagnostics, McpServiceError> {
        self.get_config(name).await?;

        let diagnostics = match self.existing(name).await {
            Some(connection) => ServerDiagnostics {
                name: name.to_string(),
                state: connection.state(),
                attempts: connection.attempts(),
                stderr: connection.stderr_tail(),
            },
            None => ServerDiagnostics {
                name: name.to_string(),
                state: ConnectionState::default(),
                attempts: Vec::new(),
                stderr: Vec::new(),
            },
        };
        Ok(diagnostics)
    }

    // =========================================================================
    // Tool Operations
    // =========================================================================

    /// Connect the named server if needed and return its client.
    pub async fn ensure_connected(&self, name: &str) -> Result<Arc<McpClient>, McpServiceError> {
        let config = self.enabled_config(name).await?;
        self.connect_with(&config).await
    }

    /// Like `ensure_connected`, layering `env` over the configured environment
    /// if this call has to start the server.
    pub async fn ensure_connected_with_env(
        &self,
        name: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<Arc<McpClient>, McpServiceError> {
        let mut config = self.enabled_config(name).await?;
        config
            .env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.connect_with(&config).await
    }

    /// Tools of the named server.
    ///
    /// Enabled servers are connected on demand. Disabled servers report
    /// `disconnected` with no tools and are never connected.
    pub async fn list_server_tools(&self, name: &str) -> Result<ServerTools, McpServiceError> {
        let config = self.get_config(name).await?;

        if config.disabled {
            return Ok(ServerTools {
                server_name: config.name,
                status: ConnectionStatus::Disconnected,
                tools: Vec::new(),
            });
        }

        let connection = self.connection(name).await;
        connection.connect(&config).await?;
        let tools = connection.list_tools().await?;

        Ok(ServerTools {
            server_name: config.name,
            status: connection.status(),
            tools,
        })
    }

    /// Drop the named server's cached tool list.
    pub async fn clear_tool_cache(&self, name: &str) {
        if let Some(connection) = self.existing(name).await {
            connection.clear_tool_cache();
        }
    }

    /// Call a tool, connecting the server first if needed.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Value,
        options: CallOptions,
    ) -> Result<Value, McpServiceError> {
        let client = self.ensure_connected(server_name).await?;
        let timeout = options
            .timeout
            .or_else(|| self.settings.effective_tool_timeout());
        let token = options.token.unwrap_or_else(new_call_token);

        Ok(self
            .coordinator
            .invoke(client, tool_name, arguments, timeout, token)
            .await?)
    }

    /// Cancel a call by token, or force-cancel the server when no token is given.
    ///
    /// Cancelling a finished or unknown token is a no-op.
    pub async fn cancel_tool_call(
        &self,
        server_name: &str,
        token: Option<&str>,
        reason: &str,
    ) -> Result<(), McpServiceError> {
        match token {
            Some(token) => {
                self.coordinator.cancel(server_name, token, reason);
                Ok(())
            }
            None => self.force_cancel(server_name, reason).await,
        }
    }

    /// Tool invocation surface: `{serverName, toolName, args, timeout?}`.
    pub async fn invoke(&self, request: ToolInvocationRequest) -> ToolInvocationResponse {
        let options = CallOptions {
            timeout: request.timeout.map(Duration::from_millis),
            token: None,
        };
        let result = self
            .call_tool(&request.server_name, &request.tool_name, request.args, options)
            .await;

        match result {
            Ok(value) => ToolInvocationResponse::Success { result: value },
            Err(McpServiceError::Tool(e)) => ToolInvocationResponse::from_result(Err(&e)),
            Err(e) => ToolInvocationResponse::Failure {
                error: e.to_string(),
                source: e.source_tag().to_string(),
            },
        }
    }

    /// Cancellation surface: `{serverName, token?, reason}`.
    pub async fn cancel(&self, request: CancelRequest) -> CancelResponse {
        match self
            .cancel_tool_call(&request.server_name, request.token.as_deref(), &request.reason)
            .await
        {
            Ok(()) => CancelResponse::Success { success: true },
            Err(e) => CancelResponse::Failure {
                error: e.to_string(),
            },
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn enabled_config(&self, name: &str) -> Result<ServerConfig, McpServiceError> {
        let config = self.get_config(name).await?;
        if config.disabled {
            return Err(McpServiceError::Disabled(name.to_string()));
        }
        Ok(config)
    }

    async fn connect_with(&self, config: &ServerConfig) -> Result<Arc<McpClient>, McpServiceError> {
        self.connection(&config.name).await.connect(config).await
    }

    /// Remove the connection from the active map, then close it.
    async fn drop_connection(&self, name: &str) {
        let connection = self.connections.write().await.remove(name);
        if let Some(connection) = connection {
            connection.disconnect().await;
        }
    }

    async fn existing(&self, name: &str) -> Option<Arc<ServerConnection>> {
        self.connections.read().await.get(name).cloned()
    }

    /// Get or create the connection slot for `name`.
    async fn connection(&self, name: &str) -> Arc<ServerConnection> {
        if let Some(connection) = self.existing(name).await {
            return connection;
        }

        let mut connections = self.connections.write().await;
        let connection = connections.entry(name.to_string()).or_insert_with(|| {
            Arc::new(ServerConnection::new(
                name,
                Arc::clone(&self.connector),
                Arc::clone(&self.emitter),
                self.settings.effective_tool_cache_ttl(),
                self.settings.effective_connect_timeout(),
            ))
        });
        Arc::clone(connection)
    }
}
