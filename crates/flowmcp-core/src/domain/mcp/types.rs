//! MCP server domain types.
//!
//! These types are shared between the supervisor, the flow engine and any
//! adapter that serializes them (CLI JSON output, HTTP handlers).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire transport used to reach an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Local child process speaking JSON-RPC over stdin/stdout.
    Stdio,
    /// Remote server reached through a WebSocket client.
    Websocket,
}

impl TransportKind {
    /// Lowercase wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Websocket => "websocket",
        }
    }
}

/// Transport-specific connection parameters.
///
/// Serialized flat into the server record with a `transport` tag, so a stdio
/// record looks like `{"transport": "stdio", "command": "npx", "args": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportConfig {
    Stdio {
        /// Executable name or path. Flags belong in `args`.
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        /// Working directory for the child process.
        #[serde(
            rename = "rootPath",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        root_path: Option<String>,
    },
    Websocket {
        url: String,
    },
}

impl TransportConfig {
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::Websocket { .. } => TransportKind::Websocket,
        }
    }

    /// Validate required fields for the transport kind.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Stdio {
                command, root_path, ..
            } => {
                if command.trim().is_empty() {
                    return Err("Stdio server command cannot be empty".to_string());
                }
                if command.contains(char::is_whitespace) {
                    return Err(
                        "Command must be an executable name/path only (e.g., 'npx'). \
                         Put flags and arguments in the 'args' field."
                            .to_string(),
                    );
                }
                if let Some(root) = root_path {
                    if !root.is_empty() && !std::path::Path::new(root).is_absolute() {
                        return Err(format!("Stdio server rootPath must be absolute: {root}"));
                    }
                }
                Ok(())
            }
            Self::Websocket { url } => {
                if url.is_empty() {
                    return Err("WebSocket server url cannot be empty".to_string());
                }
                if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                    return Err(format!("WebSocket url must use ws:// or wss://: {url}"));
                }
                Ok(())
            }
        }
    }
}

/// Persisted configuration of one MCP server.
///
/// `name` is the sole identity: the registry, the connection map and flow
/// nodes all address a server by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub name: String,

    #[serde(default)]
    pub disabled: bool,

    /// Tools that may run without asking the user first.
    #[serde(default)]
    pub auto_approve: BTreeSet<String>,

    #[serde(flatten)]
    pub transport: TransportConfig,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Opaque, consumed by the external setup tooling only.
    #[serde(
        rename = "_buildCommand",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub build_command: Option<String>,

    /// Opaque, consumed by the external setup tooling only.
    #[serde(
        rename = "_installCommand",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub install_command: Option<String>,
}

impl ServerConfig {
    /// Create a stdio server configuration.
    #[must_use]
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self::with_transport(
            name,
            TransportConfig::Stdio {
                command: command.into(),
                args,
                root_path: None,
            },
        )
    }

    /// Create a WebSocket server configuration.
    #[must_use]
    pub fn websocket(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_transport(name, TransportConfig::Websocket { url: url.into() })
    }

    fn with_transport(name: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            name: name.into(),
            disabled: false,
            auto_approve: BTreeSet::new(),
            transport,
            env: BTreeMap::new(),
            build_command: None,
            install_command: None,
        }
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the disabled flag.
    #[must_use]
    pub const fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Mark a tool as auto-approved.
    #[must_use]
    pub fn with_auto_approve(mut self, tool: impl Into<String>) -> Self {
        self.auto_approve.insert(tool.into());
        self
    }

    pub const fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Validate name and transport parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Server name cannot be empty".to_string());
        }
        if self.name.contains(':') {
            return Err(format!(
                "Server name must not contain ':' (used in tool namespacing): {}",
                self.name
            ));
        }
        self.transport.validate()
    }

    /// Apply a partial update. The name is never changed by a patch.
    pub fn apply(&mut self, patch: &ServerConfigPatch) {
        if let Some(disabled) = patch.disabled {
            self.disabled = disabled;
        }
        if let Some(ref auto_approve) = patch.auto_approve {
            self.auto_approve.clone_from(auto_approve);
        }
        if let Some(ref transport) = patch.transport {
            self.transport = transport.clone();
        }
        if let Some(ref env) = patch.env {
            self.env.clone_from(env);
        }
        if let Some(ref cmd) = patch.build_command {
            self.build_command.clone_from(cmd);
        }
        if let Some(ref cmd) = patch.install_command {
            self.install_command.clone_from(cmd);
        }
    }
}

/// Partial update of a `ServerConfig`.
///
/// All fields are optional - only provided fields are updated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_approve: Option<BTreeSet<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,

    #[serde(
        rename = "_buildCommand",
        skip_serializing_if = "Option::is_none"
    )]
    pub build_command: Option<Option<String>>,

    #[serde(
        rename = "_installCommand",
        skip_serializing_if = "Option::is_none"
    )]
    pub install_command: Option<Option<String>>,
}

impl ServerConfigPatch {
    /// Patch that only toggles the disabled flag.
    #[must_use]
    pub fn disabled(disabled: bool) -> Self {
        Self {
            disabled: Some(disabled),
            ..Self::default()
        }
    }

    /// Patch that only replaces the environment.
    #[must_use]
    pub fn env(env: BTreeMap<String, String>) -> Self {
        Self {
            env: Some(env),
            ..Self::default()
        }
    }
}

/// Runtime status of one server connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    /// Transport is open and the MCP handshake is in progress.
    Initialization,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Initialization => "initialization",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Whether a live transport exists (or is being brought up) in this state.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Initialization | Self::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one server's connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: ConnectionStatus,

    /// Human-readable message of the last failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Tail of the server's stderr (stdio transports only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stderr_output: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
}

/// Outcome of a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Success,
    Failed,
}

/// Ephemeral record of one connect/reconnect operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAttempt {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionAttempt {
    /// Start a new pending attempt with a fresh request id.
    pub fn pending() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            status: AttemptStatus::Pending,
            error: None,
        }
    }
}

/// Tool definition discovered through `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "empty_object_schema")]
    pub input_schema: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object" })
}

impl ToolDescriptor {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: empty_object_schema(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }
}
