//! Wire transports to a single MCP server.
//!
//! A `Transport` moves newline-free JSON-RPC messages in both directions.
//! It is owned by exactly one client driver task, so methods take `&mut self`.
//! `recv` must be cancel-safe: the driver races it against outbound traffic.

mod path;
mod stderr;
mod stdio;
mod websocket;

use async_trait::async_trait;
use flowmcp_core::{ServerConfig, TransportConfig};
use thiserror::Error;

pub use path::{build_effective_path, validate_working_dir};
pub use stderr::{StderrLog, spawn_stderr_reader};
pub use stdio::StdioTransport;
pub use websocket::WebSocketTransport;

/// Errors raised while opening or using a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid transport configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn MCP server process: {0}")]
    Spawn(String),

    #[error("Failed to connect to MCP server: {0}")]
    Connect(String),

    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport closed")]
    Closed,
}

/// One open wire connection.
#[async_trait]
pub trait Transport: Send {
    /// Send one serialized JSON-RPC message.
    async fn send(&mut self, message: String) -> Result<(), TransportError>;

    /// Next inbound message, or `None` once the peer has gone away.
    async fn recv(&mut self) -> Option<String>;

    /// Close the connection and release the process/socket.
    async fn close(&mut self);

    /// Captured stderr, for transports that have one.
    fn stderr(&self) -> Option<StderrLog> {
        None
    }
}

/// Opens transports from server configurations.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn open(&self, config: &ServerConfig) -> Result<Box<dyn Transport>, TransportError>;
}

/// Connector used in production: dispatches on the transport kind.
#[derive(Debug, Clone)]
pub struct DefaultConnector {
    stderr_tail_lines: usize,
}

impl DefaultConnector {
    pub const fn new(stderr_tail_lines: usize) -> Self {
        Self { stderr_tail_lines }
    }
}

#[async_trait]
impl TransportConnector for DefaultConnector {
    async fn open(&self, config: &ServerConfig) -> Result<Box<dyn Transport>, TransportError> {
        config.validate().map_err(TransportError::InvalidConfig)?;

        match &config.transport {
            TransportConfig::Stdio { .. } => {
                let transport = StdioTransport::spawn(config, self.stderr_tail_lines)?;
                Ok(Box::new(transport))
            }
            TransportConfig::Websocket { url } => {
                let transport = WebSocketTransport::connect(url).await?;
                Ok(Box::new(transport))
            }
        }
    }
}
