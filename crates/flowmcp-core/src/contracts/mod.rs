//! Request/response shapes shared by adapters.
//!
//! Plain serde types with no framework dependencies. Adapters (CLI JSON
//! output, HTTP handlers) marshal these; the services never see them.

mod mcp;

use serde::{Deserialize, Serialize};

pub use mcp::{
    CancelRequest, CancelResponse, ServerStatusResponse, ToolInvocationRequest,
    ToolInvocationResponse,
};

/// Structured error body returned instead of raw error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl<E: std::error::Error> From<&E> for ErrorResponse {
    fn from(err: &E) -> Self {
        Self::new(err.to_string())
    }
}
