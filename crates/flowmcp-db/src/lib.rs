//! JSON file persistence for flowmcp.
//!
//! Implements the repository ports from `flowmcp-core` on top of a data
//! directory: `mcp_servers.json`, `conversations/<id>.json` and
//! `flows/<id>.json`. Reads distinguish "absent" from "corrupted"; a
//! corrupted record is preserved as `*.corrupted.<timestamp>.bak` before the
//! error propagates.

#![deny(unsafe_code)]

pub mod factory;
pub mod json_store;
pub mod repositories;
pub mod setup;

// Re-export factory for convenient access
pub use factory::CoreFactory;

#[cfg(any(test, feature = "test-utils"))]
pub use factory::TestStore;

// Re-export repository implementations
pub use repositories::{
    JsonConversationRepository, JsonFlowRepository, JsonServerConfigRepository,
};

pub use setup::setup_data_dir;

#[cfg(test)]
use tokio_test as _;
