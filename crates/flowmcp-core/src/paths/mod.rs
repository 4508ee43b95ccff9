//! Path utilities for flowmcp data directories.
//!
//! # Layout
//!
//! ```text
//! <data_root>/
//!   mcp_servers.json
//!   conversations/<conversationId>.json
//!   flows/<flowId>.json
//! ```
//!
//! # Design
//!
//! - Returns `PathBuf` and `PathError` for clear error handling
//! - No interactive/terminal I/O - adapters handle user prompts separately
//! - OS-specific logic is kept private in `platform`

mod ensure;
mod error;
mod layout;
mod platform;

#[cfg(test)]
mod test_utils;

// Error type
pub use error::PathError;

// Platform roots
pub use platform::{DATA_DIR_ENV, data_root};

// Data layout
pub use layout::{DataPaths, conversations_dir, flows_dir, mcp_servers_path};

// Directory operations
pub use ensure::{DirectoryCreationStrategy, ensure_directory, verify_writable};
