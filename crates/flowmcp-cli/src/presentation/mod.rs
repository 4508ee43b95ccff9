//! Shared CLI presentation utilities.
//!
//! This module provides reusable display and formatting functions
//! for consistent CLI output across commands.
//!
//! # Guidelines
//!
//! - Keep this module format-only: no domain transforms
//! - Domain transforms belong in the services or CLI-local view-model helpers

pub mod status;
pub mod tables;

// Re-export commonly used items
pub use status::{format_local, print_state, status_label};
pub use tables::{format_optional, print_json, print_separator, truncate_string};
