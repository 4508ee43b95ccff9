//! Settings domain types and validation.
//!
//! All fields are optional; `effective_*` accessors apply defaults. Values
//! come from environment variables (see [`Settings::from_env`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time-to-live of a cached `tools/list` result.
pub const DEFAULT_TOOL_CACHE_TTL_SECS: u64 = 60;

/// Default limit for transport spawn plus MCP handshake.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default number of stderr lines retained per stdio connection.
pub const DEFAULT_STDERR_TAIL_LINES: usize = 200;

/// Default number of model round trips a process node may make.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 5;

/// Default number of node executions in one flow run.
pub const DEFAULT_MAX_FLOW_STEPS: u32 = 100;

pub const ENV_TOOL_CACHE_TTL_SECS: &str = "FLOWMCP_TOOL_CACHE_TTL_SECS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "FLOWMCP_CONNECT_TIMEOUT_SECS";
pub const ENV_TOOL_TIMEOUT_SECS: &str = "FLOWMCP_TOOL_TIMEOUT_SECS";
pub const ENV_STDERR_TAIL_LINES: &str = "FLOWMCP_STDERR_TAIL_LINES";
pub const ENV_MAX_TOOL_ROUNDS: &str = "FLOWMCP_MAX_TOOL_ROUNDS";
pub const ENV_MAX_FLOW_STEPS: &str = "FLOWMCP_MAX_FLOW_STEPS";

/// Application settings structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Seconds a tool list stays fresh in the per-server cache.
    pub tool_cache_ttl_secs: Option<u64>,

    /// Seconds allowed for spawning a transport and completing the handshake.
    pub connect_timeout_secs: Option<u64>,

    /// Timeout applied to tool calls that do not carry their own.
    pub default_tool_timeout_secs: Option<u64>,

    /// Stderr lines kept per stdio connection.
    pub stderr_tail_lines: Option<usize>,

    /// Maximum model round trips per process node.
    pub max_tool_rounds: Option<u32>,

    /// Maximum node executions per flow run.
    pub max_flow_steps: Option<u32>,
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            tool_cache_ttl_secs: Some(DEFAULT_TOOL_CACHE_TTL_SECS),
            connect_timeout_secs: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
            default_tool_timeout_secs: None,
            stderr_tail_lines: Some(DEFAULT_STDERR_TAIL_LINES),
            max_tool_rounds: Some(DEFAULT_MAX_TOOL_ROUNDS),
            max_flow_steps: Some(DEFAULT_MAX_FLOW_STEPS),
        }
    }

    /// Read settings from `FLOWMCP_*` environment variables.
    ///
    /// Unset variables stay `None`; set-but-unparseable ones are an error.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &'static str,
        ) -> Result<Option<T>, SettingsError> {
            lookup(key)
                .map(|raw| {
                    raw.trim().parse::<T>().map_err(|_| SettingsError::InvalidValue {
                        key,
                        value: raw.clone(),
                    })
                })
                .transpose()
        }

        Ok(Self {
            tool_cache_ttl_secs: parse(&lookup, ENV_TOOL_CACHE_TTL_SECS)?,
            connect_timeout_secs: parse(&lookup, ENV_CONNECT_TIMEOUT_SECS)?,
            default_tool_timeout_secs: parse(&lookup, ENV_TOOL_TIMEOUT_SECS)?,
            stderr_tail_lines: parse(&lookup, ENV_STDERR_TAIL_LINES)?,
            max_tool_rounds: parse(&lookup, ENV_MAX_TOOL_ROUNDS)?,
            max_flow_steps: parse(&lookup, ENV_MAX_FLOW_STEPS)?,
        })
    }

    #[must_use]
    pub fn effective_tool_cache_ttl(&self) -> Duration {
        Duration::from_secs(
            self.tool_cache_ttl_secs
                .unwrap_or(DEFAULT_TOOL_CACHE_TTL_SECS),
        )
    }

    #[must_use]
    pub fn effective_connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// `None` means tool calls wait indefinitely unless the caller sets a timeout.
    #[must_use]
    pub fn effective_tool_timeout(&self) -> Option<Duration> {
        self.default_tool_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn effective_stderr_tail_lines(&self) -> usize {
        self.stderr_tail_lines.unwrap_or(DEFAULT_STDERR_TAIL_LINES)
    }

    #[must_use]
    pub fn effective_max_tool_rounds(&self) -> u32 {
        self.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS)
    }

    #[must_use]
    pub fn effective_max_flow_steps(&self) -> u32 {
        self.max_flow_steps.unwrap_or(DEFAULT_MAX_FLOW_STEPS)
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{key} must be greater than zero")]
    MustBePositive { key: &'static str },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    let checks: [(&'static str, Option<u64>); 6] = [
        ("tool_cache_ttl_secs", settings.tool_cache_ttl_secs),
        ("connect_timeout_secs", settings.connect_timeout_secs),
        ("default_tool_timeout_secs", settings.default_tool_timeout_secs),
        (
            "stderr_tail_lines",
            settings
                .stderr_tail_lines
                .map(|v| u64::try_from(v).unwrap_or(u64::MAX)),
        ),
        ("max_tool_rounds", settings.max_tool_rounds.map(u64::from)),
        ("max_flow_steps", settings.max_flow_steps.map(u64::from)),
    ];

    for (key, value) in checks {
        if value == Some(0) {
            return Err(SettingsError::MustBePositive { key });
        }
    }

    Ok(())
}
