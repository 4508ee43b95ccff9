//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together
//! for the CLI adapter:
//! - JSON repositories under the data directory (via flowmcp-db)
//! - MCP server registry (via flowmcp-mcp)
//! - Flow, conversation and executor services (via flowmcp-flow)
//!
//! Command handlers receive the fully-composed `CliContext` and delegate
//! work to it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use flowmcp_core::{
    AppEventEmitter, ChatModelPort, DataPaths, EchoChatModel, NoopEmitter, Repos, Settings,
    data_root, validate_settings,
};
use flowmcp_db::{CoreFactory, setup_data_dir};
use flowmcp_flow::{ConversationCache, ConversationService, FlowExecutor, FlowService};
use flowmcp_mcp::McpService;
use tracing::debug;

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Root of the persisted data.
    pub data_dir: PathBuf,
    /// Supervisor and executor tunables.
    pub settings: Settings,
}

impl CliConfig {
    /// Resolve the data root and read settings from the environment.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self {
            data_dir: data_root()?,
            settings: Settings::from_env().context("Invalid FLOWMCP_* setting")?,
        })
    }

    #[must_use]
    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }
}

/// Fully composed application context for CLI commands.
pub struct CliContext {
    pub paths: DataPaths,
    pub settings: Settings,
    pub mcp: Arc<McpService>,
    pub flows: FlowService,
    pub conversations: ConversationService,
    pub executor: FlowExecutor,
}

impl CliContext {
    /// Access the MCP service.
    pub const fn mcp(&self) -> &Arc<McpService> {
        &self.mcp
    }

    pub const fn flows(&self) -> &FlowService {
        &self.flows
    }

    pub const fn conversations(&self) -> &ConversationService {
        &self.conversations
    }

    pub const fn executor(&self) -> &FlowExecutor {
        &self.executor
    }

    /// Disconnect every server started by this invocation.
    pub async fn shutdown(&self) {
        self.mcp.shutdown().await;
    }
}

/// Bootstrap the CLI application.
///
/// Prepares the data directory, builds the repositories and wires the
/// registry with real transports. The CLI has no subscribers, so events go
/// to a `NoopEmitter`; the chat model is the deterministic `EchoChatModel`.
pub async fn bootstrap(config: CliConfig) -> Result<CliContext> {
    validate_settings(&config.settings)?;
    let paths = setup_data_dir(&config.data_dir)?;
    let repos = CoreFactory::build_repos(&paths);
    debug!(root = %paths.root.display(), "CLI data directory resolved");

    let emitter: Arc<dyn AppEventEmitter> = Arc::new(NoopEmitter::new());
    let mcp = Arc::new(McpService::new(
        Arc::clone(&repos.server_configs),
        Arc::clone(&emitter),
        config.settings.clone(),
    ));

    Ok(bootstrap_with(
        paths,
        repos,
        mcp,
        Arc::new(EchoChatModel::new()),
        emitter,
        config.settings,
    ))
}

/// Bootstrap with custom repos and registry (for testing).
pub fn bootstrap_with(
    paths: DataPaths,
    repos: Repos,
    mcp: Arc<McpService>,
    model: Arc<dyn ChatModelPort>,
    emitter: Arc<dyn AppEventEmitter>,
    settings: Settings,
) -> CliContext {
    let cache = Arc::new(ConversationCache::new(Arc::clone(&repos.conversations)));
    let executor = FlowExecutor::new(
        Arc::clone(&repos.flows),
        Arc::clone(&cache),
        Arc::clone(&mcp),
        model,
        emitter,
        settings.clone(),
    );

    CliContext {
        paths,
        settings,
        mcp,
        flows: FlowService::new(repos.flows),
        conversations: ConversationService::new(cache),
        executor,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use flowmcp_core::{EchoChatModel, NoopEmitter, ServerConfig, Settings};
    use flowmcp_db::TestStore;
    use flowmcp_mcp::McpService;
    use flowmcp_mcp::testing::FakeConnector;

    use super::{CliContext, bootstrap_with};

    /// Context over a temp store with a `calc` server on a fake transport.
    pub struct TestCli {
        pub _store: TestStore,
        pub ctx: CliContext,
    }

    impl TestCli {
        pub async fn new() -> Self {
            let store = TestStore::new().unwrap();
            let mcp = Arc::new(McpService::with_connector(
                Arc::clone(&store.repos.server_configs),
                Arc::new(NoopEmitter::new()),
                Arc::new(FakeConnector::new()),
                Settings::with_defaults(),
            ));
            mcp.add_config(
                ServerConfig::stdio("calc", "node", vec!["calc.js".to_string()])
                    .with_auto_approve("add"),
            )
            .await
            .unwrap();

            let ctx = bootstrap_with(
                store.paths.clone(),
                store.repos.clone(),
                mcp,
                Arc::new(EchoChatModel::new()),
                Arc::new(NoopEmitter::new()),
                Settings::with_defaults(),
            );
            Self { _store: store, ctx }
        }
    }
}
