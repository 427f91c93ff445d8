//! # chatfsm: a conversational state machine for chat bots.
//!
//! chatfsm drives a chat through a set of registered states, persisting
//! each chat's current state and scratch context so it survives a
//! restart. States mix in view rendering, message/callback validation,
//! and state-switching behavior through small composable recipes
//! rather than a trait-based inheritance hierarchy.
//!
//! chatfsm is under heavy development and the API is not considered
//! stable yet. Check back later for a future stable release.

use statics::{Config, CONFIG};

/// Outbound transport: sending rendered views back to a chat.
pub mod gateway;

/// Prometheus counters for actions, transitions, and errors.
pub mod metrics;

/// Database and in-memory storage backends for chat state/context.
pub mod persist;

/// States, contexts, the registry, and the machine that drives them.
pub mod state_machine;

/// Loads localized/static copy used by views and validators.
pub mod static_loader;

/// Misc utilities, namely the error taxonomy.
pub mod util;

/// Internal logger framework, external code should just use the log crate.
mod logger;

/// Static values for the tokio runtime, config, and database connection.
pub mod statics;

use crate::gateway::ChatGateway;
use crate::persist::durable::DurableStorage;
use crate::persist::memory::InMemoryStorage;
use crate::persist::StorageBackend;
use crate::state_machine::{StateMachine, StateRegistry};
use crate::static_loader::{FsStaticLoader, StaticLoader};
use crate::statics::{ARGS, CONFIG_BACKEND, DB_BACKEND, EXEC};
use crate::util::error::Result;
use confy::load_path;
use prometheus::default_registry;
use prometheus_hyper::Server;
use sea_orm::{ConnectOptions, Database};
use std::sync::Arc;
use tokio::sync::Notify;

fn prometheus_serve() -> tokio::task::JoinHandle<Result<()>> {
    tokio::spawn(async move {
        Server::run(
            default_registry(),
            CONFIG.logging.prometheus_hook,
            Notify::new().notified(),
        )
        .await?;
        Ok(())
    })
}

/// Configuration options for building a [`StateMachine`].
pub struct ChatFsmOpts {
    config: Option<Config>,
    registry: StateRegistry,
    gateway: Option<Arc<dyn ChatGateway>>,
    loader: Option<Arc<dyn StaticLoader>>,
}

impl ChatFsmOpts {
    /// Constructs a new builder around an already-built state
    /// registry. The registry is the one piece every deployment must
    /// supply itself: nothing in this crate knows what states a
    /// particular bot should have.
    pub fn new(registry: StateRegistry) -> Self {
        Self {
            config: None,
            registry,
            gateway: None,
            loader: None,
        }
    }

    /// Add a custom configuration to this machine, overriding the
    /// config parsed from the `--config` argument.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Supplies the transport used to send rendered views back to
    /// chats. Defaults to [`crate::gateway::RecordingGateway`] if
    /// never called, which is fine for tests and the demo binary but
    /// not for a real deployment.
    pub fn gateway(mut self, gateway: Arc<dyn ChatGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Supplies the loader used for localized/static copy. Defaults to
    /// [`FsStaticLoader`] rooted at `machine.static_text_dir`.
    pub fn loader(mut self, loader: Arc<dyn StaticLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    async fn build_async(self) -> Result<Arc<StateMachine>> {
        let config = if let Some(config) = self.config {
            config
        } else if let Some(args) = ARGS.get() {
            load_path(&args.config).expect("failed to load config")
        } else {
            Config::default()
        };
        CONFIG_BACKEND.set(config).ok();

        // leaked intentionally: the logger thread runs for the life of
        // the process, there's nothing sensible to join it against.
        Box::leak(Box::new(logger::setup_log()));

        let storage: Arc<dyn StorageBackend> = if CONFIG.persistence.use_durable_storage {
            let db = Database::connect(ConnectOptions::new(
                CONFIG.persistence.database_connection.to_owned(),
            ))
            .await?;
            DB_BACKEND.set(db.clone()).ok();
            Arc::new(DurableStorage::new(db))
        } else {
            Arc::new(InMemoryStorage::new())
        };

        let gateway = self
            .gateway
            .unwrap_or_else(|| crate::gateway::RecordingGateway::new());
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(FsStaticLoader::new(CONFIG.machine.static_text_dir.clone())));

        prometheus_serve();

        let machine = StateMachine::new(Arc::new(self.registry), storage, gateway, loader)
            .with_max_chain_depth(CONFIG.machine.max_chain_depth);
        Ok(Arc::new(machine))
    }

    /// Initializes logging, storage, and metrics, then returns the
    /// ready-to-use machine. Blocks the calling thread on the shared
    /// [`EXEC`] runtime.
    pub fn build(self) -> Arc<StateMachine> {
        EXEC.block_on(self.build_async())
            .expect("failed to initialize chatfsm")
    }
}
