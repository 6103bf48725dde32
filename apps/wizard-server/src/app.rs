//! Application state and initialization

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use wizard_core::WizardConfig;
use wizard_engine::{Event, EventBus, WizardRegistry};
use wizard_infra::{build_storage, MemoryTaskQueue, TimeoutPolicy};

use crate::cli::Args;
use crate::server::Server;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<WizardRegistry>,
}

impl AppState {
    /// Wire storage, queue, bus and the built-in wizards from configuration
    pub async fn new(config: &WizardConfig) -> Result<Self> {
        info!("Initializing application components");

        let storage = build_storage(&config.storage).await;
        let queue = Arc::new(MemoryTaskQueue::new());
        let bus = EventBus::new();
        bus.on("*", |event: &Event| {
            debug!(event_type = %event.event_type, event_id = %event.id, "Wizard event");
            Ok(())
        });

        let registry = WizardRegistry::with_builtin(
            storage,
            queue,
            bus,
            TimeoutPolicy::from_config(&config.timeouts),
        )
        .context("Failed to register built-in wizards")?;

        info!(
            wizards = ?registry.ids(),
            backend = registry.storage_backend(),
            "Wizard registry ready"
        );

        Ok(Self {
            registry: Arc::new(registry),
        })
    }
}

pub struct App {
    config: WizardConfig,
    state: AppState,
}

impl App {
    pub async fn build(args: Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => WizardConfig::load_from_file(&path.to_string_lossy())
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => WizardConfig::load().context("Failed to load configuration")?,
        };
        if let Some(port) = args.port {
            config.server.port = port;
        }

        let state = AppState::new(&config).await?;
        Ok(Self { config, state })
    }

    pub async fn run(self) -> Result<()> {
        Server::new(self.config.server, self.state).run().await
    }
}
