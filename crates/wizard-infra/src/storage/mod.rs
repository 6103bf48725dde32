//! Storage backends for wizard contexts

pub mod file;
pub mod memory;
pub mod postgres;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

use std::sync::Arc;
use tracing::info;
use wizard_core::{StorageAdapter, StorageBackend, StorageConfig};

/// Build the configured storage backend
pub async fn build_storage(config: &StorageConfig) -> Arc<dyn StorageAdapter> {
    let storage: Arc<dyn StorageAdapter> = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        StorageBackend::File => Arc::new(FileStorage::open(&config.path).await),
        StorageBackend::Postgres => Arc::new(PostgresStorage::connect(config).await),
    };

    info!(backend = storage.backend(), "Wizard storage initialized");
    storage
}
