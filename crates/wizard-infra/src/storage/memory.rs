//! Volatile storage backend
//!
//! Process-local map of contexts. Lost on restart; meant for tests,
//! ephemeral demos, and as the fallback of the relational backend.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use wizard_core::storage::{check_revision, next_revision};
use wizard_core::{ContextKey, SaveReceipt, StorageAdapter, StorageError, StoredContext};

/// In-memory storage implementation
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<ContextKey, StoredContext>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored contexts
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if storage is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn save(&self, context: &StoredContext) -> Result<SaveReceipt, StorageError> {
        let key = context.key();
        let mut entries = self.entries.write().await;

        check_revision(&key, entries.get(&key), context)?;

        let saved_at = Utc::now();
        let persisted = next_revision(context, saved_at);
        entries.insert(key.clone(), persisted.clone());

        debug!(key = %key, revision = persisted.revision, "Saved context in memory");
        Ok(SaveReceipt {
            saved_at,
            context: persisted,
        })
    }

    async fn load(&self, key: &ContextKey) -> Result<Option<StoredContext>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn clear(&self, key: &ContextKey) -> Result<(), StorageError> {
        if self.entries.write().await.remove(key).is_some() {
            debug!(key = %key, "Cleared context from memory");
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
