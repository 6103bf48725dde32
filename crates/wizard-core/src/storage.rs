//! Storage abstraction for wizard progress snapshots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{ContextKey, StoredContext};
use crate::error::StorageError;

/// Result of a successful save
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReceipt<C = StoredContext> {
    pub saved_at: DateTime<Utc>,
    /// Context as persisted, carrying its new revision
    pub context: C,
}

/// Pluggable persistence backend for wizard contexts.
///
/// Implementations must honor the revision contract: a save succeeds only
/// when the stored revision equals `context.revision` (a missing record
/// counts as revision 0); the persisted copy carries `revision + 1`.
/// Anything else is a [`StorageError::Conflict`].
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Persist a context
    async fn save(&self, context: &StoredContext) -> Result<SaveReceipt, StorageError>;

    /// Load the context stored under `key`
    async fn load(&self, key: &ContextKey) -> Result<Option<StoredContext>, StorageError>;

    /// Remove the context stored under `key`
    async fn clear(&self, _key: &ContextKey) -> Result<(), StorageError> {
        Ok(())
    }

    /// Backend name for logging
    fn backend(&self) -> &'static str;
}

/// Check the revision contract against the currently stored record.
pub fn check_revision(
    key: &ContextKey,
    stored: Option<&StoredContext>,
    incoming: &StoredContext,
) -> Result<(), StorageError> {
    let found = stored.map(|c| c.revision).unwrap_or(0);
    if found != incoming.revision {
        return Err(StorageError::Conflict {
            key: key.to_string(),
            expected: incoming.revision,
            found,
        });
    }
    Ok(())
}

/// Copy of `context` as it will be persisted by a successful save.
pub fn next_revision(context: &StoredContext, saved_at: DateTime<Utc>) -> StoredContext {
    let mut persisted = context.clone();
    persisted.revision = context.revision + 1;
    persisted.updated_at = saved_at;
    persisted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkflowContext;

    fn ctx(revision: u64) -> StoredContext {
        let mut c = WorkflowContext::new("w", 1, "a", None, None, serde_json::json!({}));
        c.revision = revision;
        c
    }

    #[test]
    fn test_missing_record_counts_as_zero() {
        let key = ContextKey::new("w", None, None);
        assert!(check_revision(&key, None, &ctx(0)).is_ok());
        assert!(matches!(
            check_revision(&key, None, &ctx(2)),
            Err(StorageError::Conflict { expected: 2, found: 0, .. })
        ));
    }

    #[test]
    fn test_stale_revision_conflicts() {
        let key = ContextKey::new("w", None, None);
        let stored = ctx(3);
        assert!(check_revision(&key, Some(&stored), &ctx(3)).is_ok());
        assert!(check_revision(&key, Some(&stored), &ctx(2)).is_err());
    }

    #[test]
    fn test_next_revision_bumps() {
        let now = Utc::now();
        let persisted = next_revision(&ctx(4), now);
        assert_eq!(persisted.revision, 5);
        assert_eq!(persisted.updated_at, now);
    }
}
