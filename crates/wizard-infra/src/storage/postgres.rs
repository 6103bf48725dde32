//! Relational storage backend
//!
//! One row per (workflow, tenant, user) with the state kept as JSONB.
//! If the pool cannot be created or the table cannot be ensured, the backend
//! is marked not ready and every call is served by an internal
//! [`MemoryStorage`] instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::{debug, info, warn};

use wizard_core::{
    ContextKey, SaveReceipt, StorageAdapter, StorageConfig, StorageError, StoredContext,
    DEFAULT_TENANT, DEFAULT_USER,
};

use super::memory::MemoryStorage;

/// Table layout; uniqueness is enforced on the key triple.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS wizard_contexts (
    workflow_id  TEXT        NOT NULL,
    tenant_id    TEXT        NOT NULL,
    user_id      TEXT        NOT NULL,
    version      INTEGER     NOT NULL,
    current_step TEXT        NOT NULL,
    state        JSONB       NOT NULL DEFAULT '{}'::jsonb,
    revision     BIGINT      NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL,
    updated_at   TIMESTAMPTZ NOT NULL,
    UNIQUE (workflow_id, tenant_id, user_id)
)
"#;

#[derive(Debug, FromRow)]
struct ContextRow {
    workflow_id: String,
    tenant_id: String,
    user_id: String,
    version: i32,
    current_step: String,
    state: serde_json::Value,
    revision: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ContextRow {
    fn into_context(self) -> Result<StoredContext, StorageError> {
        Ok(StoredContext {
            workflow_id: self.workflow_id,
            tenant_id: (self.tenant_id != DEFAULT_TENANT).then_some(self.tenant_id),
            user_id: (self.user_id != DEFAULT_USER).then_some(self.user_id),
            state: self.state,
            version: from_column("version", self.version)?,
            current_step: self.current_step,
            revision: from_column("revision", self.revision)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Convert an unsigned counter into its signed column type
fn to_column<T, C>(column: &str, value: T) -> Result<C, StorageError>
where
    T: Copy + std::fmt::Display,
    C: TryFrom<T>,
{
    C::try_from(value).map_err(|_| {
        StorageError::Backend(format!("{} {} does not fit the {} column", column, value, column))
    })
}

/// Read a signed column back into its unsigned counter
fn from_column<C, T>(column: &str, value: C) -> Result<T, StorageError>
where
    C: Copy + std::fmt::Display,
    T: TryFrom<C>,
{
    T::try_from(value)
        .map_err(|_| StorageError::Backend(format!("stored {} {} is out of range", column, value)))
}

/// Postgres-backed storage with in-memory fallback
pub struct PostgresStorage {
    pool: Option<PgPool>,
    fallback: MemoryStorage,
}

impl PostgresStorage {
    /// Connect using the storage configuration.
    ///
    /// Never fails: connection or schema errors leave the backend not ready.
    pub async fn connect(config: &StorageConfig) -> Self {
        let Some(url) = config.database_url.as_deref() else {
            warn!("No database_url configured, relational storage falls back to memory");
            return Self::unready();
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await;

        match pool {
            Ok(pool) => Self::from_pool(pool).await,
            Err(e) => {
                warn!(error = %e, "Database connection failed, relational storage falls back to memory");
                Self::unready()
            }
        }
    }

    /// Wrap an existing pool, ensuring the table exists
    pub async fn from_pool(pool: PgPool) -> Self {
        match sqlx::query(SCHEMA).execute(&pool).await {
            Ok(_) => {
                info!("Relational wizard storage ready");
                Self {
                    pool: Some(pool),
                    fallback: MemoryStorage::new(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not ensure wizard_contexts table, falling back to memory");
                Self::unready()
            }
        }
    }

    fn unready() -> Self {
        Self {
            pool: None,
            fallback: MemoryStorage::new(),
        }
    }

    /// Whether calls reach the database
    pub fn is_ready(&self) -> bool {
        self.pool.is_some()
    }

    async fn stored_revision(pool: &PgPool, key: &ContextKey) -> Result<u64, StorageError> {
        let revision: Option<i64> = sqlx::query_scalar(
            "SELECT revision FROM wizard_contexts WHERE workflow_id = $1 AND tenant_id = $2 AND user_id = $3",
        )
        .bind(&key.workflow_id)
        .bind(&key.tenant_id)
        .bind(&key.user_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?;

        revision.map_or(Ok(0), |r| from_column("revision", r))
    }
}

fn db_error(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

#[async_trait]
impl StorageAdapter for PostgresStorage {
    async fn save(&self, context: &StoredContext) -> Result<SaveReceipt, StorageError> {
        let Some(pool) = &self.pool else {
            return self.fallback.save(context).await;
        };

        let key = context.key();
        let saved_at = Utc::now();
        let new_revision = context.revision + 1;
        let version: i32 = to_column("version", context.version)?;
        let revision: i64 = to_column("revision", context.revision)?;
        let next_revision: i64 = to_column("revision", new_revision)?;

        let rows = if context.revision == 0 {
            sqlx::query(
                r#"
                INSERT INTO wizard_contexts
                    (workflow_id, tenant_id, user_id, version, current_step, state,
                     revision, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (workflow_id, tenant_id, user_id) DO NOTHING
                "#,
            )
            .bind(&key.workflow_id)
            .bind(&key.tenant_id)
            .bind(&key.user_id)
            .bind(version)
            .bind(&context.current_step)
            .bind(&context.state)
            .bind(next_revision)
            .bind(context.created_at)
            .bind(saved_at)
            .execute(pool)
            .await
            .map_err(db_error)?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE wizard_contexts
                SET version = $4,
                    current_step = $5,
                    state = $6,
                    revision = $7,
                    updated_at = $8,
                    created_at = $10
                WHERE workflow_id = $1 AND tenant_id = $2 AND user_id = $3
                  AND revision = $9
                "#,
            )
            .bind(&key.workflow_id)
            .bind(&key.tenant_id)
            .bind(&key.user_id)
            .bind(version)
            .bind(&context.current_step)
            .bind(&context.state)
            .bind(next_revision)
            .bind(saved_at)
            .bind(revision)
            .bind(context.created_at)
            .execute(pool)
            .await
            .map_err(db_error)?
            .rows_affected()
        };

        if rows == 0 {
            let found = Self::stored_revision(pool, &key).await?;
            return Err(StorageError::Conflict {
                key: key.to_string(),
                expected: context.revision,
                found,
            });
        }

        debug!(key = %key, revision = new_revision, "Upserted context row");

        let mut persisted = context.clone();
        persisted.revision = new_revision;
        persisted.updated_at = saved_at;
        Ok(SaveReceipt {
            saved_at,
            context: persisted,
        })
    }

    async fn load(&self, key: &ContextKey) -> Result<Option<StoredContext>, StorageError> {
        let Some(pool) = &self.pool else {
            return self.fallback.load(key).await;
        };

        let row = sqlx::query_as::<_, ContextRow>(
            r#"
            SELECT workflow_id, tenant_id, user_id, version, current_step, state,
                   revision, created_at, updated_at
            FROM wizard_contexts
            WHERE workflow_id = $1 AND tenant_id = $2 AND user_id = $3
            "#,
        )
        .bind(&key.workflow_id)
        .bind(&key.tenant_id)
        .bind(&key.user_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?;

        row.map(ContextRow::into_context).transpose()
    }

    async fn clear(&self, key: &ContextKey) -> Result<(), StorageError> {
        let Some(pool) = &self.pool else {
            return self.fallback.clear(key).await;
        };

        sqlx::query(
            "DELETE FROM wizard_contexts WHERE workflow_id = $1 AND tenant_id = $2 AND user_id = $3",
        )
        .bind(&key.workflow_id)
        .bind(&key.tenant_id)
        .bind(&key.user_id)
        .execute(pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    fn backend(&self) -> &'static str {
        if self.is_ready() {
            "postgres"
        } else {
            "postgres-fallback"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wizard_core::WorkflowContext;

    #[tokio::test]
    async fn test_missing_url_falls_back_to_memory() {
        let mut config = StorageConfig::postgres("unused");
        config.database_url = None;

        let storage = PostgresStorage::connect(&config).await;
        assert!(!storage.is_ready());
        assert_eq!(storage.backend(), "postgres-fallback");

        let ctx = WorkflowContext::new("w", 1, "a", None, None, serde_json::json!({"x": 1}));
        storage.save(&ctx).await.unwrap();
        let loaded = storage.load(&ctx.key()).await.unwrap().unwrap();
        assert_eq!(loaded.state["x"], 1);

        storage.clear(&ctx.key()).await.unwrap();
        assert!(storage.load(&ctx.key()).await.unwrap().is_none());
    }

    #[test]
    fn test_row_maps_sentinels_back_to_none() {
        let now = Utc::now();
        let row = ContextRow {
            workflow_id: "w".to_string(),
            tenant_id: DEFAULT_TENANT.to_string(),
            user_id: "u-9".to_string(),
            version: 2,
            current_step: "b".to_string(),
            state: serde_json::json!({}),
            revision: 7,
            created_at: now,
            updated_at: now,
        };

        let ctx = row.into_context().unwrap();
        assert_eq!(ctx.tenant_id, None);
        assert_eq!(ctx.user_id.as_deref(), Some("u-9"));
        assert_eq!(ctx.version, 2);
        assert_eq!(ctx.revision, 7);
    }

    #[test]
    fn test_out_of_range_counters_are_rejected() {
        let too_big: Result<i32, _> = to_column("version", u32::MAX);
        assert!(matches!(too_big, Err(StorageError::Backend(_))));
        let fits: i32 = to_column("version", 7u32).unwrap();
        assert_eq!(fits, 7);

        let now = Utc::now();
        let row = ContextRow {
            workflow_id: "w".to_string(),
            tenant_id: DEFAULT_TENANT.to_string(),
            user_id: DEFAULT_USER.to_string(),
            version: -1,
            current_step: "a".to_string(),
            state: serde_json::json!({}),
            revision: 1,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(row.into_context(), Err(StorageError::Backend(_))));
    }

    #[tokio::test]
    #[ignore]
    async fn test_replaced_draft_takes_new_created_at() {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql:///wizard_test".to_string());
        let pool = PgPool::connect(&database_url).await.unwrap();
        let storage = PostgresStorage::from_pool(pool).await;
        assert!(storage.is_ready());

        let first = WorkflowContext::new(
            "pg-replace",
            1,
            "a",
            Some("t".to_string()),
            None,
            serde_json::json!({}),
        );
        storage.clear(&first.key()).await.unwrap();
        let saved = storage.save(&first).await.unwrap().context;

        let mut fresh = WorkflowContext::new(
            "pg-replace",
            1,
            "a",
            Some("t".to_string()),
            None,
            serde_json::json!({}),
        );
        fresh.created_at = saved.created_at + chrono::Duration::seconds(60);
        fresh.revision = saved.revision;
        storage.save(&fresh).await.unwrap();

        let loaded = storage.load(&fresh.key()).await.unwrap().unwrap();
        assert_eq!(loaded.created_at.timestamp(), fresh.created_at.timestamp());
        storage.clear(&fresh.key()).await.unwrap();
    }
}
