//! Persisted progress of one wizard run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant sentinel used when a context is not scoped to a tenant.
pub const DEFAULT_TENANT: &str = "tenant";

/// User sentinel used when a context is not scoped to a user.
pub const DEFAULT_USER: &str = "user";

/// Untyped state bag for wizards without a concrete state type.
pub type StateBag = serde_json::Map<String, serde_json::Value>;

/// Context as seen by storage backends: state is carried as opaque JSON.
pub type StoredContext = WorkflowContext<serde_json::Value>;

/// Progress record for one (workflow, tenant, user) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowContext<S> {
    /// Workflow definition this context belongs to
    pub workflow_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Caller business data, opaque to the engine
    pub state: S,
    /// Definition version this context was last reconciled against
    pub version: u32,
    /// Step the context is positioned at
    pub current_step: String,
    /// Optimistic-concurrency token, bumped by every successful save
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<S> WorkflowContext<S> {
    /// Create a fresh context positioned at `first_step`
    pub fn new(
        workflow_id: impl Into<String>,
        version: u32,
        first_step: impl Into<String>,
        tenant_id: Option<String>,
        user_id: Option<String>,
        state: S,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            tenant_id,
            user_id,
            state,
            version,
            current_step: first_step.into(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Storage key for this context
    pub fn key(&self) -> ContextKey {
        ContextKey::new(
            &self.workflow_id,
            self.tenant_id.as_deref(),
            self.user_id.as_deref(),
        )
    }

    /// Replace the state, keeping every other field
    pub fn map_state<T>(self, f: impl FnOnce(S) -> T) -> WorkflowContext<T> {
        WorkflowContext {
            workflow_id: self.workflow_id,
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            state: f(self.state),
            version: self.version,
            current_step: self.current_step,
            revision: self.revision,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Stamp `updated_at` with the current time
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Identity under which a context is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey {
    pub workflow_id: String,
    pub tenant_id: String,
    pub user_id: String,
}

impl ContextKey {
    /// Build a key, substituting sentinels for missing tenant/user
    pub fn new(workflow_id: &str, tenant_id: Option<&str>, user_id: Option<&str>) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            tenant_id: tenant_id.unwrap_or(DEFAULT_TENANT).to_string(),
            user_id: user_id.unwrap_or(DEFAULT_USER).to_string(),
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wizard:{}:{}:{}",
            self.workflow_id, self.tenant_id, self.user_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_uses_sentinels() {
        let key = ContextKey::new("company-setup", None, None);
        assert_eq!(key.tenant_id, DEFAULT_TENANT);
        assert_eq!(key.user_id, DEFAULT_USER);
        assert_eq!(key.to_string(), "wizard:company-setup:tenant:user");
    }

    #[test]
    fn test_context_key_matches_scope() {
        let ctx = WorkflowContext::new(
            "order-intake",
            1,
            "customer",
            Some("acme".to_string()),
            Some("u-1".to_string()),
            StateBag::new(),
        );

        assert_eq!(ctx.key(), ContextKey::new("order-intake", Some("acme"), Some("u-1")));
        assert_eq!(ctx.revision, 0);
        assert_eq!(ctx.created_at, ctx.updated_at);
    }

    #[test]
    fn test_serializes_camel_case() {
        let ctx = WorkflowContext::new("w", 3, "a", None, None, serde_json::json!({"k": 1}));
        let value = serde_json::to_value(&ctx).unwrap();

        assert_eq!(value["workflowId"], "w");
        assert_eq!(value["currentStep"], "a");
        assert_eq!(value["version"], 3);
        assert_eq!(value["state"]["k"], 1);
    }

    #[test]
    fn test_map_state_keeps_identity() {
        let ctx = WorkflowContext::new("w", 1, "a", None, None, 5u32);
        let mapped = ctx.clone().map_state(|n| n.to_string());

        assert_eq!(mapped.state, "5");
        assert_eq!(mapped.current_step, ctx.current_step);
        assert_eq!(mapped.created_at, ctx.created_at);
    }
}
