//! Registry of wizard engines and the action dispatcher used by front ends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bus::EventBus;
use crate::definition::WorkflowDefinition;
use crate::definitions;
use crate::engine::WizardEngine;
use crate::state::WizardState;
use crate::{Result, WizardError};
use wizard_core::{StateBag, StorageAdapter, Task, TaskQueue, TaskStatus, WorkflowContext};
use wizard_infra::TimeoutPolicy;

/// Tenant/user a context is scoped to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Scope {
    pub fn new(tenant_id: Option<String>, user_id: Option<String>) -> Self {
        Self { tenant_id, user_id }
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

/// Object-safe JSON facade over a [`WizardEngine`] of any state type.
#[async_trait]
pub trait Wizard: Send + Sync {
    fn id(&self) -> &str;

    fn version(&self) -> u32;

    fn steps(&self) -> Vec<String>;

    async fn init(&self, scope: &Scope, seed: Option<Value>) -> Result<Value>;

    async fn load(&self, scope: &Scope) -> Result<Option<Value>>;

    /// Load (or start) the draft and merge `patch` into it
    async fn save(&self, scope: &Scope, patch: StateBag) -> Result<Value>;

    async fn next(&self, scope: &Scope) -> Result<Value>;

    async fn prev(&self, scope: &Scope) -> Result<Value>;

    /// Finish the draft; returns the final context, which is no longer stored
    async fn complete(&self, scope: &Scope) -> Result<Value>;

    async fn enqueue(&self, queue: &str, name: &str, payload: Value) -> Result<Task>;
}

impl<S: WizardState> WizardEngine<S> {
    async fn draft(&self, scope: &Scope) -> Result<WorkflowContext<S>> {
        WizardEngine::load(self, scope.tenant(), scope.user())
            .await?
            .ok_or_else(|| WizardError::NoDraft(self.draft_label(scope)))
    }

    fn draft_label(&self, scope: &Scope) -> String {
        wizard_core::ContextKey::new(self.id(), scope.tenant(), scope.user()).to_string()
    }
}

#[async_trait]
impl<S: WizardState> Wizard for WizardEngine<S> {
    fn id(&self) -> &str {
        WizardEngine::id(self)
    }

    fn version(&self) -> u32 {
        self.definition().version
    }

    fn steps(&self) -> Vec<String> {
        self.definition().step_ids()
    }

    async fn init(&self, scope: &Scope, seed: Option<Value>) -> Result<Value> {
        let seed: Option<S> = match seed {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value(value).map_err(|e| WizardError::InvalidPatch(e.to_string()))?,
            ),
        };
        let context = WizardEngine::init(self, scope.tenant(), scope.user(), seed).await?;
        Ok(serde_json::to_value(context)?)
    }

    async fn load(&self, scope: &Scope) -> Result<Option<Value>> {
        match WizardEngine::load(self, scope.tenant(), scope.user()).await? {
            Some(context) => Ok(Some(serde_json::to_value(context)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, scope: &Scope, patch: StateBag) -> Result<Value> {
        let context = match WizardEngine::load(self, scope.tenant(), scope.user()).await? {
            Some(context) => context,
            None => WizardEngine::init(self, scope.tenant(), scope.user(), None).await?,
        };
        let receipt = WizardEngine::save(self, &context, &patch).await?;
        Ok(serde_json::to_value(receipt)?)
    }

    async fn next(&self, scope: &Scope) -> Result<Value> {
        let context = self.draft(scope).await?;
        let moved = WizardEngine::next(self, &context).await?;
        Ok(serde_json::to_value(moved)?)
    }

    async fn prev(&self, scope: &Scope) -> Result<Value> {
        let context = self.draft(scope).await?;
        let moved = WizardEngine::prev(self, &context).await?;
        Ok(serde_json::to_value(moved)?)
    }

    async fn complete(&self, scope: &Scope) -> Result<Value> {
        let context = self.draft(scope).await?;
        let finished = WizardEngine::complete(self, &context).await?;
        Ok(serde_json::to_value(finished)?)
    }

    async fn enqueue(&self, queue: &str, name: &str, payload: Value) -> Result<Task> {
        self.enqueue_task(queue, name, payload).await
    }
}

/// Which wizard, and for whom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardRef {
    pub wizard_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl WizardRef {
    pub fn new(wizard_id: impl Into<String>) -> Self {
        Self {
            wizard_id: wizard_id.into(),
            tenant_id: None,
            user_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.tenant_id.clone(), self.user_id.clone())
    }
}

/// Request accepted by [`WizardRegistry::dispatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WizardAction {
    Init {
        #[serde(flatten)]
        wizard: WizardRef,
        #[serde(default)]
        seed: Option<Value>,
    },
    Load {
        #[serde(flatten)]
        wizard: WizardRef,
    },
    Save {
        #[serde(flatten)]
        wizard: WizardRef,
        patch: StateBag,
    },
    Next {
        #[serde(flatten)]
        wizard: WizardRef,
    },
    Prev {
        #[serde(flatten)]
        wizard: WizardRef,
    },
    Complete {
        #[serde(flatten)]
        wizard: WizardRef,
    },
    Enqueue {
        wizard_id: String,
        queue: String,
        name: String,
        #[serde(default)]
        payload: Value,
    },
    Tasks {
        queue: String,
        #[serde(default)]
        status: Option<TaskStatus>,
    },
}

impl WizardAction {
    pub fn name(&self) -> &'static str {
        match self {
            WizardAction::Init { .. } => "init",
            WizardAction::Load { .. } => "load",
            WizardAction::Save { .. } => "save",
            WizardAction::Next { .. } => "next",
            WizardAction::Prev { .. } => "prev",
            WizardAction::Complete { .. } => "complete",
            WizardAction::Enqueue { .. } => "enqueue",
            WizardAction::Tasks { .. } => "tasks",
        }
    }
}

/// Short description of a registered wizard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardSummary {
    pub id: String,
    pub version: u32,
    pub steps: Vec<String>,
}

/// Wizards available to a front end, built once at start-up.
///
/// Engines registered through the registry share its storage, queue, bus
/// and deadlines.
pub struct WizardRegistry {
    wizards: HashMap<String, Arc<dyn Wizard>>,
    storage: Arc<dyn StorageAdapter>,
    queue: Arc<dyn TaskQueue>,
    bus: EventBus,
    timeouts: TimeoutPolicy,
}

impl WizardRegistry {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        queue: Arc<dyn TaskQueue>,
        bus: EventBus,
        timeouts: TimeoutPolicy,
    ) -> Self {
        Self {
            wizards: HashMap::new(),
            storage,
            queue,
            bus,
            timeouts,
        }
    }

    /// Registry holding the company-setup, order-intake and finance-foundation wizards
    pub fn with_builtin(
        storage: Arc<dyn StorageAdapter>,
        queue: Arc<dyn TaskQueue>,
        bus: EventBus,
        timeouts: TimeoutPolicy,
    ) -> Result<Self> {
        let mut registry = Self::new(storage, queue, bus, timeouts);
        registry.register_definition(definitions::company_setup())?;
        registry.register_definition(definitions::order_intake())?;
        registry.register_definition(definitions::finance_foundation())?;
        Ok(registry)
    }

    /// Build an engine for `definition` on the shared backends and register it
    pub fn register_definition<S: WizardState>(
        &mut self,
        definition: WorkflowDefinition<S>,
    ) -> Result<()> {
        let engine = WizardEngine::new(definition)?
            .with_storage(Arc::clone(&self.storage))
            .with_queue(Arc::clone(&self.queue))
            .with_bus(self.bus.clone())
            .with_timeouts(self.timeouts.clone());
        self.register(Arc::new(engine))
    }

    pub fn register(&mut self, wizard: Arc<dyn Wizard>) -> Result<()> {
        let id = wizard.id().to_string();
        if self.wizards.contains_key(&id) {
            return Err(WizardError::InvalidDefinition(format!(
                "Wizard '{}' is already registered",
                id
            )));
        }

        info!(wizard_id = %id, version = wizard.version(), "Wizard registered");
        self.wizards.insert(id, wizard);
        Ok(())
    }

    pub fn get(&self, wizard_id: &str) -> Result<Arc<dyn Wizard>> {
        self.wizards
            .get(wizard_id)
            .cloned()
            .ok_or_else(|| WizardError::UnknownWizard(wizard_id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.wizards.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn describe(&self) -> Vec<WizardSummary> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.wizards.get(&id))
            .map(|w| WizardSummary {
                id: w.id().to_string(),
                version: w.version(),
                steps: w.steps(),
            })
            .collect()
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn storage_backend(&self) -> &'static str {
        self.storage.backend()
    }

    /// Execute one action and return its JSON result
    pub async fn dispatch(&self, action: WizardAction) -> Result<Value> {
        debug!(action = action.name(), "Dispatching wizard action");

        match action {
            WizardAction::Init { wizard, seed } => {
                self.get(&wizard.wizard_id)?.init(&wizard.scope(), seed).await
            }
            WizardAction::Load { wizard } => Ok(self
                .get(&wizard.wizard_id)?
                .load(&wizard.scope())
                .await?
                .unwrap_or(Value::Null)),
            WizardAction::Save { wizard, patch } => {
                self.get(&wizard.wizard_id)?.save(&wizard.scope(), patch).await
            }
            WizardAction::Next { wizard } => self.get(&wizard.wizard_id)?.next(&wizard.scope()).await,
            WizardAction::Prev { wizard } => self.get(&wizard.wizard_id)?.prev(&wizard.scope()).await,
            WizardAction::Complete { wizard } => {
                let context = self.get(&wizard.wizard_id)?.complete(&wizard.scope()).await?;
                Ok(json!({ "wizardId": wizard.wizard_id, "completed": true, "context": context }))
            }
            WizardAction::Enqueue {
                wizard_id,
                queue,
                name,
                payload,
            } => {
                let task = self.get(&wizard_id)?.enqueue(&queue, &name, payload).await?;
                Ok(serde_json::to_value(task)?)
            }
            WizardAction::Tasks { queue, status } => {
                let tasks = self.queue.list(&queue, status).await?;
                Ok(serde_json::to_value(tasks)?)
            }
        }
    }
}
