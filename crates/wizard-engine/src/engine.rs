//! Wizard engine: drives contexts through a workflow definition.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bus::{BoxError, EventBus, Subscription};
use crate::definition::WorkflowDefinition;
use crate::state::{from_stored, merge_patch, to_stored, WizardState};
use crate::step::TransformFn;
use crate::{Result, WizardError};
use wizard_core::{
    event_types, ContextKey, Event, NewTask, SaveReceipt, StateBag, StorageAdapter, Task,
    TaskQueue, TaskStatus, WorkflowContext,
};
use wizard_infra::{MemoryStorage, MemoryTaskQueue, TimeoutPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContextPayload<'a, S> {
    workflow_id: &'a str,
    context: &'a WorkflowContext<S>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StepPayload<'a, S> {
    workflow_id: &'a str,
    from: &'a str,
    to: &'a str,
    context: &'a WorkflowContext<S>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MigratedPayload<'a> {
    workflow_id: &'a str,
    key: String,
    from: u32,
    to: u32,
}

/// Executes one workflow definition against persisted contexts.
///
/// The engine is stateless between calls: every operation takes the
/// caller's context by reference and returns a fresh one on success, so a
/// failed transition never leaves a half-updated context behind. Storage,
/// queue and bus are injected and may be shared between engines.
pub struct WizardEngine<S: WizardState = StateBag> {
    definition: Arc<WorkflowDefinition<S>>,
    storage: Arc<dyn StorageAdapter>,
    queue: Arc<dyn TaskQueue>,
    bus: EventBus,
    timeouts: TimeoutPolicy,
}

impl<S: WizardState> WizardEngine<S> {
    /// Create an engine with volatile storage, an in-memory queue and a private bus
    pub fn new(definition: WorkflowDefinition<S>) -> Result<Self> {
        definition.validate()?;
        Ok(Self {
            definition: Arc::new(definition),
            storage: Arc::new(MemoryStorage::new()),
            queue: Arc::new(MemoryTaskQueue::new()),
            bus: EventBus::new(),
            timeouts: TimeoutPolicy::default(),
        })
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &WorkflowDefinition<S> {
        &self.definition
    }

    /// Bus the engine publishes lifecycle events on
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn storage_backend(&self) -> &'static str {
        self.storage.backend()
    }

    /// Subscribe to lifecycle events
    pub fn on<F>(&self, pattern: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Event) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.bus.on(pattern, handler)
    }

    /// Start a fresh context at the first step, replacing any stored draft
    pub async fn init(
        &self,
        tenant_id: Option<&str>,
        user_id: Option<&str>,
        seed: Option<S>,
    ) -> Result<WorkflowContext<S>> {
        let mut context = WorkflowContext::new(
            self.definition.id.as_str(),
            self.definition.version,
            self.definition.first_step(),
            tenant_id.map(str::to_string),
            user_id.map(str::to_string),
            seed.unwrap_or_default(),
        );

        let key = context.key();
        if let Some(existing) = self
            .timeouts
            .storage("storage.load", self.storage.load(&key))
            .await??
        {
            debug!(key = %key, revision = existing.revision, "Replacing existing draft");
            context.revision = existing.revision;
        }

        let context = self.persist(&context).await?.context;
        self.publish(
            event_types::WIZARD_INITIALIZED,
            &ContextPayload {
                workflow_id: self.id(),
                context: &context,
            },
        );

        info!(
            key = %key,
            step = %context.current_step,
            version = context.version,
            "Wizard initialized"
        );
        Ok(context)
    }

    /// Fetch the stored context, reconciling it with the current definition
    pub async fn load(
        &self,
        tenant_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Option<WorkflowContext<S>>> {
        let key = ContextKey::new(&self.definition.id, tenant_id, user_id);
        let Some(mut stored) = self
            .timeouts
            .storage("storage.load", self.storage.load(&key))
            .await??
        else {
            debug!(key = %key, "No stored context");
            return Ok(None);
        };

        let from = stored.version;
        let to = self.definition.version;
        let mut dirty = false;

        if from < to {
            for (version, migrate) in self.definition.migrations_from(from) {
                let state = std::mem::take(&mut stored.state);
                stored.state =
                    migrate(state).map_err(|reason| WizardError::Migration { version, reason })?;
                debug!(key = %key, version, "Applied state migration");
            }
            stored.version = to;
            dirty = true;
        } else if from > to {
            warn!(
                key = %key,
                stored_version = from,
                definition_version = to,
                "Stored context is newer than the definition; rewriting version only"
            );
            stored.version = to;
            dirty = true;
        }

        if !self.definition.contains(&stored.current_step) {
            warn!(
                key = %key,
                step = %stored.current_step,
                "Stored step no longer exists; resetting to first step"
            );
            stored.current_step = self.definition.first_step().to_string();
            dirty = true;
        }

        let mut context: WorkflowContext<S> = from_stored(stored)?;
        if dirty {
            context.touch();
            context = self.persist(&context).await?.context;
        }

        if from != to {
            self.publish(
                event_types::WIZARD_MIGRATED,
                &MigratedPayload {
                    workflow_id: self.id(),
                    key: key.to_string(),
                    from,
                    to,
                },
            );
            info!(key = %key, from, to, "Wizard context migrated");
        }

        self.publish(
            event_types::WIZARD_LOADED,
            &ContextPayload {
                workflow_id: self.id(),
                context: &context,
            },
        );
        Ok(Some(context))
    }

    /// Merge `patch` into the state and persist
    pub async fn save(
        &self,
        context: &WorkflowContext<S>,
        patch: &StateBag,
    ) -> Result<SaveReceipt<WorkflowContext<S>>> {
        let state = merge_patch(&context.state, patch)?;
        self.save_state(context, state).await
    }

    /// Replace the whole state and persist
    pub async fn save_state(
        &self,
        context: &WorkflowContext<S>,
        state: S,
    ) -> Result<SaveReceipt<WorkflowContext<S>>> {
        let mut updated = context.clone();
        updated.state = state;
        updated.touch();

        let receipt = self.persist(&updated).await?;
        self.publish(
            event_types::WIZARD_SAVED,
            &ContextPayload {
                workflow_id: self.id(),
                context: &receipt.context,
            },
        );

        debug!(
            key = %receipt.context.key(),
            revision = receipt.context.revision,
            "Wizard state saved"
        );
        Ok(receipt)
    }

    /// Validate the current step and move forward
    pub async fn next(&self, context: &WorkflowContext<S>) -> Result<WorkflowContext<S>> {
        self.transition(context, Direction::Forward).await
    }

    /// Move backward; the current step is not validated
    pub async fn prev(&self, context: &WorkflowContext<S>) -> Result<WorkflowContext<S>> {
        self.transition(context, Direction::Backward).await
    }

    /// Run the completion effect and discard the draft.
    ///
    /// Returns the finished context; it is no longer stored anywhere.
    pub async fn complete(&self, context: &WorkflowContext<S>) -> Result<WorkflowContext<S>> {
        if let Some(effect) = self.definition.completion() {
            self.timeouts
                .hook("on_complete", effect(context.clone()))
                .await?
                .map_err(|reason| WizardError::Hook {
                    hook: "on_complete".to_string(),
                    reason,
                })?;
        }

        let key = context.key();
        self.timeouts
            .storage("storage.clear", self.storage.clear(&key))
            .await??;

        self.publish(
            event_types::WIZARD_COMPLETED,
            &ContextPayload {
                workflow_id: self.id(),
                context,
            },
        );
        info!(key = %key, step = %context.current_step, "Wizard completed");
        Ok(context.clone())
    }

    /// Hand work off to a named queue
    pub async fn enqueue_task(
        &self,
        queue: &str,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<Task> {
        let task = self.queue.enqueue(NewTask::new(queue, name, payload)).await?;
        self.publish(event_types::TASK_QUEUED, &task);
        debug!(task_id = %task.id, queue = %task.queue, name = %task.name, "Task queued");
        Ok(task)
    }

    pub async fn list_tasks(&self, queue: &str, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        Ok(self.queue.list(queue, status).await?)
    }

    /// Record a worker's report on a task
    pub async fn update_task(&self, task: Task) -> Result<Task> {
        let task = self.queue.update(task).await?;
        let event_type = match task.status {
            TaskStatus::Done => event_types::TASK_DONE,
            TaskStatus::Failed => event_types::TASK_FAILED,
            TaskStatus::Pending | TaskStatus::Running => event_types::TASK_UPDATED,
        };
        self.publish(event_type, &task);
        Ok(task)
    }

    async fn transition(
        &self,
        context: &WorkflowContext<S>,
        direction: Direction,
    ) -> Result<WorkflowContext<S>> {
        let from = context.current_step.as_str();
        let (index, step) = self
            .definition
            .locate(from)
            .ok_or_else(|| WizardError::UnknownStep {
                step: from.to_string(),
            })?;

        if direction == Direction::Forward {
            if let Some(validate) = &step.validate {
                let verdict = self
                    .timeouts
                    .hook(&format!("{}.validate", from), validate(context))
                    .await?;
                if let Err(errors) = verdict {
                    debug!(step = %from, fields = errors.len(), "Validation rejected");
                    return Err(WizardError::ValidationRejected {
                        step: from.to_string(),
                        errors,
                    });
                }
            }
        }

        let mut working = context.clone();
        if let Some(on_exit) = &step.on_exit {
            working = self
                .run_transform(&format!("{}.on_exit", from), on_exit, working, context)
                .await?;
        }

        let target = match direction {
            Direction::Forward => self.definition.resolve_next(index, &working),
            Direction::Backward => self.definition.resolve_prev(index, &working),
        };
        let target_step =
            self.definition
                .get_step(&target)
                .ok_or_else(|| WizardError::UnknownStep {
                    step: target.clone(),
                })?;

        if let Some(guard) = &target_step.guard {
            let allowed = self
                .timeouts
                .hook(&format!("{}.guard", target), guard(&working))
                .await?;
            if !allowed {
                debug!(from = %from, to = %target, "Guard rejected transition");
                return Err(WizardError::GuardRejected { step: target });
            }
        }

        if let Some(on_enter) = &target_step.on_enter {
            working = self
                .run_transform(&format!("{}.on_enter", target), on_enter, working, context)
                .await?;
        }

        working.current_step = target.clone();
        working.touch();
        let working = self.persist(&working).await?.context;

        self.publish(
            event_types::WIZARD_STEP,
            &StepPayload {
                workflow_id: self.id(),
                from,
                to: &target,
                context: &working,
            },
        );

        info!(
            key = %working.key(),
            from = %from,
            to = %target,
            direction = ?direction,
            "Wizard step changed"
        );
        Ok(working)
    }

    async fn run_transform(
        &self,
        hook: &str,
        transform: &TransformFn<S>,
        working: WorkflowContext<S>,
        original: &WorkflowContext<S>,
    ) -> Result<WorkflowContext<S>> {
        let transformed = self.timeouts.hook(hook, transform(working)).await?;
        Ok(pin_identity(transformed, original))
    }

    async fn persist(&self, context: &WorkflowContext<S>) -> Result<SaveReceipt<WorkflowContext<S>>> {
        let stored = to_stored(context)?;
        let receipt = self
            .timeouts
            .storage("storage.save", self.storage.save(&stored))
            .await??;

        let mut persisted = context.clone();
        persisted.revision = receipt.context.revision;
        persisted.updated_at = receipt.context.updated_at;
        Ok(SaveReceipt {
            saved_at: receipt.saved_at,
            context: persisted,
        })
    }

    fn publish<T: Serialize>(&self, event_type: &str, payload: &T) {
        self.bus.emit(&Event::new(event_type, payload));
    }
}

/// Hooks may reshape state but never the identity a context is stored under.
fn pin_identity<S>(mut context: WorkflowContext<S>, original: &WorkflowContext<S>) -> WorkflowContext<S> {
    context.workflow_id = original.workflow_id.clone();
    context.tenant_id = original.tenant_id.clone();
    context.user_id = original.user_id.clone();
    context.version = original.version;
    context.revision = original.revision;
    context.created_at = original.created_at;
    context
}
