//! Workflow definitions: the script a wizard engine executes.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::state::WizardState;
use crate::step::{StepDeclaration, StepTarget};
use crate::{Result, WizardError};
use wizard_core::WorkflowContext;

/// Effect run by `complete`.
pub type CompleteFn<S> =
    Arc<dyn Fn(WorkflowContext<S>) -> BoxFuture<'static, std::result::Result<(), String>> + Send + Sync>;

/// Reshapes stored state from version `n - 1` to version `n`.
pub type MigrationFn =
    Arc<dyn Fn(serde_json::Value) -> std::result::Result<serde_json::Value, String> + Send + Sync>;

/// A named, versioned list of steps.
pub struct WorkflowDefinition<S> {
    pub id: String,
    pub name: String,
    /// Bumped whenever the step shape changes incompatibly with stored contexts
    pub version: u32,
    steps: Vec<StepDeclaration<S>>,
    first_step: Option<String>,
    on_complete: Option<CompleteFn<S>>,
    /// Target version -> migration into it
    migrations: BTreeMap<u32, MigrationFn>,
}

impl<S> fmt::Debug for WorkflowDefinition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("steps", &self.steps)
            .field("first_step", &self.first_step)
            .field("migrations", &self.migrations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<S: WizardState> WorkflowDefinition<S> {
    pub fn new(id: impl Into<String>, version: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version,
            steps: Vec::new(),
            first_step: None,
            on_complete: None,
            migrations: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a step
    pub fn step(mut self, step: StepDeclaration<S>) -> Self {
        self.steps.push(step);
        self
    }

    /// Start somewhere other than the first declared step
    pub fn with_first_step(mut self, step: impl Into<String>) -> Self {
        self.first_step = Some(step.into());
        self
    }

    pub fn on_complete<F, Fut>(mut self, effect: F) -> Self
    where
        F: Fn(WorkflowContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), String>> + Send + 'static,
    {
        self.on_complete = Some(Arc::new(
            move |ctx: WorkflowContext<S>| -> BoxFuture<'static, std::result::Result<(), String>> {
                effect(ctx).boxed()
            },
        ));
        self
    }

    /// Register the state migration that produces `to_version`
    pub fn migration<F>(mut self, to_version: u32, migrate: F) -> Self
    where
        F: Fn(serde_json::Value) -> std::result::Result<serde_json::Value, String>
            + Send
            + Sync
            + 'static,
    {
        self.migrations.insert(to_version, Arc::new(migrate));
        self
    }

    /// Check the definition is internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(WizardError::InvalidDefinition(format!(
                "Workflow '{}' has no steps",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(WizardError::InvalidDefinition(format!(
                    "Duplicate step id '{}' in workflow '{}'",
                    step.id, self.id
                )));
            }
        }

        if let Some(first) = &self.first_step {
            if !seen.contains(first.as_str()) {
                return Err(WizardError::InvalidDefinition(format!(
                    "First step '{}' is not declared",
                    first
                )));
            }
        }

        for step in &self.steps {
            for target in step.literal_targets() {
                if !seen.contains(target) {
                    return Err(WizardError::InvalidDefinition(format!(
                        "Step '{}' targets undeclared step '{}'",
                        step.id, target
                    )));
                }
            }
        }

        if let Some(&highest) = self.migrations.keys().next_back() {
            if highest > self.version {
                return Err(WizardError::InvalidDefinition(format!(
                    "Migration to version {} exceeds definition version {}",
                    highest, self.version
                )));
            }
        }

        Ok(())
    }

    pub fn steps(&self) -> &[StepDeclaration<S>] {
        &self.steps
    }

    pub fn step_ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    /// Step a fresh context starts at
    pub fn first_step(&self) -> &str {
        match &self.first_step {
            Some(id) => id,
            None => self.steps.first().map(|s| s.id.as_str()).unwrap_or_default(),
        }
    }

    pub fn get_step(&self, id: &str) -> Option<&StepDeclaration<S>> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get_step(id).is_some()
    }

    pub(crate) fn locate(&self, id: &str) -> Option<(usize, &StepDeclaration<S>)> {
        self.steps.iter().enumerate().find(|(_, s)| s.id == id)
    }

    /// Forward target of the step at `index`; the last step targets itself
    pub(crate) fn resolve_next(&self, index: usize, ctx: &WorkflowContext<S>) -> String {
        let step = &self.steps[index];
        match &step.next {
            StepTarget::Computed(resolve) => resolve(ctx),
            StepTarget::Step(id) => id.clone(),
            StepTarget::Positional => self
                .steps
                .get(index + 1)
                .unwrap_or(step)
                .id
                .clone(),
        }
    }

    /// Backward target of the step at `index`; the first step targets itself
    pub(crate) fn resolve_prev(&self, index: usize, ctx: &WorkflowContext<S>) -> String {
        let step = &self.steps[index];
        match &step.prev {
            StepTarget::Computed(resolve) => resolve(ctx),
            StepTarget::Step(id) => id.clone(),
            StepTarget::Positional => index
                .checked_sub(1)
                .map(|i| self.steps[i].id.clone())
                .unwrap_or_else(|| step.id.clone()),
        }
    }

    pub(crate) fn completion(&self) -> Option<&CompleteFn<S>> {
        self.on_complete.as_ref()
    }

    /// Migrations to apply, in order, to bring `from` up to the current version
    pub(crate) fn migrations_from(&self, from: u32) -> impl Iterator<Item = (u32, &MigrationFn)> {
        let start = from.saturating_add(1);
        (start <= self.version)
            .then(|| self.migrations.range(start..=self.version))
            .into_iter()
            .flatten()
            .map(|(v, f)| (*v, f))
    }
}
