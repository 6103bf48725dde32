//! Wizard workflow engine
//!
//! Drives multi-step flows through a declared sequence of steps:
//! - Step transitions with validation, guards, and enter/exit hooks
//! - Progress persisted through a pluggable storage backend
//! - Optimistic concurrency on every write
//! - Per-version state migrations applied on load
//! - Task hand-off to a named queue
//! - In-process lifecycle events
//! - A registry and action dispatcher for request/response front ends

pub mod bus;
pub mod definition;
pub mod definitions;
pub mod engine;
pub mod registry;
pub mod state;
pub mod step;

pub use bus::{BoxError, EventBus, Subscription};
pub use definition::{MigrationFn, WorkflowDefinition};
pub use engine::WizardEngine;
pub use registry::{Scope, Wizard, WizardAction, WizardRef, WizardRegistry, WizardSummary};
pub use state::WizardState;
pub use step::{field_errors, FieldErrors, StepDeclaration, StepTarget};

pub use wizard_core::{
    event_types, ContextKey, Event, NewTask, SaveReceipt, StateBag, StoredContext, Task,
    TaskStatus, WorkflowContext,
};

use thiserror::Error;
use wizard_core::{QueueError, StorageError};
use wizard_infra::TimeoutError;

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("Validation failed on step '{step}'")]
    ValidationRejected { step: String, errors: FieldErrors },

    #[error("Guard rejected entry to step '{step}'")]
    GuardRejected { step: String },

    #[error("Unknown step: {step}")]
    UnknownStep { step: String },

    #[error("Unknown wizard: {0}")]
    UnknownWizard(String),

    #[error("No draft stored for {0}")]
    NoDraft(String),

    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    #[error("Migration to version {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Hook {hook} failed: {reason}")]
    Hook { hook: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WizardError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            WizardError::ValidationRejected { .. } => "validation_rejected",
            WizardError::GuardRejected { .. } => "guard_rejected",
            WizardError::UnknownStep { .. } => "unknown_step",
            WizardError::UnknownWizard(_) => "unknown_wizard",
            WizardError::NoDraft(_) => "no_draft",
            WizardError::InvalidDefinition(_) => "invalid_definition",
            WizardError::InvalidPatch(_) => "invalid_patch",
            WizardError::Migration { .. } => "migration_failed",
            WizardError::Hook { .. } => "hook_failed",
            WizardError::Storage(StorageError::Conflict { .. }) => "conflict",
            WizardError::Storage(_) => "storage_failure",
            WizardError::Queue(QueueError::NotFound(_)) => "task_not_found",
            WizardError::Queue(QueueError::Duplicate(_)) => "duplicate_task",
            WizardError::Queue(_) => "queue_failure",
            WizardError::Timeout(_) => "timeout",
            WizardError::Serialization(_) => "serialization",
        }
    }

    /// Whether the caller may retry from the same context after fixing input
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WizardError::ValidationRejected { .. }
                | WizardError::GuardRejected { .. }
                | WizardError::InvalidPatch(_)
                | WizardError::Storage(StorageError::Conflict { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, WizardError>;
