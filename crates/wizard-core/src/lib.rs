pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod queue;
pub mod storage;
pub mod task;

pub use crate::config::{ServerConfig, StorageBackend, StorageConfig, TimeoutConfig, WizardConfig};
pub use context::{ContextKey, StateBag, StoredContext, WorkflowContext, DEFAULT_TENANT, DEFAULT_USER};
pub use error::{QueueError, StorageError};
pub use events::{event_types, Event};
pub use queue::TaskQueue;
pub use storage::{SaveReceipt, StorageAdapter};
pub use task::{NewTask, Task, TaskStatus};
