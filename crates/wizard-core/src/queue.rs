//! Task queue abstraction.

use async_trait::async_trait;

use crate::error::QueueError;
use crate::task::{NewTask, Task, TaskStatus};

/// Holds tasks grouped by named queues.
///
/// Queues do bookkeeping only; workers poll `list(queue, Some(Pending))`,
/// do the work, and report back through `update`.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Add a task as PENDING with zero attempts
    async fn enqueue(&self, task: NewTask) -> Result<Task, QueueError>;

    /// Store a new status/outcome for an existing task
    async fn update(&self, task: Task) -> Result<Task, QueueError>;

    /// Fetch a task by id
    async fn get(&self, id: &str) -> Result<Option<Task>, QueueError>;

    /// Tasks of a queue, oldest first, optionally filtered by status
    async fn list(&self, queue: &str, status: Option<TaskStatus>) -> Result<Vec<Task>, QueueError>;
}
