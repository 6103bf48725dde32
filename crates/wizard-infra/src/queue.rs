//! In-process task queue
//!
//! Bookkeeping only: tasks are stored with their status and handed back to
//! whoever lists them. Nothing here executes, retries, or schedules work.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use wizard_core::{NewTask, QueueError, Task, TaskQueue, TaskStatus};

#[derive(Default)]
struct QueueState {
    /// Task id -> (insertion sequence, task)
    tasks: HashMap<String, (u64, Task)>,
    next_seq: u64,
}

/// Map-backed task queue
#[derive(Clone, Default)]
pub struct MemoryTaskQueue {
    state: Arc<RwLock<QueueState>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks across all queues
    pub async fn len(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.tasks.is_empty()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: NewTask) -> Result<Task, QueueError> {
        let now = Utc::now();
        let task = Task {
            id: task
                .id
                .unwrap_or_else(|| format!("task_{}", Uuid::new_v4().simple())),
            queue: task.queue,
            name: task.name,
            payload: task.payload,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            attempts: 0,
            error: None,
        };

        let mut state = self.state.write().await;
        if state.tasks.contains_key(&task.id) {
            return Err(QueueError::Duplicate(task.id));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.tasks.insert(task.id.clone(), (seq, task.clone()));

        debug!(task_id = %task.id, queue = %task.queue, name = %task.name, "Task enqueued");
        Ok(task)
    }

    async fn update(&self, task: Task) -> Result<Task, QueueError> {
        let mut state = self.state.write().await;
        let (_, stored) = state
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| QueueError::NotFound(task.id.clone()))?;

        // Identity and creation time stay as enqueued
        stored.name = task.name;
        stored.payload = task.payload;
        stored.status = task.status;
        stored.attempts = task.attempts;
        stored.error = task.error;
        stored.updated_at = Utc::now();

        debug!(task_id = %stored.id, status = %stored.status, "Task updated");
        Ok(stored.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Task>, QueueError> {
        let state = self.state.read().await;
        Ok(state.tasks.get(id).map(|(_, task)| task.clone()))
    }

    async fn list(&self, queue: &str, status: Option<TaskStatus>) -> Result<Vec<Task>, QueueError> {
        let state = self.state.read().await;
        let mut tasks: Vec<_> = state
            .tasks
            .values()
            .filter(|(_, t)| t.queue == queue)
            .filter(|(_, t)| status.map_or(true, |s| t.status == s))
            .collect();

        tasks.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at.cmp(&b.created_at).then(seq_a.cmp(seq_b))
        });

        Ok(tasks.into_iter().map(|(_, t)| t.clone()).collect())
    }
}
