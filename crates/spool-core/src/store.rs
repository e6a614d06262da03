//! Task store: the canonical id -> task map plus per-status counters.
//!
//! Design:
//! - Map and metrics live behind one `RwLock`, so every write updates both
//!   as a single step and every read sees them agree.
//! - Readers run concurrently; writers are exclusive.
//! - Callers only ever receive clones; nothing hands out references into the
//!   map.
//! - Tasks are never removed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::TaskId;
use crate::observability::Metrics;
use crate::queue::{Task, TaskStatus};

#[derive(Default)]
struct StoreState {
    tasks: HashMap<TaskId, Task>,
    metrics: Metrics,
}

impl StoreState {
    /// Upsert that keeps the counters in step with the map.
    fn put(&mut self, mut task: Task) -> Task {
        let previous = self
            .tasks
            .get(&task.id)
            .map(|t| (t.created_at, t.updated_at, t.status));

        match previous {
            Some((created_at, updated_at, status)) => {
                task.created_at = created_at;
                task.updated_at = refreshed(updated_at.max(created_at));
                self.metrics.transition(status, task.status);
            }
            None => {
                task.updated_at = refreshed(task.created_at);
                self.metrics.increment(task.status);
            }
        }

        self.tasks.insert(task.id.clone(), task.clone());
        task
    }
}

/// Current time, never earlier than `floor`.
fn refreshed(floor: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(floor)
}

#[derive(Default)]
pub struct TaskStore {
    state: RwLock<StoreState>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite.
    ///
    /// A new task is counted once under its status (`queued` for anything
    /// fresh from submission). Overwriting keeps the original `created_at`
    /// and moves the counters if the status changed.
    pub async fn save(&self, task: Task) -> Task {
        self.state.write().await.put(task)
    }

    /// Insert only if the id is unknown. On collision the existing record is
    /// returned untouched.
    pub async fn insert_new(&self, task: Task) -> Result<Task, Task> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.tasks.get(&task.id) {
            return Err(existing.clone());
        }
        Ok(state.put(task))
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.state.read().await.tasks.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.tasks.contains_key(id)
    }

    /// Set status and attempt together. `None` (and no effect) for an
    /// unknown id.
    pub async fn update_status(&self, id: &str, status: TaskStatus, attempt: u32) -> Option<Task> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let task = state.tasks.get_mut(id)?;

        state.metrics.transition(task.status, status);
        task.status = status;
        task.attempt = attempt;
        task.updated_at = refreshed(task.updated_at);

        Some(task.clone())
    }

    pub async fn metrics(&self) -> Metrics {
        self.state.read().await.metrics
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.tasks.is_empty()
    }

    /// Copy of every task, for inspection.
    pub async fn snapshot(&self) -> Vec<Task> {
        self.state.read().await.tasks.values().cloned().collect()
    }
}
