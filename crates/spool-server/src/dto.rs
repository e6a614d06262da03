//! Wire shapes for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spool_core::{Metrics, Task, TaskStatus};

/// `POST /enqueue` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnqueueRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub max_retries: Option<i64>,
}

impl EnqueueRequest {
    /// Payload bytes: a JSON string contributes its text, anything else its
    /// compact JSON encoding. `None` when absent or `null`.
    pub fn payload_bytes(&self) -> Option<Vec<u8>> {
        match self.payload.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone().into_bytes()),
            other => Some(other.to_string().into_bytes()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnqueueResponse {
    pub id: String,
    pub status: TaskStatus,
}

/// `GET /status/{id}` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: String,
    pub payload: String,
    pub max_retries: u32,
    pub attempt: u32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            id: task.id.to_string(),
            payload: String::from_utf8_lossy(&task.payload).into_owned(),
            max_retries: task.max_retries,
            attempt: task.attempt,
            status: task.status,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// `GET /metrics` body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct MetricsView {
    pub queued: u64,
    pub running: u64,
    pub done: u64,
    pub failed: u64,
}

impl From<Metrics> for MetricsView {
    fn from(m: Metrics) -> Self {
        Self {
            queued: m.queued,
            running: m.running,
            done: m.done,
            failed: m.failed,
        }
    }
}
