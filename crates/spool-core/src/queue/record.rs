//! Task record: identity, payload, retry budget and status.

use chrono::{DateTime, Utc};

use super::TaskStatus;
use crate::domain::TaskId;

/// One unit of work.
///
/// Records are moved by value between the submission path, the queue and the
/// workers; the store keeps its own copy and hands out clones.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,

    /// Opaque bytes, never interpreted by the engine.
    pub payload: Vec<u8>,

    /// Retries allowed after the first attempt.
    pub max_retries: u32,

    /// Zero-based attempt counter, bumped once per retry.
    pub attempt: u32,

    pub status: TaskStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a fresh queued task. Negative `max_retries` clamps to 0.
    pub fn new(id: TaskId, payload: impl Into<Vec<u8>>, max_retries: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            payload: payload.into(),
            max_retries: clamp_retries(max_retries),
            attempt: 0,
            status: TaskStatus::Queued,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether another attempt is allowed after the current one fails.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_retries
    }

    /// Copy of this task for the next attempt.
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.attempt += 1;
        next
    }
}

fn clamp_retries(max_retries: i64) -> u32 {
    u32::try_from(max_retries.max(0)).unwrap_or(u32::MAX)
}
