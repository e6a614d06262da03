use thiserror::Error;

use crate::domain::TaskId;

/// Why a submission was turned away. Every variant leaves the store and the
/// queue exactly as they were.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The admission gate is closed (shutting down).
    #[error("not accepting new tasks")]
    GateClosed,

    /// The queue has no free slot. Transient; callers may try again.
    #[error("queue is full")]
    QueueFull,

    #[error("duplicate id: {0}")]
    DuplicateId(TaskId),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// A failed execution attempt. Drives retry/failed inside the worker and is
/// never surfaced beyond it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ExecutionError(String);

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}
