use serde::{Deserialize, Serialize};

use crate::queue::TaskStatus;

/// Per-status task counters. Every stored task is counted exactly once,
/// under its current status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub queued: u64,
    pub running: u64,
    pub done: u64,
    pub failed: u64,
}

impl Metrics {
    pub fn total(&self) -> u64 {
        self.queued + self.running + self.done + self.failed
    }

    pub fn get(&self, status: TaskStatus) -> u64 {
        match status {
            TaskStatus::Queued => self.queued,
            TaskStatus::Running => self.running,
            TaskStatus::Done => self.done,
            TaskStatus::Failed => self.failed,
        }
    }

    pub(crate) fn increment(&mut self, status: TaskStatus) {
        *self.slot(status) += 1;
    }

    pub(crate) fn decrement(&mut self, status: TaskStatus) {
        let slot = self.slot(status);
        *slot = slot.saturating_sub(1);
    }

    /// Move one task from `from` to `to`. No-op when they are equal.
    pub(crate) fn transition(&mut self, from: TaskStatus, to: TaskStatus) {
        if from != to {
            self.decrement(from);
            self.increment(to);
        }
    }

    fn slot(&mut self, status: TaskStatus) -> &mut u64 {
        match status {
            TaskStatus::Queued => &mut self.queued,
            TaskStatus::Running => &mut self.running,
            TaskStatus::Done => &mut self.done,
            TaskStatus::Failed => &mut self.failed,
        }
    }
}
