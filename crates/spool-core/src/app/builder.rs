//! EngineBuilder: wiring plus fail-fast validation of the engine settings.

use std::sync::Arc;
use std::time::Duration;

use crate::queue::{DEFAULT_RETRY_INTERVAL, RetryPolicy};
use crate::runtime::{Executor, SimulatedExecutor};

use super::engine::Engine;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_SIZE: usize = 64;

/// Builds an [`Engine`].
///
/// ```ignore
/// let engine = EngineBuilder::new()
///     .workers(8)
///     .queue_size(256)
///     .seed(42)
///     .build()?;
/// engine.start();
/// ```
///
/// `build()` rejects a zero worker count or a zero queue size instead of
/// silently substituting a default; defaulting of user input happens in the
/// configuration layer.
pub struct EngineBuilder {
    workers: usize,
    queue_size: usize,
    seed: u64,
    retry_policy: RetryPolicy,
    retry_interval: Duration,
    executor: Arc<dyn Executor>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("queue size must be at least 1")]
    ZeroQueueSize,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_size: DEFAULT_QUEUE_SIZE,
            seed: 0,
            retry_policy: RetryPolicy::default(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            executor: Arc::new(SimulatedExecutor::default()),
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Base seed for the per-worker RNGs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Poll interval used while re-queueing a retry into a full queue.
    /// Zero means the default.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = if interval.is_zero() {
            DEFAULT_RETRY_INTERVAL
        } else {
            interval
        };
        self
    }

    pub fn executor<E: Executor + 'static>(mut self, executor: E) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn shared_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        if self.workers == 0 {
            return Err(BuildError::ZeroWorkers);
        }
        if self.queue_size == 0 {
            return Err(BuildError::ZeroQueueSize);
        }

        Ok(Engine::new(
            self.workers,
            self.queue_size,
            self.seed,
            self.retry_policy,
            self.retry_interval,
            self.executor,
        ))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
