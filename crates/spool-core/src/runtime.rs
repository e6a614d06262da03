use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::rngs::StdRng;

use crate::error::ExecutionError;
use crate::queue::Task;

/// The unit of work run for each attempt of a task.
///
/// `rng` is the calling worker's private generator; implementations that
/// need randomness should draw from it so a fixed seed reproduces a run.
///
/// The worker races this future against shutdown and drops it when
/// cancellation wins, so implementations must be cancel-safe (plain
/// `tokio::time::sleep` and friends are).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, task: &Task, rng: &mut StdRng) -> Result<(), ExecutionError>;
}

/// Stand-in workload: sleeps a random latency, then fails with a fixed
/// probability.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedExecutor {
    pub min_latency: Duration,
    pub max_latency: Duration,
    /// Per-attempt failure probability in `[0, 1]`.
    pub failure_rate: f64,
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_millis(100),
            max_latency: Duration::from_millis(500),
            failure_rate: 0.2,
        }
    }
}

impl SimulatedExecutor {
    pub fn new(min_latency: Duration, max_latency: Duration, failure_rate: f64) -> Self {
        Self {
            min_latency,
            max_latency,
            failure_rate,
        }
    }

    fn latency(&self, rng: &mut StdRng) -> Duration {
        let min = u64::try_from(self.min_latency.as_nanos()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max_latency.as_nanos()).unwrap_or(u64::MAX);
        if max <= min {
            return self.min_latency;
        }
        Duration::from_nanos(rng.gen_range(min..=max))
    }

    fn fails(&self, rng: &mut StdRng) -> bool {
        let p = if self.failure_rate.is_nan() {
            0.0
        } else {
            self.failure_rate.clamp(0.0, 1.0)
        };
        rng.gen_bool(p)
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn execute(&self, task: &Task, rng: &mut StdRng) -> Result<(), ExecutionError> {
        let latency = self.latency(rng);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.fails(rng) {
            return Err(ExecutionError::new(format!(
                "simulated failure (task={}, attempt={})",
                task.id, task.attempt
            )));
        }
        Ok(())
    }
}
