use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::{BoundedQueue, RetryPolicy, Task, TaskStatus};
use crate::runtime::Executor;
use crate::store::TaskStore;

/// Everything a worker needs, shared read-only by the whole group.
pub struct WorkerContext {
    pub store: Arc<TaskStore>,
    pub queue: Arc<BoundedQueue<Task>>,
    pub executor: Arc<dyn Executor>,
    pub retry_policy: RetryPolicy,
    /// Pause between re-queue attempts while the queue is full.
    pub retry_interval: Duration,
    /// Base seed; worker `i` uses `seed + i + 1`.
    pub seed: u64,
}

/// Worker group handle.
/// - `request_shutdown()` cancels every worker at its next suspension point
/// - `join()` waits for all of them to exit
pub struct WorkerGroup {
    cancel: CancellationToken,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers over one shared queue.
    pub fn spawn(n: usize, ctx: Arc<WorkerContext>) -> Self {
        let cancel = CancellationToken::new();

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let ctx = Arc::clone(&ctx);
            let cancel = cancel.clone();
            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, ctx, cancel).await;
            }));
        }

        Self { cancel, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Broadcast cancellation. Workers unwind at their next suspension point
    /// without touching the store again.
    pub fn request_shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.join().await;
    }
}

pub fn worker_seed(seed: u64, worker_id: usize) -> u64 {
    seed.wrapping_add(worker_id as u64 + 1)
}

async fn worker_loop(worker_id: usize, ctx: Arc<WorkerContext>, cancel: CancellationToken) {
    let mut rng = StdRng::seed_from_u64(worker_seed(ctx.seed, worker_id));
    debug!(worker = worker_id, "worker started");

    while let Some(task) = ctx.queue.take(&cancel).await {
        process(worker_id, &ctx, &cancel, &mut rng, task).await;
    }

    debug!(worker = worker_id, "worker stopped");
}

/// Run one attempt of `task` and record where it ends up.
async fn process(
    worker_id: usize,
    ctx: &WorkerContext,
    cancel: &CancellationToken,
    rng: &mut StdRng,
    task: Task,
) {
    let id = task.id.as_str();

    if cancel.is_cancelled() {
        return;
    }
    if ctx
        .store
        .update_status(id, TaskStatus::Running, task.attempt)
        .await
        .is_none()
    {
        warn!(worker = worker_id, task_id = id, "task missing from store, dropping it");
        return;
    }
    debug!(worker = worker_id, task_id = id, attempt = task.attempt, "running");

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(worker = worker_id, task_id = id, "cancelled during execution");
            return;
        }
        result = ctx.executor.execute(&task, rng) => result,
    };
    if cancel.is_cancelled() {
        return;
    }

    match result {
        Ok(()) => {
            ctx.store
                .update_status(id, TaskStatus::Done, task.attempt)
                .await;
            debug!(worker = worker_id, task_id = id, attempt = task.attempt, "done");
        }
        Err(err) if task.can_retry() => {
            let delay = ctx.retry_policy.next_delay(task.attempt, rng);
            debug!(
                worker = worker_id,
                task_id = id,
                attempt = task.attempt,
                max_retries = task.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, backing off"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(worker = worker_id, task_id = id, "cancelled during backoff");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let next = task.next_attempt();
            if !ctx.queue.offer_until(next, cancel, ctx.retry_interval).await {
                warn!(
                    worker = worker_id,
                    task_id = id,
                    attempt = task.attempt + 1,
                    "retry abandoned, engine is shutting down"
                );
            }
        }
        Err(err) => {
            ctx.store
                .update_status(id, TaskStatus::Failed, task.attempt)
                .await;
            info!(
                worker = worker_id,
                task_id = id,
                attempts = task.attempt + 1,
                error = %err,
                "task failed, retries exhausted"
            );
        }
    }
}
