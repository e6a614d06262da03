//! Engine: owns the store, queue, gate and worker group, and sequences
//! submission and shutdown over them.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::TaskId;
use crate::error::SubmitError;
use crate::observability::Metrics;
use crate::queue::{AdmissionGate, BoundedQueue, ReserveError, RetryPolicy, Task, TaskStatus};
use crate::runtime::Executor;
use crate::store::TaskStore;
use crate::worker::{WorkerContext, WorkerGroup};

/// A request to run one task.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Client-chosen id. `None` or blank means one is generated.
    pub id: Option<String>,
    pub payload: Vec<u8>,
    /// Negative values are treated as 0.
    pub max_retries: i64,
}

impl Submission {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: None,
            payload: payload.into(),
            max_retries: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub id: TaskId,
    pub status: TaskStatus,
}

enum Lifecycle {
    Idle,
    Running(WorkerGroup),
    Stopped,
}

pub struct Engine {
    store: Arc<TaskStore>,
    queue: Arc<BoundedQueue<Task>>,
    gate: AdmissionGate,
    ctx: Arc<WorkerContext>,
    workers: usize,
    lifecycle: Mutex<Lifecycle>,
}

impl Engine {
    pub(super) fn new(
        workers: usize,
        queue_size: usize,
        seed: u64,
        retry_policy: RetryPolicy,
        retry_interval: Duration,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let store = Arc::new(TaskStore::new());
        let queue = Arc::new(BoundedQueue::new(queue_size));
        let ctx = Arc::new(WorkerContext {
            store: Arc::clone(&store),
            queue: Arc::clone(&queue),
            executor,
            retry_policy,
            retry_interval,
            seed,
        });

        Self {
            store,
            queue,
            gate: AdmissionGate::default(),
            ctx,
            workers,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Spawn the worker group. Must be called inside a tokio runtime.
    /// Calling it again, or after shutdown, does nothing.
    pub fn start(&self) {
        let mut lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return;
        }

        *lifecycle = Lifecycle::Running(WorkerGroup::spawn(self.workers, Arc::clone(&self.ctx)));
        info!(
            workers = self.workers,
            queue_size = self.queue.capacity(),
            "engine started"
        );
    }

    /// Admit a task.
    ///
    /// Checks run in order (gate, input, duplicate id, queue slot) and a
    /// rejection at any of them leaves the store and the queue untouched.
    /// The queue slot is reserved before the store write, so a task is never
    /// recorded without a place in the queue.
    pub async fn submit(&self, submission: Submission) -> Result<Submitted, SubmitError> {
        if !self.gate.is_open() {
            return Err(SubmitError::GateClosed);
        }

        if submission.payload.iter().all(u8::is_ascii_whitespace) {
            return Err(SubmitError::InvalidInput("payload is required".to_string()));
        }
        let id = match submission.id {
            Some(id) if !id.trim().is_empty() => TaskId::new(id),
            _ => TaskId::generate(),
        };

        if self.store.contains(id.as_str()).await {
            return Err(SubmitError::DuplicateId(id));
        }

        let permit = self.queue.try_reserve().map_err(|e| match e {
            ReserveError::Full => SubmitError::QueueFull,
            ReserveError::Closed => SubmitError::GateClosed,
        })?;

        let task = Task::new(id, submission.payload, submission.max_retries);
        let task = self
            .store
            .insert_new(task)
            .await
            .map_err(|existing| SubmitError::DuplicateId(existing.id))?;

        let submitted = Submitted {
            id: task.id.clone(),
            status: task.status,
        };
        info!(
            task_id = task.id.as_str(),
            max_retries = task.max_retries,
            "task admitted"
        );
        permit.send(task);

        Ok(submitted)
    }

    pub async fn query(&self, id: &str) -> Option<Task> {
        self.store.get(id).await
    }

    pub async fn metrics(&self) -> Metrics {
        self.store.metrics().await
    }

    /// Tasks waiting in the queue right now.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub async fn store_len(&self) -> usize {
        self.store.len().await
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Stop admitting new submissions. Returns `true` if this call closed it.
    pub fn close_gate(&self) -> bool {
        let closed = self.gate.close();
        if closed {
            info!("admission gate closed");
        }
        closed
    }

    pub fn is_accepting(&self) -> bool {
        self.gate.is_open()
    }

    /// Ordered shutdown:
    /// 1. close the admission gate (queries keep working)
    /// 2. cancel every worker
    /// 3. close the queue, wait for the workers and for in-flight
    ///    submissions holding a queue slot, then drain what is left
    ///
    /// Every task acknowledged by `submit` is either processed or counted in
    /// the drain. Drained tasks stay `queued` in the store. Returns how many were
    /// drained; later calls return 0.
    pub async fn shutdown(&self) -> usize {
        let previous = {
            let mut lifecycle = self
                .lifecycle
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };
        if matches!(previous, Lifecycle::Stopped) {
            debug!("shutdown already done");
            return 0;
        }

        self.close_gate();

        let group = match previous {
            Lifecycle::Running(group) => {
                group.request_shutdown();
                info!(workers = group.len(), "cancellation sent to workers");
                Some(group)
            }
            _ => None,
        };

        self.queue.close();
        if let Some(group) = group {
            group.join().await;
            info!("workers stopped");
        }
        self.queue.settled().await;

        let drained = self.queue.drain();
        if !drained.is_empty() {
            warn!(count = drained.len(), "queued tasks left unprocessed");
        }
        info!(drained = drained.len(), "engine shut down");
        drained.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::EngineBuilder;
    use crate::runtime::SimulatedExecutor;

    fn engine(queue_size: usize) -> Engine {
        EngineBuilder::new()
            .workers(2)
            .queue_size(queue_size)
            .seed(1)
            .executor(SimulatedExecutor::new(Duration::ZERO, Duration::ZERO, 0.0))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn submit_records_queued_task() {
        let engine = engine(4);
        let ack = engine
            .submit(Submission::new("work").with_id("a").with_max_retries(2))
            .await
            .unwrap();

        assert_eq!(ack.id.as_str(), "a");
        assert_eq!(ack.status, TaskStatus::Queued);
        assert_eq!(engine.queue_len(), 1);

        let task = engine.query("a").await.unwrap();
        assert_eq!(task.payload, b"work");
        assert_eq!(task.max_retries, 2);
        assert_eq!(task.attempt, 0);
        assert_eq!(engine.metrics().await.queued, 1);
    }

    #[tokio::test]
    async fn missing_or_blank_id_is_generated() {
        let engine = engine(4);
        let a = engine.submit(Submission::new("x")).await.unwrap();
        let b = engine
            .submit(Submission::new("x").with_id("   "))
            .await
            .unwrap();

        assert!(!a.id.as_str().is_empty());
        assert_ne!(a.id, b.id);
        assert_eq!(engine.store_len().await, 2);
    }

    #[tokio::test]
    async fn blank_payload_is_invalid() {
        let engine = engine(4);
        for payload in [b"".as_slice(), b"  \n".as_slice()] {
            let err = engine.submit(Submission::new(payload)).await.unwrap_err();
            assert!(matches!(err, SubmitError::InvalidInput(_)));
        }
        assert_eq!(engine.store_len().await, 0);
        assert_eq!(engine.queue_len(), 0);
    }

    #[tokio::test]
    async fn duplicate_id_leaves_original_untouched() {
        let engine = engine(4);
        engine
            .submit(Submission::new("first").with_id("dup"))
            .await
            .unwrap();
        let original = engine.query("dup").await.unwrap();

        let err = engine
            .submit(Submission::new("second").with_id("dup").with_max_retries(9))
            .await
            .unwrap_err();
        assert_eq!(err, SubmitError::DuplicateId(TaskId::from("dup")));

        assert_eq!(engine.query("dup").await.unwrap(), original);
        assert_eq!(engine.queue_len(), 1);
        assert_eq!(engine.metrics().await.total(), 1);
    }

    #[tokio::test]
    async fn full_queue_rejects_without_store_write() {
        let engine = engine(1);
        engine.submit(Submission::new("1").with_id("a")).await.unwrap();

        let err = engine
            .submit(Submission::new("2").with_id("b"))
            .await
            .unwrap_err();
        assert_eq!(err, SubmitError::QueueFull);
        assert!(engine.query("b").await.is_none());
        assert_eq!(engine.store_len().await, 1);
        assert_eq!(engine.queue_len(), 1);
    }

    #[tokio::test]
    async fn closed_gate_rejects_without_side_effects() {
        let engine = engine(4);
        engine.submit(Submission::new("1").with_id("a")).await.unwrap();

        assert!(engine.close_gate());
        assert!(!engine.close_gate());
        assert!(!engine.is_accepting());

        let err = engine
            .submit(Submission::new("2").with_id("b"))
            .await
            .unwrap_err();
        assert_eq!(err, SubmitError::GateClosed);
        assert_eq!(engine.queue_len(), 1);
        assert_eq!(engine.store_len().await, 1);
        assert!(engine.query("a").await.is_some());
    }

    #[tokio::test]
    async fn shutdown_without_start_drains_queue() {
        let engine = engine(4);
        engine.submit(Submission::new("1").with_id("a")).await.unwrap();
        engine.submit(Submission::new("2").with_id("b")).await.unwrap();

        assert_eq!(engine.shutdown().await, 2);
        assert_eq!(engine.queue_len(), 0);
        assert!(!engine.is_accepting());

        let a = engine.query("a").await.unwrap();
        assert_eq!(a.status, TaskStatus::Queued);
        assert_eq!(engine.shutdown().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn submissions_racing_shutdown_are_all_drained() {
        for round in 0..50 {
            let engine = Arc::new(engine(64));

            let submitters: Vec<_> = (0..16)
                .map(|i| {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        engine
                            .submit(Submission::new("p").with_id(format!("r{round}-{i}")))
                            .await
                            .is_ok()
                    })
                })
                .collect();
            let drained = {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.shutdown().await })
            };

            let mut accepted = 0;
            for s in submitters {
                if s.await.unwrap() {
                    accepted += 1;
                }
            }
            let drained = drained.await.unwrap();

            assert_eq!(drained, accepted, "round {round}");
            assert_eq!(engine.queue_len(), 0, "round {round}");
            assert_eq!(engine.metrics().await.queued, accepted as u64);
        }
    }

    #[tokio::test]
    async fn start_after_shutdown_is_a_no_op() {
        let engine = engine(4);
        engine.shutdown().await;
        engine.start();
        assert!(matches!(
            *engine.lifecycle.lock().unwrap(),
            Lifecycle::Stopped
        ));
    }

    #[tokio::test]
    async fn started_engine_processes_and_stops() {
        let engine = engine(4);
        engine.start();
        engine.start();

        engine.submit(Submission::new("1").with_id("a")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if engine.metrics().await.done == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(1), engine.shutdown())
            .await
            .unwrap();
        assert_eq!(
            engine.submit(Submission::new("2")).await,
            Err(SubmitError::GateClosed)
        );
    }
}
