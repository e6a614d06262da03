//! Application layer: the engine that ties store, queue, gate and workers
//! together, and the builder that validates its settings.

pub mod builder;
pub mod engine;

pub use self::builder::{BuildError, DEFAULT_QUEUE_SIZE, DEFAULT_WORKERS, EngineBuilder};
pub use self::engine::{Engine, Submission, Submitted};
