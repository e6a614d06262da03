//! Queue module: task records, status machine, backoff, the bounded FIFO
//! and the admission gate in front of it.

mod gate;
mod memory;
mod record;
mod retry;
mod state;

pub use gate::AdmissionGate;
pub use memory::{BoundedQueue, DEFAULT_RETRY_INTERVAL, OfferError, Permit, ReserveError};
pub use record::Task;
pub use retry::{
    DEFAULT_BASE_DELAY, DEFAULT_JITTER_MAX, DEFAULT_MAX_SHIFT, RetryPolicy, backoff_delay,
};
pub use state::TaskStatus;
