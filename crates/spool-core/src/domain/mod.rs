//! Domain identifiers shared by the store, queue and ingress.

pub mod ids;

pub use ids::TaskId;
