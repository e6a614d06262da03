//! spool-server
//!
//! HTTP ingress in front of a `spool_core::Engine`.

pub mod config;
pub mod dto;
pub mod routes;
pub mod telemetry;

pub use config::ServerConfig;
pub use routes::router;
