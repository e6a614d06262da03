//! Process configuration read from environment variables.
//!
//! Every value is optional. Anything missing, unparsable or non-positive
//! falls back to its default without failing startup.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use spool_core::app::{DEFAULT_QUEUE_SIZE, DEFAULT_WORKERS};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// `WORKERS`
    pub workers: usize,
    /// `QUEUE_SIZE`
    pub queue_size: usize,
    /// `LISTEN_ADDR`
    pub listen_addr: SocketAddr,
    /// `SHUTDOWN_GRACE_MS`: how long in-flight HTTP requests get after a
    /// shutdown signal.
    pub shutdown_grace: Duration,
    /// `WORKER_SEED`: base seed for the worker RNGs.
    pub seed: u64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let workers = positive(&lookup, "WORKERS").unwrap_or(DEFAULT_WORKERS);
        let queue_size = positive(&lookup, "QUEUE_SIZE").unwrap_or(DEFAULT_QUEUE_SIZE);
        let listen_addr = lookup("LISTEN_ADDR")
            .and_then(|v| v.trim().parse::<SocketAddr>().ok())
            .unwrap_or_else(default_listen_addr);
        let shutdown_grace = positive(&lookup, "SHUTDOWN_GRACE_MS")
            .map(|ms| Duration::from_millis(ms as u64))
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE);
        let seed = lookup("WORKER_SEED")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or_else(clock_seed);

        Self {
            workers,
            queue_size,
            listen_addr,
            shutdown_grace,
            seed,
        }
    }
}

fn positive<F>(lookup: &F, key: &str) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    let n = raw.trim().parse::<i64>().ok()?;
    if n <= 0 {
        return None;
    }
    usize::try_from(n).ok()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
