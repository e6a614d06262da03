//! Admission gate: the ingress on/off switch.

use std::sync::atomic::{AtomicBool, Ordering};

/// Lock-free boolean checked before every external submission.
///
/// Independent of queue capacity and of the store lock. Closing it is the
/// first shutdown phase; queries keep working while it is closed.
#[derive(Debug)]
pub struct AdmissionGate {
    open: AtomicBool,
}

impl AdmissionGate {
    pub fn new(open: bool) -> Self {
        Self {
            open: AtomicBool::new(open),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Returns whether this call was the one that closed the gate.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(true)
    }
}
