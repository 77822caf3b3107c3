//! Single-slot leases for background jobs.
//!
//! Each job type owns one lease; an API trigger that fails to acquire it
//! reports `already_running` instead of stacking a second run. The guard
//! releases on drop, so a panicking task still frees its slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct TaskLease {
    busy: Arc<AtomicBool>,
}

impl TaskLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot if free. Returns `None` while another run holds it.
    pub fn acquire(&self) -> Option<LeaseGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LeaseGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct LeaseGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// One lease per job type, shared through [`crate::AppState`].
#[derive(Debug, Clone, Default)]
pub struct TaskLeases {
    pub sync: TaskLease,
    pub backtest: TaskLease,
    pub train: TaskLease,
    pub diagnose: TaskLease,
    pub plan: TaskLease,
}

impl TaskLeases {
    pub fn new() -> Self {
        Self::default()
    }
}
