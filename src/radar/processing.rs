//! Per-task processing claims
//!
//! A claim is a check-and-set on a shared id set. The returned guard
//! releases the claim on drop, so a run that errors, panics or is aborted
//! by a timeout never leaves its task marked as processing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Tracks which tasks currently have a run in flight
#[derive(Debug, Clone, Default)]
pub struct ProcessingTracker {
    active: Arc<Mutex<HashSet<i64>>>,
}

impl ProcessingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a task; `None` when another run already holds it
    pub fn try_claim(&self, task_id: i64) -> Option<ProcessingClaim> {
        if self.lock().insert(task_id) {
            Some(ProcessingClaim {
                task_id,
                active: Arc::clone(&self.active),
            })
        } else {
            None
        }
    }

    pub fn is_processing(&self, task_id: i64) -> bool {
        self.lock().contains(&task_id)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<i64>> {
        // A panic while holding the lock cannot leave the set half-updated
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held for the duration of one task run
#[derive(Debug)]
pub struct ProcessingClaim {
    task_id: i64,
    active: Arc<Mutex<HashSet<i64>>>,
}

impl Drop for ProcessingClaim {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.task_id);
    }
}
