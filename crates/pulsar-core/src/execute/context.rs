//! Abort handles and progress callbacks for scheduling passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::CellError;
use crate::graph::CellId;
use crate::state::BlockedReason;

/// Handle for cooperative cancellation of a pass.
///
/// Clones share one flag. Every job of a pass carries a clone, and the
/// language binding polls it while a cell runs.
///
/// # Example
///
/// ```
/// use pulsar_core::execute::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let job_handle = handle.clone();
///
/// assert!(!job_handle.is_aborted());
/// handle.abort();
/// assert!(job_handle.is_aborted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Request abort. Running cells stop at their next check.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }
}

/// Observer of a synchronous pass, called from the committing thread.
pub trait ExecutionCallback: Send + Sync {
    /// The cell was prepared and is about to run.
    fn on_cell_started(&self, cell_id: CellId);

    /// The cell's bindings were published.
    fn on_cell_completed(&self, cell_id: CellId, duration: Duration);

    /// The cell failed, statically or at runtime.
    fn on_cell_error(&self, cell_id: CellId, error: &CellError);

    fn on_cell_blocked(&self, cell_id: CellId, reason: &BlockedReason);

    fn on_level_started(&self, _level: usize, _cell_count: usize) {}

    fn on_level_completed(&self, _level: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_not_aborted() {
        assert!(!AbortHandle::default().is_aborted());
    }

    #[test]
    fn test_abort_handle_clone_shares_state() {
        let handle = AbortHandle::new();
        let clone = handle.clone();

        clone.abort();

        assert!(handle.is_aborted());
        assert!(clone.is_aborted());
    }

    #[test]
    fn test_abort_survives_across_threads() {
        let handle = AbortHandle::new();
        let remote = handle.clone();
        std::thread::spawn(move || remote.abort()).join().unwrap();
        assert!(handle.is_aborted());
    }
}
