//! Per-cell run state and the namespace that committed results write into.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::namespace::{Generation, Namespace};
use crate::error::CellError;
use crate::graph::CellId;

/// Run state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    /// Output does not reflect the current source or inputs.
    Stale,
    Running,
    Ok,
    Error,
    /// Not run because an upstream cell failed in the same pass.
    Blocked,
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CellStatus::Stale => "stale",
            CellStatus::Running => "running",
            CellStatus::Ok => "ok",
            CellStatus::Error => "error",
            CellStatus::Blocked => "blocked",
        };
        f.write_str(name)
    }
}

/// Why an upstream cell did not produce usable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamFailure {
    Error,
    Cancelled,
}

/// The upstream cell that kept a cell from running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockedReason {
    /// Direct producer that failed, was blocked, or was cancelled.
    pub upstream: CellId,
    pub failure: UpstreamFailure,
}

impl fmt::Display for BlockedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failure {
            UpstreamFailure::Error => {
                write!(f, "not run due to upstream error in {}", self.upstream)
            }
            UpstreamFailure::Cancelled => {
                write!(f, "not run because {} was cancelled", self.upstream)
            }
        }
    }
}

/// Run state of one cell.
#[derive(Debug, Clone)]
pub struct CellRuntime<V> {
    pub status: CellStatus,
    /// Display value of the last successful run. Cleared on error, block and
    /// cancel.
    pub display: Option<V>,
    pub error: Option<CellError>,
    pub blocked_by: Option<BlockedReason>,
    /// The last run was stopped by an abort signal.
    pub cancelled: bool,
    /// Generation of the most recent run, if the cell has run.
    pub generation: Option<Generation>,
    pub duration: Option<Duration>,
}

impl<V> Default for CellRuntime<V> {
    fn default() -> Self {
        Self {
            status: CellStatus::Stale,
            display: None,
            error: None,
            blocked_by: None,
            cancelled: false,
            generation: None,
            duration: None,
        }
    }
}

impl<V> CellRuntime<V> {
    /// The cell holds no usable output for its dependents.
    pub fn is_failed(&self) -> bool {
        matches!(self.status, CellStatus::Error | CellStatus::Blocked)
            || (self.status == CellStatus::Stale && self.cancelled)
    }
}

/// Shared namespace plus per-cell run state.
///
/// Every mutation goes through a `&mut self` method, so at most one cell result
/// is applied at a time.
#[derive(Debug)]
pub struct ExecutionContext<V> {
    namespace: Namespace<V>,
    cells: FxHashMap<CellId, CellRuntime<V>>,
    generation: Generation,
}

impl<V> Default for ExecutionContext<V> {
    fn default() -> Self {
        Self {
            namespace: Namespace::default(),
            cells: FxHashMap::default(),
            generation: Generation::default(),
        }
    }
}

impl<V: Clone> ExecutionContext<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new pass.
    pub fn next_generation(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.generation
    }

    /// Generation of the most recently started pass.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn namespace(&self) -> &Namespace<V> {
        &self.namespace
    }

    pub fn namespace_mut(&mut self) -> &mut Namespace<V> {
        &mut self.namespace
    }

    pub fn add_cell(&mut self, id: CellId) {
        self.cells.entry(id).or_default();
    }

    /// Forget a deleted cell and everything it published.
    pub fn remove_cell(&mut self, id: CellId) -> Option<CellRuntime<V>> {
        self.namespace.remove_owner(id);
        self.cells.remove(&id)
    }

    pub fn runtime(&self, id: CellId) -> Option<&CellRuntime<V>> {
        self.cells.get(&id)
    }

    pub fn status(&self, id: CellId) -> Option<CellStatus> {
        self.cells.get(&id).map(|cell| cell.status)
    }

    /// Mark a cell as needing a run. Its last output is kept, flagged stale.
    pub fn mark_stale(&mut self, id: CellId) {
        let cell = self.cells.entry(id).or_default();
        cell.status = CellStatus::Stale;
        cell.blocked_by = None;
        cell.cancelled = false;
    }

    pub fn mark_running(&mut self, id: CellId, generation: Generation) {
        let cell = self.cells.entry(id).or_default();
        cell.status = CellStatus::Running;
        cell.generation = Some(generation);
    }

    /// Apply a successful run: publish the cell's defined names.
    ///
    /// A defined name missing from `bindings` (e.g. assigned only on a branch
    /// that did not execute) is invalidated.
    pub fn complete(
        &mut self,
        id: CellId,
        generation: Generation,
        bindings: Vec<(String, V)>,
        display: Option<V>,
        defined: &BTreeSet<String>,
        duration: Duration,
    ) {
        let mut missing: BTreeSet<&String> = defined.iter().collect();
        for (name, value) in bindings {
            if defined.contains(&name) {
                missing.remove(&name);
                self.namespace.publish(name, value, id, generation);
            }
        }
        for name in missing {
            self.namespace.invalidate(name, id, generation);
        }

        let cell = self.cells.entry(id).or_default();
        cell.status = CellStatus::Ok;
        cell.display = display;
        cell.error = None;
        cell.blocked_by = None;
        cell.cancelled = false;
        cell.generation = Some(generation);
        cell.duration = Some(duration);
    }

    /// Record an error and invalidate everything the cell published.
    pub fn fail(
        &mut self,
        id: CellId,
        generation: Generation,
        error: CellError,
        defined: &BTreeSet<String>,
    ) {
        self.invalidate_all(id, generation, defined);
        let cell = self.cells.entry(id).or_default();
        cell.status = CellStatus::Error;
        cell.display = None;
        cell.error = Some(error);
        cell.blocked_by = None;
        cell.cancelled = false;
        cell.generation = Some(generation);
    }

    /// Record that an upstream failure kept the cell from running.
    pub fn block(
        &mut self,
        id: CellId,
        generation: Generation,
        reason: BlockedReason,
        defined: &BTreeSet<String>,
    ) {
        self.invalidate_all(id, generation, defined);
        let cell = self.cells.entry(id).or_default();
        cell.status = CellStatus::Blocked;
        cell.display = None;
        cell.error = None;
        cell.blocked_by = Some(reason);
        cell.cancelled = false;
        cell.generation = Some(generation);
    }

    /// Record a cancelled run. Downstream cells treat it as a failure, but no
    /// error is attached.
    pub fn cancel(&mut self, id: CellId, generation: Generation, defined: &BTreeSet<String>) {
        self.invalidate_all(id, generation, defined);
        let cell = self.cells.entry(id).or_default();
        cell.status = CellStatus::Stale;
        cell.display = None;
        cell.error = None;
        cell.blocked_by = None;
        cell.cancelled = true;
        cell.generation = Some(generation);
    }

    fn invalidate_all(&mut self, id: CellId, generation: Generation, defined: &BTreeSet<String>) {
        for name in defined {
            self.namespace.invalidate(name, id, generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Symbol;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_complete_publishes_only_defined_names() {
        let mut ctx = ExecutionContext::new();
        let id = CellId::new(0);
        let generation = ctx.next_generation();
        ctx.complete(
            id,
            generation,
            vec![("a".to_string(), 1), ("_tmp".to_string(), 2)],
            Some(1),
            &names(&["a"]),
            Duration::ZERO,
        );
        assert_eq!(ctx.namespace().get("a"), Some(&1));
        assert_eq!(ctx.namespace().get("_tmp"), None);
        assert_eq!(ctx.status(id), Some(CellStatus::Ok));
    }

    #[test]
    fn test_missing_defined_name_is_invalidated() {
        let mut ctx = ExecutionContext::new();
        let id = CellId::new(0);
        let first = ctx.next_generation();
        ctx.complete(id, first, vec![("a".to_string(), 1)], None, &names(&["a"]), Duration::ZERO);

        let second = ctx.next_generation();
        ctx.complete(id, second, vec![], None, &names(&["a"]), Duration::ZERO);
        assert!(matches!(ctx.namespace().lookup("a"), Symbol::Stale { .. }));
    }

    #[test]
    fn test_fail_invalidates_and_clears_display() {
        let mut ctx = ExecutionContext::new();
        let id = CellId::new(0);
        let first = ctx.next_generation();
        ctx.complete(id, first, vec![("a".to_string(), 1)], Some(1), &names(&["a"]), Duration::ZERO);

        let second = ctx.next_generation();
        let error = CellError::Runtime {
            message: "boom".to_string(),
        };
        ctx.fail(id, second, error.clone(), &names(&["a"]));

        let runtime = ctx.runtime(id).unwrap();
        assert_eq!(runtime.status, CellStatus::Error);
        assert_eq!(runtime.display, None);
        assert_eq!(runtime.error, Some(error));
        assert_eq!(ctx.namespace().get("a"), None);
    }

    #[test]
    fn test_cancel_counts_as_failed_without_error() {
        let mut ctx: ExecutionContext<i64> = ExecutionContext::new();
        let id = CellId::new(3);
        let generation = ctx.next_generation();
        ctx.mark_running(id, generation);
        ctx.cancel(id, generation, &names(&["x"]));

        let runtime = ctx.runtime(id).unwrap();
        assert_eq!(runtime.status, CellStatus::Stale);
        assert!(runtime.cancelled);
        assert!(runtime.error.is_none());
        assert!(runtime.is_failed());
    }

    #[test]
    fn test_blocked_reason_message() {
        let reason = BlockedReason {
            upstream: CellId::new(2),
            failure: UpstreamFailure::Error,
        };
        assert_eq!(reason.to_string(), "not run due to upstream error in cell_2");
    }

    #[test]
    fn test_remove_cell_drops_symbols() {
        let mut ctx = ExecutionContext::new();
        let id = CellId::new(0);
        let generation = ctx.next_generation();
        ctx.complete(id, generation, vec![("a".to_string(), 1)], None, &names(&["a"]), Duration::ZERO);
        ctx.remove_cell(id);
        assert!(matches!(ctx.namespace().lookup("a"), Symbol::Absent));
        assert!(ctx.runtime(id).is_none());
    }
}
