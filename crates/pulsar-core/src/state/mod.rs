//! Execution state for Pulsar notebooks.
//!
//! This module provides:
//! - The shared global namespace, with generation-ordered publishing
//! - Per-cell run state (stale, running, ok, error, blocked)

mod context;
mod namespace;

pub use context::{BlockedReason, CellRuntime, CellStatus, ExecutionContext, UpstreamFailure};
pub use namespace::{Generation, Namespace, Symbol};
