//! Graph engine for dependency resolution.
//!
//! This module provides:
//! - Symbol ownership and producer-to-consumer edges
//! - Conflict detection for names defined by more than one cell
//! - Cycle detection via strongly connected components
//! - Incremental maintenance that converges to a full rebuild

mod engine;
mod types;

pub use engine::GraphEngine;
pub use types::{CellId, Conflict, Edge, GraphSnapshot};
