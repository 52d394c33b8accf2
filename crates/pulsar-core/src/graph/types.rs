//! Types for the graph engine.

use serde::{Deserialize, Serialize};

use crate::error::CellError;

/// Unique identifier for a cell within a notebook.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CellId(pub(crate) usize);

impl CellId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell_{}", self.0)
    }
}

/// A dependency edge: `to` reads `symbol`, which `from` defines.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Edge {
    pub from: CellId,
    pub to: CellId,
    pub symbol: String,
}

/// A global name claimed by more than one live cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub name: String,
    /// Claiming cells in document order.
    pub cells: Vec<CellId>,
}

impl Conflict {
    pub fn to_error(&self) -> CellError {
        CellError::Conflict {
            name: self.name.clone(),
            cells: self.cells.clone(),
        }
    }
}

/// Structural view of a graph, used to compare an incrementally maintained
/// graph against one rebuilt from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub order: Vec<CellId>,
    pub edges: Vec<Edge>,
    pub conflicts: Vec<Conflict>,
    pub cycles: Vec<Vec<CellId>>,
}
