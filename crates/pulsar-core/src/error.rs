//! Error types for pulsar-core.
//!
//! Two layers live here. [`Error`] is returned by notebook operations that the
//! caller got wrong (unknown cell, duplicate id, bad config). [`CellError`] is
//! the cell-scoped failure taxonomy: it never aborts an operation, it is stored
//! on the affected cell and reported through diagnostics.

use serde::Serialize;
use thiserror::Error;

use crate::graph::CellId;

/// Result type for pulsar-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pulsar-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Cell not found.
    #[error("cell not found: {0}")]
    CellNotFound(CellId),

    /// A cell with this id already exists.
    #[error("duplicate cell id: {0}")]
    DuplicateCell(CellId),

    /// No cell has registered a widget with this id.
    #[error("unknown widget: {0}")]
    UnknownWidget(String),

    /// Invalid operation (e.g., moving a cell past the end of the document).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Invalid engine configuration.
    #[error("config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Render the error with a short recovery hint for terminal output.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::CellNotFound(_) => "the document may have been reloaded; re-query cell ids",
            Error::DuplicateCell(_) => "give every cell a distinct label",
            Error::UnknownWidget(_) => "run the cell that creates the widget first",
            Error::InvalidOperation(_) => "check the cell position and try again",
            Error::Config(_) => "see `EngineConfig` for accepted fields",
            Error::Io(_) => "check that the path exists and is readable",
            Error::Json(_) => "check the file is valid JSON",
        };
        format!("{}\n  hint: {}", self, hint)
    }
}

/// A failure scoped to a single cell.
///
/// Every variant names the cells involved so a reporting tool can point at
/// them without re-deriving graph state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellError {
    /// The cell's source failed static analysis.
    #[error("parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        message: String,
        line: Option<usize>,
    },

    /// Two or more live cells define the same global name.
    #[error("'{name}' is defined by multiple cells: {}", join_ids(cells))]
    Conflict { name: String, cells: Vec<CellId> },

    /// The cell is a member of a dependency cycle.
    #[error("cyclic dependency: {}", join_ids(members))]
    Cycle { members: Vec<CellId> },

    /// The cell raised an error while running.
    #[error("runtime error: {message}")]
    Runtime { message: String },
}

impl CellError {
    /// Short machine-readable kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            CellError::Parse { .. } => "parse",
            CellError::Conflict { .. } => "conflict",
            CellError::Cycle { .. } => "cycle",
            CellError::Runtime { .. } => "runtime",
        }
    }
}

fn join_ids(ids: &[CellId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
