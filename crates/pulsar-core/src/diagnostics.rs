//! Read-only diagnostics for checking and reporting tools.

use std::fmt;

use serde::Serialize;

use crate::analyze::MutationWarning;
use crate::graph::{CellId, Conflict};
use crate::state::BlockedReason;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseDiagnostic {
    pub cell_id: CellId,
    pub message: String,
    pub line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeDiagnostic {
    pub cell_id: CellId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedDiagnostic {
    pub cell_id: CellId,
    pub reason: BlockedReason,
}

/// Every current problem in a notebook.
///
/// Every list is in document order: per-cell entries by the cell's position,
/// conflicts and cycles by their first member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub parse_errors: Vec<ParseDiagnostic>,
    pub conflicts: Vec<Conflict>,
    pub cycles: Vec<Vec<CellId>>,
    pub mutation_warnings: Vec<MutationWarning>,
    pub runtime_errors: Vec<RuntimeDiagnostic>,
    pub blocked: Vec<BlockedDiagnostic>,
}

impl Diagnostics {
    pub(crate) fn push_parse_error(&mut self, cell_id: CellId, message: &str, line: Option<usize>) {
        self.parse_errors.push(ParseDiagnostic {
            cell_id,
            message: message.to_string(),
            line,
        });
    }

    pub(crate) fn push_runtime_error(&mut self, cell_id: CellId, message: &str) {
        self.runtime_errors.push(RuntimeDiagnostic {
            cell_id,
            message: message.to_string(),
        });
    }

    pub(crate) fn push_blocked(&mut self, cell_id: CellId, reason: BlockedReason) {
        self.blocked.push(BlockedDiagnostic { cell_id, reason });
    }

    /// Parse, conflict or cycle errors exist. These keep cells from running
    /// no matter what their inputs are.
    pub fn has_static_errors(&self) -> bool {
        !self.parse_errors.is_empty() || !self.conflicts.is_empty() || !self.cycles.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        !self.has_static_errors()
            && self.mutation_warnings.is_empty()
            && self.runtime_errors.is_empty()
            && self.blocked.is_empty()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diag in &self.parse_errors {
            match diag.line {
                Some(line) => writeln!(
                    f,
                    "error[parse] {}: line {}: {}",
                    diag.cell_id, line, diag.message
                )?,
                None => writeln!(f, "error[parse] {}: {}", diag.cell_id, diag.message)?,
            }
        }
        for conflict in &self.conflicts {
            writeln!(f, "error[conflict] {}", conflict.to_error())?;
        }
        for members in &self.cycles {
            let names: Vec<String> = members.iter().map(|id| id.to_string()).collect();
            writeln!(f, "error[cycle] {}", names.join(", "))?;
        }
        for diag in &self.runtime_errors {
            writeln!(f, "error[runtime] {}: {}", diag.cell_id, diag.message)?;
        }
        for diag in &self.blocked {
            writeln!(f, "blocked {}: {}", diag.cell_id, diag.reason)?;
        }
        for warning in &self.mutation_warnings {
            writeln!(f, "warning[mutation] {}", warning)?;
        }
        Ok(())
    }
}
