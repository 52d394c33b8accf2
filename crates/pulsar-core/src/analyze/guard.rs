//! Mutation guard.
//!
//! In-place mutation of a value a cell only reads is invisible to the graph:
//! no edge records it, so the value's other readers are never rescheduled.
//! The guard reports such sites as warnings. It never changes scheduling.

use std::fmt;

use serde::Serialize;

use super::CellSymbols;
use crate::graph::CellId;
use crate::lang::{MutationKind, MutationSite};

/// A cell mutating a name it does not own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationWarning {
    pub cell_id: CellId,
    pub target: String,
    pub kind: MutationKind,
    /// Line within the cell, when known.
    pub line: Option<usize>,
    /// Cell that defines `target`, if exactly one does.
    pub owner: Option<CellId>,
}

impl fmt::Display for MutationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mutates `{}`: {}", self.cell_id, self.target, self.kind)?;
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        if let Some(owner) = self.owner {
            write!(f, "; `{}` is owned by {}", self.target, owner)?;
        }
        Ok(())
    }
}

/// Flag mutation sites whose target is one of the cell's read dependencies.
pub fn check(
    cell_id: CellId,
    symbols: &CellSymbols,
    sites: &[MutationSite],
    owner_of: impl Fn(&str) -> Option<CellId>,
) -> Vec<MutationWarning> {
    sites
        .iter()
        .filter(|site| symbols.read.contains(&site.target))
        .map(|site| MutationWarning {
            cell_id,
            target: site.target.clone(),
            kind: site.kind.clone(),
            line: site.line,
            owner: owner_of(&site.target),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(defined: &[&str], read: &[&str]) -> CellSymbols {
        CellSymbols {
            defined: defined.iter().map(|s| s.to_string()).collect(),
            read: read.iter().map(|s| s.to_string()).collect(),
            local: Default::default(),
        }
    }

    fn site(target: &str) -> MutationSite {
        MutationSite {
            target: target.to_string(),
            kind: MutationKind::MethodCall {
                method: "push".to_string(),
            },
            line: Some(2),
        }
    }

    #[test]
    fn test_flags_mutation_of_read_dependency() {
        let warnings = check(
            CellId::new(1),
            &symbols(&[], &["items"]),
            &[site("items")],
            |_| Some(CellId::new(0)),
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].owner, Some(CellId::new(0)));
        assert_eq!(
            warnings[0].to_string(),
            "cell_1 mutates `items`: calls `.push()` (line 2); `items` is owned by cell_0"
        );
    }

    #[test]
    fn test_ignores_own_definitions() {
        let warnings = check(
            CellId::new(1),
            &symbols(&["items"], &[]),
            &[site("items")],
            |_| None,
        );
        assert!(warnings.is_empty());
    }
}
