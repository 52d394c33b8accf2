//! Text document format and incremental reload.
//!
//! A document is plain text split into cells by marker lines:
//!
//! ```text
//! // %% inputs
//! a = 1;
//!
//! // %% double
//! b = a * 2;
//! ```
//!
//! A marker may carry a label. Unlabeled cells are named `cell<N>` after
//! their 1-based position.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::graph::CellId;
use crate::lang::LanguageBinding;
use crate::notebook::Notebook;

const MARKER: &str = "// %%";

/// One cell of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentCell {
    pub label: String,
    pub source: String,
}

/// Split a document into cells.
pub fn parse_document(text: &str) -> Vec<DocumentCell> {
    let mut raw: Vec<(Option<String>, Vec<&str>)> = vec![(None, Vec::new())];
    for line in text.lines() {
        if let Some(rest) = line.trim_start().strip_prefix(MARKER) {
            let label = rest.trim();
            let label = (!label.is_empty()).then(|| label.to_string());
            raw.push((label, Vec::new()));
        } else if let Some((_, lines)) = raw.last_mut() {
            lines.push(line);
        }
    }

    // Text before the first marker only counts when it holds something.
    let preamble_blank = raw[0].1.iter().all(|line| line.trim().is_empty());
    let skip = usize::from(preamble_blank);

    raw.into_iter()
        .skip(skip)
        .enumerate()
        .map(|(index, (label, lines))| DocumentCell {
            label: label.unwrap_or_else(|| format!("cell{}", index + 1)),
            source: trim_blank_lines(&lines),
        })
        .collect()
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end].join("\n")
}

/// One structural change between two revisions of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DocumentChange {
    Insert {
        id: CellId,
        source: String,
        position: usize,
    },
    Edit {
        id: CellId,
        source: String,
    },
    Delete {
        id: CellId,
    },
    Move {
        id: CellId,
        position: usize,
    },
}

/// Keeps cell ids stable across reloads of a document, keyed by label.
#[derive(Debug, Default)]
pub struct DocumentSync {
    ids: BTreeMap<String, CellId>,
    labels: BTreeMap<CellId, String>,
    /// Current cells in document order.
    current: Vec<(CellId, String)>,
    next_id: usize,
}

impl DocumentSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign ids to a first revision. Returns the load list.
    pub fn initial(&mut self, text: &str) -> Result<Vec<(CellId, String)>> {
        self.diff(text)?;
        Ok(self.current.clone())
    }

    /// Diff a new revision against the current one.
    ///
    /// Applying the returned changes in order to a notebook holding the
    /// current revision yields the new one.
    pub fn diff(&mut self, text: &str) -> Result<Vec<DocumentChange>> {
        let cells = parse_document(text);

        let mut seen = FxHashSet::default();
        for cell in &cells {
            if !seen.insert(cell.label.as_str()) {
                let id = self.ids.get(&cell.label).copied().unwrap_or(CellId::new(self.next_id));
                return Err(Error::DuplicateCell(id));
            }
        }

        let next: Vec<(CellId, String)> = cells
            .into_iter()
            .map(|cell| (self.id_for(&cell.label), cell.source))
            .collect();
        let next_ids: FxHashSet<CellId> = next.iter().map(|(id, _)| *id).collect();

        let mut changes = Vec::new();
        let mut order: Vec<CellId> = Vec::with_capacity(self.current.len());
        for (id, _) in &self.current {
            if next_ids.contains(id) {
                order.push(*id);
            } else {
                changes.push(DocumentChange::Delete { id: *id });
            }
        }

        let previous: BTreeMap<CellId, &String> =
            self.current.iter().map(|(id, source)| (*id, source)).collect();
        for (position, (id, source)) in next.iter().enumerate() {
            match previous.get(id) {
                None => {
                    order.insert(position, *id);
                    changes.push(DocumentChange::Insert {
                        id: *id,
                        source: source.clone(),
                        position,
                    });
                }
                Some(old_source) => {
                    if order.get(position) != Some(id) {
                        order.retain(|cell| cell != id);
                        order.insert(position, *id);
                        changes.push(DocumentChange::Move { id: *id, position });
                    }
                    if *old_source != source {
                        changes.push(DocumentChange::Edit {
                            id: *id,
                            source: source.clone(),
                        });
                    }
                }
            }
        }

        for change in &changes {
            if let DocumentChange::Delete { id } = change
                && let Some(label) = self.labels.remove(id)
            {
                self.ids.remove(&label);
            }
        }
        self.current = next;
        Ok(changes)
    }

    fn id_for(&mut self, label: &str) -> CellId {
        if let Some(&id) = self.ids.get(label) {
            return id;
        }
        let id = CellId::new(self.next_id);
        self.next_id += 1;
        self.ids.insert(label.to_string(), id);
        self.labels.insert(id, label.to_string());
        id
    }

    pub fn label(&self, id: CellId) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    pub fn id(&self, label: &str) -> Option<CellId> {
        self.ids.get(label).copied()
    }
}

/// Apply document changes to a notebook. Nothing runs.
pub fn apply_changes<L: LanguageBinding>(
    notebook: &mut Notebook<L>,
    changes: Vec<DocumentChange>,
) -> Result<()> {
    for change in changes {
        match change {
            DocumentChange::Insert {
                id,
                source,
                position,
            } => notebook.insert_cell(id, source, position)?,
            DocumentChange::Edit { id, source } => {
                notebook.edit_cell(id, source)?;
            }
            DocumentChange::Delete { id } => notebook.delete_cell(id)?,
            DocumentChange::Move { id, position } => notebook.move_cell(id, position)?,
        }
    }
    Ok(())
}
