//! Scripting-language boundary.
//!
//! The engine never interprets cell code itself. A [`LanguageBinding`] reports
//! which names a cell defines and reads, and runs a cell body against a set of
//! input values. Everything else (ownership, ordering, invalidation) is
//! language-independent.
//!
//! [`script`] provides the bundled binding: a small Rust-flavoured expression
//! language parsed with `syn`.

pub mod script;

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::execute::AbortHandle;
use crate::widgets::{WidgetDef, WidgetValue};

/// A language the engine can analyze and execute.
pub trait LanguageBinding: Send + Sync + 'static {
    /// Parsed form of one cell, cached between analysis and execution.
    type Program: Send + Sync + 'static;
    /// Runtime value published into the shared namespace.
    type Value: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Human-readable language name.
    fn name(&self) -> &str;

    /// Parse one cell's source.
    fn parse(&self, source: &str) -> Result<Self::Program, ParseFailure>;

    /// Report the names a parsed cell defines and reads.
    ///
    /// Must not execute anything.
    fn analyze(&self, program: &Self::Program) -> Analysis;

    /// Run a cell body against the supplied inputs.
    fn execute(
        &self,
        program: &Self::Program,
        request: &ExecRequest<'_, Self::Value>,
    ) -> Result<ExecOutput<Self::Value>, ExecFailure>;
}

/// A cell that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub message: String,
    /// 1-based line within the cell, when known.
    pub line: Option<usize>,
}

impl ParseFailure {
    pub fn new(message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Names reported by a binding for one cell, before the engine applies its
/// local-name convention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    /// Names bound at the cell's top level.
    pub defined: BTreeSet<String>,
    /// Free names the cell references but does not define.
    pub read: BTreeSet<String>,
    /// Names the language itself considers private to the cell.
    pub local: BTreeSet<String>,
    /// Syntactic in-place mutations of names not bound in a nested scope.
    pub mutations: Vec<MutationSite>,
}

/// How a cell mutates a value in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationKind {
    /// A call to a known in-place mutating method, e.g. `xs.push(1)`.
    MethodCall { method: String },
    /// Assignment through a field, e.g. `p.x = 1`.
    FieldAssign { field: String },
    /// Assignment through an index, e.g. `xs[0] = 1`.
    IndexAssign,
    /// Assignment to a name from inside a nested scope the cell does not define.
    Reassign,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::MethodCall { method } => write!(f, "calls `.{}()`", method),
            MutationKind::FieldAssign { field } => write!(f, "assigns field `{}`", field),
            MutationKind::IndexAssign => f.write_str("assigns through an index"),
            MutationKind::Reassign => f.write_str("reassigns it"),
        }
    }
}

/// One syntactic in-place mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationSite {
    /// Root name being mutated.
    pub target: String,
    pub kind: MutationKind,
    pub line: Option<usize>,
}

/// Everything a binding needs to run one cell.
pub struct ExecRequest<'a, V> {
    /// Current values of the cell's read names. Names with no value are absent.
    pub inputs: &'a FxHashMap<String, V>,
    /// Current widget values, keyed by widget id.
    pub widget_values: &'a FxHashMap<String, WidgetValue>,
    /// Cooperative cancellation flag.
    pub abort: &'a AbortHandle,
}

/// Result of a successful cell run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutput<V> {
    /// Top-level bindings after the run. The engine publishes only the
    /// cell's defined names.
    pub bindings: Vec<(String, V)>,
    /// Designated display slot (the cell's trailing expression).
    pub display: Option<V>,
    /// Widgets the cell created during this run.
    pub widgets: Vec<WidgetDef>,
}

impl<V> Default for ExecOutput<V> {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
            display: None,
            widgets: Vec::new(),
        }
    }
}

/// Why a cell run did not produce output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecFailure {
    /// The cell raised an error.
    Runtime(String),
    /// The run observed its abort handle and stopped.
    Cancelled,
}

impl fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecFailure::Runtime(message) => f.write_str(message),
            ExecFailure::Cancelled => f.write_str("cancelled"),
        }
    }
}
