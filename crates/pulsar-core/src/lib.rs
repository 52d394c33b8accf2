//! Core engine for Pulsar reactive computational documents.
//!
//! This crate provides:
//! - Static analysis of cells into defined, read and local name sets
//! - An incrementally maintained dependency graph with conflict and cycle detection
//! - Scheduling of minimal re-run sets in deterministic topological order
//! - A generation-tagged namespace where superseded results are dropped
//! - Linear, parallel and async execution drivers
//! - A widget bridge and a diagnostics surface
//!
//! # Example
//!
//! ```
//! use pulsar_core::{CellId, EngineConfig, Notebook};
//! use pulsar_core::lang::script::{ScriptLanguage, Value};
//!
//! let cells = vec![
//!     (CellId::new(0), "a = 1;".to_string()),
//!     (CellId::new(1), "b = a + 1;".to_string()),
//! ];
//! let (mut notebook, _) = Notebook::load(ScriptLanguage, EngineConfig::default(), cells)?;
//! assert_eq!(notebook.value("b"), Some(&Value::Int(2)));
//!
//! notebook.edit_cell(CellId::new(0), "a = 10;")?;
//! let report = notebook.run_dirty()?;
//! assert_eq!(report.ran, vec![CellId::new(0), CellId::new(1)]);
//! assert_eq!(notebook.value("b"), Some(&Value::Int(11)));
//! # Ok::<(), pulsar_core::Error>(())
//! ```

pub mod analyze;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod execute;
pub mod graph;
pub mod lang;
pub mod notebook;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod widgets;

pub use analyze::{CellSymbols, MutationWarning, StaticAnalyzer};
pub use config::{EngineConfig, ExecutionPolicy};
pub use diagnostics::Diagnostics;
pub use document::{DocumentChange, DocumentSync, apply_changes, parse_document};
pub use error::{CellError, Error, Result};
pub use execute::{
    AbortHandle, CommitOutcome, ExecutionCallback, LinearExecutor, ParallelExecutor, PassReport,
};
pub use graph::{CellId, Conflict, Edge, GraphEngine};
pub use lang::LanguageBinding;
pub use notebook::{CellView, Notebook};
pub use scheduler::{ExecutionPlan, Scheduler};
pub use session::{EngineEvent, PassHandle, Session};
pub use state::{BlockedReason, CellStatus, Generation, Symbol};
pub use widgets::{WidgetDef, WidgetValue};
