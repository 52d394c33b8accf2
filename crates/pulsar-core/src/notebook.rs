//! The notebook: cells, graph, namespace and widgets kept consistent.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::analyze::{CellSymbols, MutationWarning, StaticAnalyzer, guard};
use crate::config::{EngineConfig, ExecutionPolicy};
use crate::diagnostics::Diagnostics;
use crate::error::{CellError, Error, Result};
use crate::execute::{
    AbortHandle, CellJob, CommitOutcome, JobOutcome, JobResult, LinearExecutor, ParallelExecutor,
    Pass, PassReport, Prepared,
};
use crate::graph::{CellId, Conflict, Edge, GraphEngine};
use crate::lang::{LanguageBinding, MutationSite};
use crate::scheduler::Scheduler;
use crate::state::{
    BlockedReason, CellRuntime, CellStatus, ExecutionContext, Generation, Symbol, UpstreamFailure,
};
use crate::widgets::{RegisteredWidget, WidgetRegistry, WidgetValue};

/// Source and analysis results of one cell.
struct CellRecord<P> {
    source: String,
    program: Option<Arc<P>>,
    symbols: CellSymbols,
    mutations: Vec<MutationSite>,
    parse_error: Option<CellError>,
    /// Bumped on every source change.
    revision: u64,
}

/// Read-only view of one cell.
#[derive(Debug)]
pub struct CellView<'a, V> {
    pub id: CellId,
    pub position: usize,
    pub source: &'a str,
    pub symbols: &'a CellSymbols,
    pub status: CellStatus,
    pub display: Option<&'a V>,
    /// Runtime error of the last run, or the cell's current static error.
    pub error: Option<&'a CellError>,
    pub blocked_by: Option<BlockedReason>,
    pub cancelled: bool,
    pub generation: Option<Generation>,
    pub revision: u64,
    pub duration: Option<Duration>,
}

/// A reactive notebook over a language binding.
///
/// Edits only record what changed; nothing runs until a pass is started with
/// [`run_dirty`](Self::run_dirty), [`run_cells`](Self::run_cells) or one of
/// the drivers in [`crate::execute`].
pub struct Notebook<L: LanguageBinding> {
    binding: Arc<L>,
    config: EngineConfig,
    analyzer: StaticAnalyzer,
    records: FxHashMap<CellId, CellRecord<L::Program>>,
    graph: GraphEngine,
    context: ExecutionContext<L::Value>,
    /// Parse, conflict and cycle errors by cell.
    static_errors: BTreeMap<CellId, CellError>,
    /// Cells changed since the last pass began.
    dirty: BTreeSet<CellId>,
    /// Cells planned by the current pass that have not been committed.
    pending: BTreeSet<CellId>,
    widgets: WidgetRegistry,
    current_abort: AbortHandle,
}

impl<L: LanguageBinding> Notebook<L> {
    /// Create an empty notebook.
    pub fn new(binding: impl Into<Arc<L>>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            binding: binding.into(),
            analyzer: StaticAnalyzer::new(config.local_prefix.clone()),
            config,
            records: FxHashMap::default(),
            graph: GraphEngine::new(),
            context: ExecutionContext::new(),
            static_errors: BTreeMap::new(),
            dirty: BTreeSet::new(),
            pending: BTreeSet::new(),
            widgets: WidgetRegistry::new(),
            current_abort: AbortHandle::new(),
        })
    }

    /// Build a notebook from an ordered cell list and run every cell.
    pub fn load(
        binding: impl Into<Arc<L>>,
        config: EngineConfig,
        cells: Vec<(CellId, String)>,
    ) -> Result<(Self, PassReport)> {
        let mut notebook = Self::new(binding, config)?;
        for (id, source) in cells {
            let position = notebook.len();
            notebook.insert_cell(id, source, position)?;
        }
        let report = notebook.run_all()?;
        Ok((notebook, report))
    }

    pub fn binding(&self) -> &Arc<L> {
        &self.binding
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.records.contains_key(&id)
    }

    // ---- edits -------------------------------------------------------------

    /// Insert a new cell at `position` in document order.
    pub fn insert_cell(&mut self, id: CellId, source: impl Into<String>, position: usize) -> Result<()> {
        if self.records.contains_key(&id) {
            return Err(Error::DuplicateCell(id));
        }
        let source = source.into();
        let analysis = self.analyzer.analyze(&*self.binding, &source);
        self.graph.add_cell(id, position, analysis.symbols.clone())?;
        self.context.add_cell(id);
        self.records.insert(
            id,
            CellRecord {
                source,
                program: analysis.program,
                symbols: analysis.symbols,
                mutations: analysis.mutations,
                parse_error: analysis.parse_error,
                revision: 0,
            },
        );
        tracing::debug!("Inserted {} at position {}", id, position);

        self.mark_dirty(id);
        self.refresh_static_errors();
        self.log_mutation_warnings(id);
        Ok(())
    }

    /// Replace a cell's source. Returns `false` when the source is unchanged.
    pub fn edit_cell(&mut self, id: CellId, source: impl Into<String>) -> Result<bool> {
        let source = source.into();
        let Some(record) = self.records.get(&id) else {
            return Err(Error::CellNotFound(id));
        };
        if record.source == source {
            return Ok(false);
        }

        let analysis = self.analyzer.analyze(&*self.binding, &source);
        let old_dependents = self.graph.dependents(id);
        let dropped: Vec<String> = record
            .symbols
            .defined
            .difference(&analysis.symbols.defined)
            .cloned()
            .collect();

        self.graph.update_cell(id, analysis.symbols.clone())?;
        for name in &dropped {
            self.context.namespace_mut().remove(name, id);
        }

        if let Some(record) = self.records.get_mut(&id) {
            record.source = source;
            record.program = analysis.program;
            record.symbols = analysis.symbols;
            record.mutations = analysis.mutations;
            record.parse_error = analysis.parse_error;
            record.revision += 1;
        }
        tracing::debug!("Edited {} (dropped names: {:?})", id, dropped);

        self.mark_dirty(id);
        for dependent in old_dependents {
            self.mark_dirty(dependent);
        }
        self.refresh_static_errors();
        self.log_mutation_warnings(id);
        Ok(true)
    }

    /// Remove a cell. Names it owned become unowned, and its former readers
    /// are re-run against whatever value remains (an external, or nothing).
    pub fn delete_cell(&mut self, id: CellId) -> Result<()> {
        if self.records.remove(&id).is_none() {
            return Err(Error::CellNotFound(id));
        }
        let dependents = self.graph.remove_cell(id)?;
        self.context.remove_cell(id);
        self.widgets.remove_cell(id);
        self.dirty.remove(&id);
        self.pending.remove(&id);
        tracing::debug!("Deleted {} ({} dependents)", id, dependents.len());

        for dependent in dependents {
            self.mark_dirty(dependent);
        }
        self.refresh_static_errors();
        Ok(())
    }

    /// Move a cell to `index` in document order. Nothing is re-run.
    pub fn move_cell(&mut self, id: CellId, index: usize) -> Result<()> {
        self.graph.move_cell(id, index)?;
        self.refresh_static_errors();
        Ok(())
    }

    /// Supply a value for a name no cell owns.
    pub fn set_external(&mut self, name: impl Into<String>, value: L::Value) {
        let name = name.into();
        self.context.namespace_mut().set_external(name.clone(), value);
        self.dirty_external_readers(&name);
    }

    pub fn remove_external(&mut self, name: &str) -> Option<L::Value> {
        let removed = self.context.namespace_mut().remove_external(name);
        if removed.is_some() {
            self.dirty_external_readers(name);
        }
        removed
    }

    fn dirty_external_readers(&mut self, name: &str) {
        if self.graph.is_claimed(name) {
            return;
        }
        for reader in self.graph.readers(name) {
            self.mark_dirty(reader);
        }
    }

    /// Store a widget value and dirty the cell that owns the widget.
    ///
    /// Returns `false` when the value is unchanged.
    pub fn update_widget(&mut self, widget_id: &str, value: WidgetValue) -> Result<bool> {
        match self.widgets.set_value(widget_id, value)? {
            Some(owner) => {
                tracing::debug!("Widget '{}' changed, dirtying {}", widget_id, owner);
                self.mark_dirty(owner);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Signal the abort handle of the current pass.
    pub fn interrupt(&self) {
        tracing::debug!("Interrupt requested");
        self.current_abort.abort();
    }

    fn mark_dirty(&mut self, id: CellId) {
        if self.records.contains_key(&id) {
            self.dirty.insert(id);
            self.context.mark_stale(id);
        }
    }

    fn refresh_static_errors(&mut self) {
        let mut errors = self.graph.structural_errors();
        for (&id, record) in &self.records {
            if let Some(error) = &record.parse_error {
                errors.insert(id, error.clone());
            }
        }

        let changed: Vec<CellId> = errors
            .keys()
            .chain(self.static_errors.keys())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|id| errors.get(id) != self.static_errors.get(id))
            .collect();
        for &id in &changed {
            if let Some(error) = errors.get(&id) {
                tracing::warn!("{}: {}", id, error);
            }
        }

        self.static_errors = errors;
        for id in changed {
            self.mark_dirty(id);
        }
    }

    fn log_mutation_warnings(&self, id: CellId) {
        for warning in self.cell_mutation_warnings(id) {
            tracing::warn!("{}", warning);
        }
    }

    // ---- running -----------------------------------------------------------

    /// Run every cell dirtied since the last pass.
    pub fn run_dirty(&mut self) -> Result<PassReport> {
        self.run_cells(Vec::new())
    }

    /// Run `ids` and everything downstream of them, plus any dirty cells.
    pub fn run_cells(&mut self, ids: impl IntoIterator<Item = CellId>) -> Result<PassReport> {
        let ids: Vec<CellId> = ids.into_iter().collect();
        if let Some(&missing) = ids.iter().find(|id| !self.records.contains_key(id)) {
            return Err(Error::CellNotFound(missing));
        }
        let report = match self.config.policy {
            ExecutionPolicy::Linear => LinearExecutor::new().run(self, ids),
            ExecutionPolicy::Parallel => ParallelExecutor::new().run(self, ids),
        };
        Ok(report)
    }

    /// Run every cell.
    pub fn run_all(&mut self) -> Result<PassReport> {
        let all = self.graph.order().to_vec();
        self.run_cells(all)
    }

    /// Start a pass over `changed` plus every dirty or still-pending cell.
    ///
    /// Bumps the generation, so results of any earlier pass still in flight
    /// will be dropped on commit.
    pub fn begin_pass(&mut self, changed: impl IntoIterator<Item = CellId>) -> Pass {
        let mut seeds: BTreeSet<CellId> = changed
            .into_iter()
            .filter(|id| self.records.contains_key(id))
            .collect();
        seeds.append(&mut self.dirty);
        seeds.append(&mut self.pending);

        let generation = self.context.next_generation();
        if self.config.cancel_superseded {
            self.current_abort.abort();
        }
        let abort = AbortHandle::new();
        self.current_abort = abort.clone();

        let static_errors = &self.static_errors;
        let plan = Scheduler::plan(&self.graph, seeds, |id| static_errors.contains_key(&id));
        let pass = Pass::new(generation, plan, abort);
        let span = pass.span().clone();
        let _enter = span.enter();

        for &id in &pass.plan().order {
            self.context.mark_stale(id);
        }
        for &id in &pass.plan().excluded {
            let Some(error) = self.static_errors.get(&id).cloned() else {
                continue;
            };
            let defined = self.defined_names(id);
            self.context.fail(id, generation, error, &defined);
        }
        self.pending = pass.plan().order.iter().copied().collect();

        tracing::debug!(
            "Began pass: {} to run, {} excluded",
            pass.plan().order.len(),
            pass.plan().excluded.len()
        );
        pass
    }

    /// Decide what to do with the next cell of a pass.
    pub fn prepare(&mut self, pass: &mut Pass, id: CellId) -> Prepared<L> {
        let generation = pass.generation();
        if generation < self.context.generation() {
            pass.report.superseded = true;
            return Prepared::Superseded;
        }
        let Some(record) = self.records.get(&id) else {
            self.pending.remove(&id);
            return Prepared::Skipped;
        };
        let Some(program) = record.program.clone() else {
            self.pending.remove(&id);
            return Prepared::Skipped;
        };

        if let Some(reason) = self.upstream_failure(id) {
            let defined = record.symbols.defined.clone();
            self.context.block(id, generation, reason, &defined);
            self.pending.remove(&id);
            pass.report.blocked.push(id);
            tracing::debug!(parent: pass.span(), "{} blocked: {}", id, reason);
            return Prepared::Blocked(reason);
        }

        let namespace = self.context.namespace();
        let inputs: FxHashMap<String, L::Value> = record
            .symbols
            .read
            .iter()
            .filter_map(|name| namespace.get(name).map(|value| (name.clone(), value.clone())))
            .collect();
        let widget_values: FxHashMap<String, WidgetValue> = self
            .widgets
            .values()
            .iter()
            .filter(|(widget_id, _)| self.widgets.owner(widget_id) == Some(id))
            .map(|(widget_id, value)| (widget_id.clone(), value.clone()))
            .collect();
        let revision = record.revision;

        self.context.mark_running(id, generation);
        Prepared::Job(CellJob {
            cell_id: id,
            generation,
            revision,
            program,
            inputs,
            widget_values,
            abort: pass.abort_handle().clone(),
        })
    }

    fn upstream_failure(&self, id: CellId) -> Option<BlockedReason> {
        self.graph.dependencies(id).into_iter().find_map(|upstream| {
            let runtime = self.context.runtime(upstream)?;
            let failure = match runtime.status {
                CellStatus::Error | CellStatus::Blocked => UpstreamFailure::Error,
                CellStatus::Stale if runtime.cancelled => UpstreamFailure::Cancelled,
                _ => return None,
            };
            Some(BlockedReason { upstream, failure })
        })
    }

    /// Apply a job result. The only place cell results reach the namespace.
    pub fn commit(&mut self, pass: &mut Pass, result: JobResult<L::Value>) -> CommitOutcome {
        let id = result.cell_id;
        let current = self.context.generation();
        let revision = self.records.get(&id).map(|record| record.revision);
        if result.generation != current
            || result.generation != pass.generation()
            || revision != Some(result.revision)
        {
            tracing::debug!(
                parent: pass.span(),
                "Dropped result of {} from {} (current {})",
                id,
                result.generation,
                current
            );
            if result.generation < current {
                pass.report.superseded = true;
            }
            return CommitOutcome::Superseded;
        }

        let defined = self.defined_names(id);
        self.pending.remove(&id);
        match result.outcome {
            JobOutcome::Completed(output) => {
                self.context.complete(
                    id,
                    result.generation,
                    output.bindings,
                    output.display,
                    &defined,
                    result.duration,
                );
                self.widgets.register(id, output.widgets);
                pass.report.ran.push(id);
                tracing::debug!(parent: pass.span(), "Committed {} in {:?}", id, result.duration);
                CommitOutcome::Published
            }
            JobOutcome::Failed(message) => {
                tracing::debug!(parent: pass.span(), "{} failed: {}", id, message);
                self.context
                    .fail(id, result.generation, CellError::Runtime { message }, &defined);
                pass.report.errored.push(id);
                CommitOutcome::Failed
            }
            JobOutcome::Cancelled => {
                tracing::debug!(parent: pass.span(), "{} cancelled", id);
                self.context.cancel(id, result.generation, &defined);
                pass.report.cancelled.push(id);
                CommitOutcome::Cancelled
            }
        }
    }

    /// Close a pass and return its report.
    pub fn finish(&mut self, mut pass: Pass) -> PassReport {
        if pass.generation() < self.context.generation() {
            pass.report.superseded = true;
        }
        pass.report.duration = pass.elapsed();
        let report = pass.report.clone();
        tracing::info!(
            parent: pass.span(),
            "Pass finished in {:?}: {} ran, {} errored, {} blocked, {} excluded{}",
            report.duration,
            report.ran.len(),
            report.errored.len(),
            report.blocked.len(),
            report.excluded.len(),
            if report.superseded { " (superseded)" } else { "" }
        );
        report
    }

    fn defined_names(&self, id: CellId) -> BTreeSet<String> {
        self.records
            .get(&id)
            .map(|record| record.symbols.defined.clone())
            .unwrap_or_default()
    }

    // ---- queries -----------------------------------------------------------

    pub fn cell(&self, id: CellId) -> Option<CellView<'_, L::Value>> {
        let record = self.records.get(&id)?;
        let runtime = self.context.runtime(id)?;
        Some(self.view(id, record, runtime))
    }

    /// All cells in document order.
    pub fn cells(&self) -> Vec<CellView<'_, L::Value>> {
        self.graph
            .order()
            .iter()
            .filter_map(|&id| self.cell(id))
            .collect()
    }

    fn view<'a>(
        &'a self,
        id: CellId,
        record: &'a CellRecord<L::Program>,
        runtime: &'a CellRuntime<L::Value>,
    ) -> CellView<'a, L::Value> {
        CellView {
            id,
            position: self.graph.position(id).unwrap_or_default(),
            source: &record.source,
            symbols: &record.symbols,
            status: runtime.status,
            display: runtime.display.as_ref(),
            error: runtime.error.as_ref().or_else(|| self.static_errors.get(&id)),
            blocked_by: runtime.blocked_by,
            cancelled: runtime.cancelled,
            generation: runtime.generation,
            revision: record.revision,
            duration: runtime.duration,
        }
    }

    /// Run state of a cell.
    pub fn runtime(&self, id: CellId) -> Option<&CellRuntime<L::Value>> {
        self.context.runtime(id)
    }

    /// Current error of a cell: runtime first, then static.
    pub fn cell_error(&self, id: CellId) -> Option<&CellError> {
        self.context
            .runtime(id)
            .and_then(|runtime| runtime.error.as_ref())
            .or_else(|| self.static_errors.get(&id))
    }

    /// Usable value of a global name.
    pub fn value(&self, name: &str) -> Option<&L::Value> {
        self.context.namespace().get(name)
    }

    pub fn symbol(&self, name: &str) -> Symbol<'_, L::Value> {
        self.context.namespace().lookup(name)
    }

    /// Published names of one cell, sorted.
    pub fn published_by(&self, id: CellId) -> Vec<(&str, &L::Value)> {
        self.context.namespace().published_by(id)
    }

    /// Generation of the most recently started pass.
    pub fn generation(&self) -> Generation {
        self.context.generation()
    }

    /// Order in which a full run would execute the schedulable cells.
    pub fn execution_order(&self) -> Vec<CellId> {
        let static_errors = &self.static_errors;
        Scheduler::plan(&self.graph, self.graph.order().to_vec(), |id| {
            static_errors.contains_key(&id)
        })
        .order
    }

    pub fn dependencies(&self, id: CellId) -> Result<Vec<CellId>> {
        self.require(id)?;
        Ok(self.graph.dependencies(id))
    }

    pub fn dependents(&self, id: CellId) -> Result<Vec<CellId>> {
        self.require(id)?;
        Ok(self.graph.dependents(id))
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.graph.edges()
    }

    pub fn graph(&self) -> &GraphEngine {
        &self.graph
    }

    fn require(&self, id: CellId) -> Result<()> {
        if self.records.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::CellNotFound(id))
        }
    }

    /// Cells waiting for the next pass, in id order.
    pub fn dirty_cells(&self) -> Vec<CellId> {
        self.dirty.iter().copied().collect()
    }

    pub fn widgets(&self) -> Vec<RegisteredWidget> {
        self.widgets.widgets()
    }

    pub fn static_error(&self, id: CellId) -> Option<&CellError> {
        self.static_errors.get(&id)
    }

    pub fn conflicts(&self) -> Vec<Conflict> {
        self.graph.conflicts()
    }

    pub fn cycles(&self) -> Vec<Vec<CellId>> {
        self.graph.cycles().to_vec()
    }

    fn cell_mutation_warnings(&self, id: CellId) -> Vec<MutationWarning> {
        let Some(record) = self.records.get(&id) else {
            return Vec::new();
        };
        guard::check(id, &record.symbols, &record.mutations, |name| {
            self.graph.owner(name)
        })
    }

    /// Mutation-guard findings for every cell, in document order.
    pub fn mutation_warnings(&self) -> Vec<MutationWarning> {
        self.graph
            .order()
            .iter()
            .flat_map(|&id| self.cell_mutation_warnings(id))
            .collect()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let mut diagnostics = Diagnostics::default();
        for &id in self.graph.order() {
            if let Some(CellError::Parse { message, line }) =
                self.records.get(&id).and_then(|r| r.parse_error.as_ref())
            {
                diagnostics.push_parse_error(id, message, *line);
            }
            if let Some(runtime) = self.context.runtime(id) {
                if let (CellStatus::Error, Some(CellError::Runtime { message })) =
                    (runtime.status, &runtime.error)
                {
                    diagnostics.push_runtime_error(id, message);
                }
                if let (CellStatus::Blocked, Some(reason)) = (runtime.status, runtime.blocked_by) {
                    diagnostics.push_blocked(id, reason);
                }
            }
        }
        diagnostics.conflicts = self.conflicts();
        diagnostics.cycles = self.cycles();
        diagnostics.mutation_warnings = self.mutation_warnings();
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::script::{ScriptLanguage, Value};

    fn notebook(cells: &[&str]) -> (Notebook<ScriptLanguage>, Vec<CellId>) {
        let ids: Vec<CellId> = (0..cells.len()).map(CellId::new).collect();
        let cells = ids
            .iter()
            .zip(cells)
            .map(|(&id, source)| (id, source.to_string()))
            .collect();
        let (notebook, _) = Notebook::load(ScriptLanguage, EngineConfig::default(), cells).unwrap();
        (notebook, ids)
    }

    #[test]
    fn test_load_runs_everything() {
        let (nb, ids) = notebook(&["a = 1;", "b = a + 1;"]);
        assert_eq!(nb.value("b"), Some(&Value::Int(2)));
        assert_eq!(nb.cell(ids[1]).unwrap().status, CellStatus::Ok);
        assert_eq!(nb.generation(), Generation(1));
    }

    #[test]
    fn test_edit_same_source_is_noop() {
        let (mut nb, ids) = notebook(&["a = 1;"]);
        assert!(!nb.edit_cell(ids[0], "a = 1;").unwrap());
        assert!(nb.dirty_cells().is_empty());
    }

    #[test]
    fn test_edit_dirties_old_dependents() {
        let (mut nb, ids) = notebook(&["a = 1;", "b = a;"]);
        nb.edit_cell(ids[0], "z = 1;").unwrap();
        assert_eq!(nb.dirty_cells(), vec![ids[0], ids[1]]);
        assert_eq!(nb.value("a"), None);

        let report = nb.run_dirty().unwrap();
        assert_eq!(report.ran, vec![ids[0]]);
        assert_eq!(report.errored, vec![ids[1]]);
    }

    #[test]
    fn test_runtime_error_blocks_descendants_only() {
        let (nb, ids) = notebook(&["a = 1 / 0;", "b = a;", "c = b;", "d = 4;"]);
        assert_eq!(nb.cell(ids[0]).unwrap().status, CellStatus::Error);
        assert_eq!(nb.cell(ids[1]).unwrap().status, CellStatus::Blocked);
        assert_eq!(
            nb.cell(ids[2]).unwrap().blocked_by,
            Some(BlockedReason {
                upstream: ids[1],
                failure: UpstreamFailure::Error
            })
        );
        assert_eq!(nb.value("d"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_external_value_is_read() {
        let (mut nb, ids) = notebook(&["y = x * 2;"]);
        assert_eq!(nb.cell(ids[0]).unwrap().status, CellStatus::Error);

        nb.set_external("x", Value::Int(21));
        assert_eq!(nb.dirty_cells(), vec![ids[0]]);
        nb.run_dirty().unwrap();
        assert_eq!(nb.value("y"), Some(&Value::Int(42)));
    }

    #[test]
    fn test_unknown_cell_errors() {
        let (mut nb, _) = notebook(&["a = 1;"]);
        let missing = CellId::new(99);
        assert!(matches!(nb.edit_cell(missing, "a = 2;"), Err(Error::CellNotFound(_))));
        assert!(matches!(nb.delete_cell(missing), Err(Error::CellNotFound(_))));
        assert!(matches!(nb.run_cells([missing]), Err(Error::CellNotFound(_))));
        assert!(matches!(
            nb.insert_cell(CellId::new(0), "b = 1;", 0),
            Err(Error::DuplicateCell(_))
        ));
    }

    #[test]
    fn test_move_does_not_dirty() {
        let (mut nb, ids) = notebook(&["a = 1;", "b = 2;"]);
        nb.move_cell(ids[1], 0).unwrap();
        assert!(nb.dirty_cells().is_empty());
        assert_eq!(nb.cells()[0].id, ids[1]);
    }

    #[test]
    fn test_stale_pass_is_superseded() {
        let (mut nb, ids) = notebook(&["a = 1;"]);
        let mut old = nb.begin_pass([ids[0]]);
        let Prepared::Job(job) = nb.prepare(&mut old, ids[0]) else {
            panic!("expected a job");
        };
        let result = job.run(&ScriptLanguage);

        nb.edit_cell(ids[0], "a = 2;").unwrap();
        let new = nb.begin_pass(Vec::new());
        assert_eq!(nb.commit(&mut old, result), CommitOutcome::Superseded);
        assert!(nb.finish(old).superseded);

        let mut new = new;
        for id in new.order().to_vec() {
            if let Prepared::Job(job) = nb.prepare(&mut new, id) {
                let result = job.run(&ScriptLanguage);
                nb.commit(&mut new, result);
            }
        }
        nb.finish(new);
        assert_eq!(nb.value("a"), Some(&Value::Int(2)));
    }
}
