//! Parallel executor using Rayon.
//!
//! Cells of one dependency level have no edges between them, so their jobs
//! run concurrently. Results are committed one at a time, in plan order,
//! after the whole level has finished.

use std::sync::Arc;

use rayon::prelude::*;

use super::context::ExecutionCallback;
use super::executor::{report_commit, report_excluded};
use super::pass::{CommitOutcome, JobResult, PassReport, Prepared};
use crate::graph::CellId;
use crate::lang::LanguageBinding;
use crate::notebook::Notebook;

/// Parallel executor that runs independent cells concurrently.
#[derive(Default)]
pub struct ParallelExecutor {
    callback: Option<Arc<dyn ExecutionCallback>>,
}

impl ParallelExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution callback.
    pub fn set_callback(&mut self, callback: impl ExecutionCallback + 'static) {
        self.callback = Some(Arc::new(callback));
    }

    /// Start a pass over `changed` and run it level by level.
    pub fn run<L: LanguageBinding>(
        &self,
        notebook: &mut Notebook<L>,
        changed: impl IntoIterator<Item = CellId>,
    ) -> PassReport {
        let mut pass = notebook.begin_pass(changed);
        let span = pass.span().clone();
        let _enter = span.enter();
        let callback = self.callback.as_deref();
        report_excluded(callback, notebook, &pass);

        let binding = Arc::clone(notebook.binding());
        let levels = pass.plan().levels.clone();

        'levels: for (level_idx, level_cells) in levels.iter().enumerate() {
            if let Some(callback) = callback {
                callback.on_level_started(level_idx, level_cells.len());
            }

            let mut jobs = Vec::with_capacity(level_cells.len());
            for &id in level_cells {
                match notebook.prepare(&mut pass, id) {
                    Prepared::Job(job) => {
                        if let Some(callback) = callback {
                            callback.on_cell_started(id);
                        }
                        jobs.push(job);
                    }
                    Prepared::Blocked(reason) => {
                        if let Some(callback) = callback {
                            callback.on_cell_blocked(id, &reason);
                        }
                    }
                    Prepared::Skipped => {}
                    Prepared::Superseded => break 'levels,
                }
            }

            tracing::debug!("Level {}: running {} cells", level_idx, jobs.len());
            let results: Vec<JobResult<L::Value>> =
                jobs.into_par_iter().map(|job| job.run(&binding)).collect();

            for result in results {
                let id = result.cell_id;
                let duration = result.duration;
                let outcome = notebook.commit(&mut pass, result);
                report_commit(callback, notebook, id, outcome, duration);
                if outcome == CommitOutcome::Superseded {
                    break 'levels;
                }
            }

            if let Some(callback) = callback {
                callback.on_level_completed(level_idx);
            }
        }

        notebook.finish(pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, ExecutionPolicy};
    use crate::lang::script::{ScriptLanguage, Value};

    fn load(cells: &[&str], policy: ExecutionPolicy) -> Notebook<ScriptLanguage> {
        let cells = cells
            .iter()
            .enumerate()
            .map(|(i, source)| (CellId::new(i), source.to_string()))
            .collect();
        let config = EngineConfig::default().with_policy(policy);
        Notebook::load(ScriptLanguage, config, cells).unwrap().0
    }

    #[test]
    fn test_parallel_matches_linear() {
        let cells = [
            "a = 2;",
            "b = 3;",
            "c = a * b;",
            "d = a + c;",
            "e = b - 1;",
            "f = 1 / (e - 2);",
            "g = f + d;",
        ];
        let linear = load(&cells, ExecutionPolicy::Linear);
        let parallel = load(&cells, ExecutionPolicy::Parallel);

        for name in ["a", "b", "c", "d", "e", "g"] {
            assert_eq!(linear.value(name), parallel.value(name), "{}", name);
        }
        assert_eq!(parallel.value("d"), Some(&Value::Int(8)));
        assert_eq!(parallel.value("f"), None);
        assert_eq!(
            linear.diagnostics().blocked.len(),
            parallel.diagnostics().blocked.len()
        );
    }

    #[test]
    fn test_commit_order_follows_plan() {
        let mut nb = load(&["x = 1;", "y = 2;", "z = x + y;"], ExecutionPolicy::Parallel);
        let report = ParallelExecutor::new().run(&mut nb, [CellId::new(1), CellId::new(0)]);
        assert_eq!(
            report.ran,
            vec![CellId::new(0), CellId::new(1), CellId::new(2)]
        );
    }
}
