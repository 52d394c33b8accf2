//! Linear executor for sequential cell execution.
//!
//! Executes cells in plan order, one at a time.

use std::sync::Arc;

use super::context::ExecutionCallback;
use super::pass::{CommitOutcome, Pass, PassReport, Prepared};
use crate::graph::CellId;
use crate::lang::LanguageBinding;
use crate::notebook::Notebook;

/// Linear executor that runs cells sequentially in dependency order.
#[derive(Default)]
pub struct LinearExecutor {
    /// Execution callback for progress reporting
    callback: Option<Box<dyn ExecutionCallback>>,
}

impl LinearExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution callback.
    pub fn set_callback(&mut self, callback: impl ExecutionCallback + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// Start a pass over `changed` and drive it to completion.
    pub fn run<L: LanguageBinding>(
        &self,
        notebook: &mut Notebook<L>,
        changed: impl IntoIterator<Item = CellId>,
    ) -> PassReport {
        let pass = notebook.begin_pass(changed);
        self.drive(notebook, pass)
    }

    /// Drive an already started pass.
    pub fn drive<L: LanguageBinding>(&self, notebook: &mut Notebook<L>, mut pass: Pass) -> PassReport {
        let span = pass.span().clone();
        let _enter = span.enter();
        let callback = self.callback.as_deref();
        report_excluded(callback, notebook, &pass);

        let binding = Arc::clone(notebook.binding());
        for id in pass.order().to_vec() {
            match notebook.prepare(&mut pass, id) {
                Prepared::Job(job) => {
                    if let Some(callback) = callback {
                        callback.on_cell_started(id);
                    }
                    let result = job.run(&binding);
                    let duration = result.duration;
                    let outcome = notebook.commit(&mut pass, result);
                    report_commit(callback, notebook, id, outcome, duration);
                    if outcome == CommitOutcome::Superseded {
                        break;
                    }
                }
                Prepared::Blocked(reason) => {
                    if let Some(callback) = callback {
                        callback.on_cell_blocked(id, &reason);
                    }
                }
                Prepared::Skipped => {}
                Prepared::Superseded => break,
            }
        }

        notebook.finish(pass)
    }
}

/// Tell the callback about cells a pass excluded for static errors.
pub(crate) fn report_excluded<L: LanguageBinding>(
    callback: Option<&dyn ExecutionCallback>,
    notebook: &Notebook<L>,
    pass: &Pass,
) {
    let Some(callback) = callback else {
        return;
    };
    for &id in &pass.plan().excluded {
        if let Some(error) = notebook.cell_error(id) {
            callback.on_cell_error(id, error);
        }
    }
}

pub(crate) fn report_commit<L: LanguageBinding>(
    callback: Option<&dyn ExecutionCallback>,
    notebook: &Notebook<L>,
    id: CellId,
    outcome: CommitOutcome,
    duration: std::time::Duration,
) {
    let Some(callback) = callback else {
        return;
    };
    match outcome {
        CommitOutcome::Published => callback.on_cell_completed(id, duration),
        CommitOutcome::Failed => {
            if let Some(error) = notebook.cell_error(id) {
                callback.on_cell_error(id, error);
            }
        }
        CommitOutcome::Cancelled | CommitOutcome::Superseded => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::config::EngineConfig;
    use crate::error::CellError;
    use crate::lang::script::ScriptLanguage;
    use crate::state::BlockedReason;

    #[derive(Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl ExecutionCallback for Recorder {
        fn on_cell_started(&self, cell_id: CellId) {
            self.events.lock().unwrap().push(format!("start {}", cell_id));
        }
        fn on_cell_completed(&self, cell_id: CellId, _: Duration) {
            self.events.lock().unwrap().push(format!("done {}", cell_id));
        }
        fn on_cell_error(&self, cell_id: CellId, error: &CellError) {
            self.events
                .lock()
                .unwrap()
                .push(format!("error {} {}", cell_id, error.kind()));
        }
        fn on_cell_blocked(&self, cell_id: CellId, _: &BlockedReason) {
            self.events.lock().unwrap().push(format!("blocked {}", cell_id));
        }
    }

    fn notebook(cells: &[&str]) -> Notebook<ScriptLanguage> {
        let mut notebook = Notebook::new(ScriptLanguage, EngineConfig::default()).unwrap();
        for (i, source) in cells.iter().enumerate() {
            notebook.insert_cell(CellId::new(i), *source, i).unwrap();
        }
        notebook
    }

    #[test]
    fn test_callbacks_follow_execution() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut executor = LinearExecutor::new();
        executor.set_callback(Recorder {
            events: events.clone(),
        });

        let mut nb = notebook(&["b = a + 1;", "a = 1;", "c = missing;", "d = c;"]);
        let report = executor.run(&mut nb, Vec::new());

        assert_eq!(report.ran, vec![CellId::new(1), CellId::new(0)]);
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "start cell_1",
                "done cell_1",
                "start cell_0",
                "done cell_0",
                "start cell_2",
                "error cell_2 runtime",
                "blocked cell_3",
            ]
        );
    }

    #[test]
    fn test_excluded_cells_are_reported() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut executor = LinearExecutor::new();
        executor.set_callback(Recorder {
            events: events.clone(),
        });

        let mut nb = notebook(&["x = 1;", "x = 2;"]);
        let report = executor.run(&mut nb, Vec::new());

        assert!(report.ran.is_empty());
        assert_eq!(report.excluded, vec![CellId::new(0), CellId::new(1)]);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["error cell_0 conflict", "error cell_1 conflict"]
        );
    }
}
