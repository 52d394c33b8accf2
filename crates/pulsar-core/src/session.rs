//! Async notebook session on Tokio.
//!
//! A [`Session`] owns a notebook behind a mutex. Every edit starts a new pass
//! on a spawned task. Each cell job runs on the blocking pool with the lock
//! released, so an edit arriving mid-pass is applied immediately and starts a
//! newer generation; the older pass notices at its next prepare or commit and
//! stops, and its late result is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{CellError, Error, Result};
use crate::execute::{CommitOutcome, Pass, PassReport, Prepared};
use crate::graph::CellId;
use crate::lang::LanguageBinding;
use crate::notebook::Notebook;
use crate::state::{BlockedReason, Generation};
use crate::widgets::WidgetValue;

/// Progress events broadcast by a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    PassStarted {
        generation: Generation,
        cells: Vec<CellId>,
    },
    CellStarted {
        cell_id: CellId,
        generation: Generation,
    },
    CellCompleted {
        cell_id: CellId,
        generation: Generation,
        display: Option<String>,
    },
    CellFailed {
        cell_id: CellId,
        generation: Generation,
        error: CellError,
    },
    CellBlocked {
        cell_id: CellId,
        generation: Generation,
        reason: BlockedReason,
    },
    CellCancelled {
        cell_id: CellId,
        generation: Generation,
    },
    /// A newer pass started; this one stopped early.
    PassSuperseded { generation: Generation },
    PassFinished { report: PassReport },
}

/// Handle to a running pass.
pub type PassHandle = JoinHandle<Result<PassReport>>;

fn lock_error<T>(e: PoisonError<T>) -> Error {
    Error::InvalidOperation(format!("Notebook lock poisoned (thread panicked): {}", e))
}

/// A notebook driven asynchronously.
pub struct Session<L: LanguageBinding> {
    notebook: Arc<Mutex<Notebook<L>>>,
    events: broadcast::Sender<EngineEvent>,
}

impl<L: LanguageBinding> Clone for Session<L> {
    fn clone(&self) -> Self {
        Self {
            notebook: Arc::clone(&self.notebook),
            events: self.events.clone(),
        }
    }
}

impl<L: LanguageBinding> Session<L> {
    pub fn new(notebook: Notebook<L>) -> Self {
        let (events, _) = broadcast::channel(notebook.config().event_capacity);
        Self {
            notebook: Arc::new(Mutex::new(notebook)),
            events,
        }
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn acquire_lock(&self) -> Result<MutexGuard<'_, Notebook<L>>> {
        self.notebook.lock().map_err(lock_error)
    }

    /// Read the notebook. The lock is held only for the duration of `f`.
    pub fn with_notebook<R>(&self, f: impl FnOnce(&Notebook<L>) -> R) -> Result<R> {
        Ok(f(&*self.acquire_lock()?))
    }

    /// Edit a cell and start a pass for the change.
    pub fn edit_cell(&self, id: CellId, source: impl Into<String>) -> Result<PassHandle> {
        let mut notebook = self.acquire_lock()?;
        notebook.edit_cell(id, source)?;
        Ok(self.launch(notebook, Vec::new()))
    }

    pub fn insert_cell(
        &self,
        id: CellId,
        source: impl Into<String>,
        position: usize,
    ) -> Result<PassHandle> {
        let mut notebook = self.acquire_lock()?;
        notebook.insert_cell(id, source, position)?;
        Ok(self.launch(notebook, Vec::new()))
    }

    pub fn delete_cell(&self, id: CellId) -> Result<PassHandle> {
        let mut notebook = self.acquire_lock()?;
        notebook.delete_cell(id)?;
        Ok(self.launch(notebook, Vec::new()))
    }

    pub fn update_widget(&self, widget_id: &str, value: WidgetValue) -> Result<PassHandle> {
        let mut notebook = self.acquire_lock()?;
        notebook.update_widget(widget_id, value)?;
        Ok(self.launch(notebook, Vec::new()))
    }

    pub fn set_external(&self, name: impl Into<String>, value: L::Value) -> Result<PassHandle> {
        let mut notebook = self.acquire_lock()?;
        notebook.set_external(name, value);
        Ok(self.launch(notebook, Vec::new()))
    }

    pub fn run_dirty(&self) -> Result<PassHandle> {
        let notebook = self.acquire_lock()?;
        Ok(self.launch(notebook, Vec::new()))
    }

    pub fn run_all(&self) -> Result<PassHandle> {
        let notebook = self.acquire_lock()?;
        let all = notebook.graph().order().to_vec();
        Ok(self.launch(notebook, all))
    }

    /// Abort the current pass. Cells that observe the signal are recorded as
    /// cancelled and their dependents as blocked.
    pub fn interrupt(&self) -> Result<()> {
        self.acquire_lock()?.interrupt();
        Ok(())
    }

    /// Begin a pass while still holding the edit's lock, then drive it on a
    /// spawned task.
    fn launch(&self, mut notebook: MutexGuard<'_, Notebook<L>>, changed: Vec<CellId>) -> PassHandle {
        let pass = notebook.begin_pass(changed);
        drop(notebook);

        let _ = self.events.send(EngineEvent::PassStarted {
            generation: pass.generation(),
            cells: pass.order().to_vec(),
        });
        tokio::spawn(drive(Arc::clone(&self.notebook), self.events.clone(), pass))
    }
}

async fn drive<L: LanguageBinding>(
    shared: Arc<Mutex<Notebook<L>>>,
    events: broadcast::Sender<EngineEvent>,
    mut pass: Pass,
) -> Result<PassReport> {
    let generation = pass.generation();
    let binding = Arc::clone(shared.lock().map_err(lock_error)?.binding());

    for id in pass.order().to_vec() {
        let prepared = shared.lock().map_err(lock_error)?.prepare(&mut pass, id);
        match prepared {
            Prepared::Job(job) => {
                let _ = events.send(EngineEvent::CellStarted {
                    cell_id: id,
                    generation,
                });
                let binding = Arc::clone(&binding);
                let result = tokio::task::spawn_blocking(move || job.run(&binding))
                    .await
                    .map_err(|e| Error::InvalidOperation(format!("Cell task failed: {}", e)))?;

                let event = {
                    let mut notebook = shared.lock().map_err(lock_error)?;
                    match notebook.commit(&mut pass, result) {
                        CommitOutcome::Published => EngineEvent::CellCompleted {
                            cell_id: id,
                            generation,
                            display: notebook
                                .runtime(id)
                                .and_then(|runtime| runtime.display.as_ref())
                                .map(|value| value.to_string()),
                        },
                        CommitOutcome::Failed => match notebook.cell_error(id) {
                            Some(error) => EngineEvent::CellFailed {
                                cell_id: id,
                                generation,
                                error: error.clone(),
                            },
                            None => continue,
                        },
                        CommitOutcome::Cancelled => EngineEvent::CellCancelled {
                            cell_id: id,
                            generation,
                        },
                        CommitOutcome::Superseded => {
                            let _ = events.send(EngineEvent::PassSuperseded { generation });
                            break;
                        }
                    }
                };
                let _ = events.send(event);
            }
            Prepared::Blocked(reason) => {
                let _ = events.send(EngineEvent::CellBlocked {
                    cell_id: id,
                    generation,
                    reason,
                });
            }
            Prepared::Skipped => {}
            Prepared::Superseded => {
                let _ = events.send(EngineEvent::PassSuperseded { generation });
                break;
            }
        }
    }

    let report = shared.lock().map_err(lock_error)?.finish(pass);
    let _ = events.send(EngineEvent::PassFinished {
        report: report.clone(),
    });
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::lang::script::{ScriptLanguage, Value};

    #[tokio::test]
    async fn test_edit_runs_a_pass() {
        let cells = vec![
            (CellId::new(0), "a = 1;".to_string()),
            (CellId::new(1), "b = a + 1;".to_string()),
        ];
        let (notebook, _) = Notebook::load(ScriptLanguage, EngineConfig::default(), cells).unwrap();
        let session = Session::new(notebook);
        let mut events = session.subscribe();

        let report = session
            .edit_cell(CellId::new(0), "a = 10;")
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.ran, vec![CellId::new(0), CellId::new(1)]);
        let b = session
            .with_notebook(|nb| nb.value("b").cloned())
            .unwrap();
        assert_eq!(b, Some(Value::Int(11)));

        let first = events.recv().await.unwrap();
        assert!(matches!(first, EngineEvent::PassStarted { .. }));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = EngineEvent::CellCancelled {
            cell_id: CellId::new(2),
            generation: Generation(5),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "cell_cancelled");
        assert_eq!(json["cell_id"], 2);
        assert_eq!(json["generation"], 5);
    }
}
