//! The two-phase pass protocol.
//!
//! A pass is driven by repeatedly asking the notebook to `prepare` a cell,
//! running the returned [`CellJob`] without holding any lock, and handing the
//! [`JobResult`] back to `commit`. Only `commit` writes the namespace, so a
//! driver can run jobs on any thread while results are still applied one at a
//! time.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::context::AbortHandle;
use crate::graph::CellId;
use crate::lang::{ExecFailure, ExecOutput, ExecRequest, LanguageBinding};
use crate::scheduler::ExecutionPlan;
use crate::state::{BlockedReason, Generation};
use crate::widgets::WidgetValue;

/// One scheduling pass in progress.
pub struct Pass {
    generation: Generation,
    plan: ExecutionPlan,
    abort: AbortHandle,
    started: Instant,
    pub(crate) report: PassReport,
    span: tracing::Span,
}

impl Pass {
    pub(crate) fn new(generation: Generation, plan: ExecutionPlan, abort: AbortHandle) -> Self {
        let span = tracing::debug_span!("pass", generation = generation.0);
        let report = PassReport {
            generation,
            excluded: plan.excluded.clone(),
            ..PassReport::default()
        };
        Self {
            generation,
            plan,
            abort,
            started: Instant::now(),
            report,
            span,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    /// Cells to run, in order.
    pub fn order(&self) -> &[CellId] {
        &self.plan.order
    }

    /// Abort handle shared by every job of this pass.
    pub fn abort_handle(&self) -> &AbortHandle {
        &self.abort
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// What `prepare` decided for one cell.
pub enum Prepared<L: LanguageBinding> {
    /// The cell is ready to run.
    Job(CellJob<L>),
    /// An upstream cell failed; the cell was marked blocked.
    Blocked(BlockedReason),
    /// The cell no longer exists or has nothing to run.
    Skipped,
    /// A newer pass has started. The driver should stop.
    Superseded,
}

/// A self-contained unit of work: everything needed to run one cell.
pub struct CellJob<L: LanguageBinding> {
    pub cell_id: CellId,
    pub generation: Generation,
    /// Source revision the job was prepared from.
    pub revision: u64,
    pub(crate) program: Arc<L::Program>,
    pub(crate) inputs: FxHashMap<String, L::Value>,
    pub(crate) widget_values: FxHashMap<String, WidgetValue>,
    pub(crate) abort: AbortHandle,
}

impl<L: LanguageBinding> CellJob<L> {
    /// Execute the cell. A panic inside the binding is reported as a failure.
    pub fn run(self, binding: &L) -> JobResult<L::Value> {
        let started = Instant::now();
        let outcome = if self.abort.is_aborted() {
            JobOutcome::Cancelled
        } else {
            let request = ExecRequest {
                inputs: &self.inputs,
                widget_values: &self.widget_values,
                abort: &self.abort,
            };
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| binding.execute(&self.program, &request)));
            match result {
                Ok(Ok(output)) => JobOutcome::Completed(output),
                Ok(Err(ExecFailure::Runtime(message))) => JobOutcome::Failed(message),
                Ok(Err(ExecFailure::Cancelled)) => JobOutcome::Cancelled,
                Err(payload) => {
                    JobOutcome::Failed(format!("cell panicked: {}", panic_message(&*payload)))
                }
            }
        };

        JobResult {
            cell_id: self.cell_id,
            generation: self.generation,
            revision: self.revision,
            outcome,
            duration: started.elapsed(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result of running a [`CellJob`].
#[derive(Debug)]
pub struct JobResult<V> {
    pub cell_id: CellId,
    pub generation: Generation,
    pub revision: u64,
    pub outcome: JobOutcome<V>,
    pub duration: Duration,
}

#[derive(Debug)]
pub enum JobOutcome<V> {
    Completed(ExecOutput<V>),
    Failed(String),
    Cancelled,
}

/// What `commit` did with a job result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    Published,
    Failed,
    Cancelled,
    /// The result belongs to an older pass or an older source and was dropped.
    Superseded,
}

/// Summary of a finished pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub generation: Generation,
    /// Cells whose results were published, in commit order.
    pub ran: Vec<CellId>,
    /// Cells that failed at runtime.
    pub errored: Vec<CellId>,
    /// Cells skipped because of an upstream failure.
    pub blocked: Vec<CellId>,
    /// Cells in the closure that carry a parse, conflict or cycle error.
    pub excluded: Vec<CellId>,
    pub cancelled: Vec<CellId>,
    /// A newer pass started before this one finished.
    pub superseded: bool,
    pub duration: Duration,
}

impl PassReport {
    /// Cells the pass attempted to run, in any outcome.
    pub fn attempted(&self) -> usize {
        self.ran.len() + self.errored.len() + self.cancelled.len()
    }
}
