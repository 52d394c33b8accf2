//! Integration tests for async sessions: superseded passes and interrupts.
//!
//! Uses a binding that wraps the script language and holds any cell whose
//! source contains `// gate` until the test releases it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, mpsc};

use pulsar_core::lang::script::ast::Block;
use pulsar_core::lang::script::{ScriptLanguage, Value};
use pulsar_core::lang::{Analysis, ExecFailure, ExecOutput, ExecRequest, ParseFailure};
use pulsar_core::{
    CellId, CellStatus, EngineConfig, EngineEvent, LanguageBinding, Notebook, Session,
};
use pulsar_core::state::UpstreamFailure;
use tokio::sync::broadcast;

// =============================================================================
// Test Helpers
// =============================================================================

struct GatedLanguage {
    armed: AtomicBool,
    release: Mutex<mpsc::Receiver<()>>,
}

struct GatedProgram {
    block: Block,
    gated: bool,
}

impl LanguageBinding for GatedLanguage {
    type Program = GatedProgram;
    type Value = Value;

    fn name(&self) -> &str {
        "gated-script"
    }

    fn parse(&self, source: &str) -> Result<GatedProgram, ParseFailure> {
        Ok(GatedProgram {
            block: ScriptLanguage.parse(source)?,
            gated: source.contains("// gate"),
        })
    }

    fn analyze(&self, program: &GatedProgram) -> Analysis {
        ScriptLanguage.analyze(&program.block)
    }

    fn execute(
        &self,
        program: &GatedProgram,
        request: &ExecRequest<'_, Value>,
    ) -> Result<ExecOutput<Value>, ExecFailure> {
        if program.gated && self.armed.load(Ordering::SeqCst) {
            let release = self.release.lock().unwrap();
            release.recv().unwrap();
            if request.abort.is_aborted() {
                return Err(ExecFailure::Cancelled);
            }
        }
        ScriptLanguage.execute(&program.block, request)
    }
}

/// Build a session over `cells`, then arm the gate.
fn gated_session(cells: &[&str]) -> (Session<GatedLanguage>, mpsc::Sender<()>) {
    let (tx, rx) = mpsc::channel();
    let binding = GatedLanguage {
        armed: AtomicBool::new(false),
        release: Mutex::new(rx),
    };
    let config = EngineConfig {
        cancel_superseded: false,
        ..EngineConfig::default()
    };
    let cells = cells
        .iter()
        .enumerate()
        .map(|(i, source)| (CellId::new(i), source.to_string()))
        .collect();
    let (notebook, _) = Notebook::load(binding, config, cells).unwrap();
    notebook.binding().armed.store(true, Ordering::SeqCst);
    (Session::new(notebook), tx)
}

async fn wait_for_start(events: &mut broadcast::Receiver<EngineEvent>, cell: CellId) {
    loop {
        if let EngineEvent::CellStarted { cell_id, .. } = events.recv().await.unwrap()
            && cell_id == cell
        {
            return;
        }
    }
}

fn int(session: &Session<GatedLanguage>, name: &str) -> Option<i64> {
    session
        .with_notebook(|nb| nb.value(name).and_then(Value::as_int))
        .unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_result_of_superseded_pass_is_dropped() {
    let (session, release) = gated_session(&["a = 1;", "// gate\nb = a + 1;"]);
    let mut events = session.subscribe();

    let first = session.edit_cell(CellId::new(0), "a = 10;").unwrap();
    wait_for_start(&mut events, CellId::new(1)).await;

    // The first pass is parked inside cell 1 with a = 10.
    let second = session.edit_cell(CellId::new(0), "a = 20;").unwrap();
    release.send(()).unwrap();
    release.send(()).unwrap();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert!(first.superseded);
    assert!(!first.ran.contains(&CellId::new(1)));
    assert!(!second.superseded);
    assert_eq!(second.ran, vec![CellId::new(0), CellId::new(1)]);
    assert_eq!(int(&session, "a"), Some(20));
    assert_eq!(int(&session, "b"), Some(21));
    assert!(second.generation > first.generation);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interrupt_cancels_running_cell_and_blocks_dependents() {
    let (session, release) = gated_session(&["a = 1;", "// gate\nb = a + 1;", "c = b + 1;"]);
    let mut events = session.subscribe();

    let pass = session.edit_cell(CellId::new(0), "a = 5;").unwrap();
    wait_for_start(&mut events, CellId::new(1)).await;
    session.interrupt().unwrap();
    release.send(()).unwrap();

    let report = pass.await.unwrap().unwrap();
    assert_eq!(report.ran, vec![CellId::new(0)]);
    assert_eq!(report.cancelled, vec![CellId::new(1)]);
    assert_eq!(report.blocked, vec![CellId::new(2)]);

    session
        .with_notebook(|nb| {
            let b = nb.cell(CellId::new(1)).unwrap();
            assert_eq!(b.status, CellStatus::Stale);
            assert!(b.cancelled);
            assert!(b.error.is_none());

            let c = nb.cell(CellId::new(2)).unwrap();
            assert_eq!(c.status, CellStatus::Blocked);
            let reason = c.blocked_by.unwrap();
            assert_eq!(reason.upstream, CellId::new(1));
            assert_eq!(reason.failure, UpstreamFailure::Cancelled);
            assert_eq!(nb.value("b"), None);
        })
        .unwrap();
}

#[tokio::test]
async fn test_events_follow_the_pass() {
    let (session, _release) = gated_session(&["a = 1;", "b = a + 1;"]);
    let mut events = session.subscribe();

    let report = session
        .edit_cell(CellId::new(0), "a = 2;")
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(match event {
            EngineEvent::PassStarted { .. } => "pass_started",
            EngineEvent::CellStarted { .. } => "cell_started",
            EngineEvent::CellCompleted { .. } => "cell_completed",
            EngineEvent::PassFinished { .. } => "pass_finished",
            _ => "other",
        });
    }
    assert_eq!(
        kinds,
        vec![
            "pass_started",
            "cell_started",
            "cell_completed",
            "cell_started",
            "cell_completed",
            "pass_finished",
        ]
    );
    assert_eq!(report.ran.len(), 2);
}

#[tokio::test]
async fn test_widget_update_through_session() {
    let (session, _release) = gated_session(&[r#"n = slider("n", 0, 10, 1);"#, "m = n * 3;"]);
    session
        .update_widget("n", pulsar_core::WidgetValue::Number(4.0))
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(int(&session, "m"), Some(12));
}
