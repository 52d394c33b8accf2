//! Integration tests for reloading a text document into a live notebook.

use pulsar_core::lang::script::{ScriptLanguage, Value};
use pulsar_core::{DocumentSync, EngineConfig, Notebook, apply_changes};

const FIRST: &str = "\
// %% inputs
rate = 3;
count = 4;

// %% total
total = rate * count;

// %% report
summary = total + 1;
";

fn open(text: &str) -> (DocumentSync, Notebook<ScriptLanguage>) {
    let mut sync = DocumentSync::new();
    let cells = sync.initial(text).unwrap();
    let (notebook, _) = Notebook::load(ScriptLanguage, EngineConfig::default(), cells).unwrap();
    (sync, notebook)
}

#[test]
fn test_reload_reruns_only_what_changed() {
    let (mut sync, mut nb) = open(FIRST);
    assert_eq!(nb.value("summary"), Some(&Value::Int(13)));

    let second = FIRST.replace("count = 4;", "count = 5;");
    let changes = sync.diff(&second).unwrap();
    assert_eq!(changes.len(), 1);
    apply_changes(&mut nb, changes).unwrap();

    let report = nb.run_dirty().unwrap();
    let inputs = sync.id("inputs").unwrap();
    let total = sync.id("total").unwrap();
    let summary = sync.id("report").unwrap();
    assert_eq!(report.ran, vec![inputs, total, summary]);
    assert_eq!(nb.value("summary"), Some(&Value::Int(16)));
}

#[test]
fn test_reordering_cells_reruns_nothing() {
    let (mut sync, mut nb) = open(FIRST);
    let reordered = "\
// %% report
summary = total + 1;

// %% inputs
rate = 3;
count = 4;

// %% total
total = rate * count;
";
    let changes = sync.diff(reordered).unwrap();
    assert!(!changes.is_empty());
    apply_changes(&mut nb, changes).unwrap();

    let report = nb.run_dirty().unwrap();
    assert!(report.ran.is_empty());
    assert_eq!(nb.execution_order().first(), sync.id("inputs").as_ref());
    assert!(nb.graph().matches_full_rebuild());
}

#[test]
fn test_removing_a_cell_fails_its_readers() {
    let (mut sync, mut nb) = open(FIRST);
    let trimmed = "\
// %% inputs
rate = 3;
count = 4;

// %% report
summary = total + 1;
";
    let summary = sync.id("report").unwrap();
    apply_changes(&mut nb, sync.diff(trimmed).unwrap()).unwrap();
    let report = nb.run_dirty().unwrap();

    assert_eq!(report.errored, vec![summary]);
    assert_eq!(sync.id("total"), None);
    assert_eq!(nb.value("total"), None);
}
