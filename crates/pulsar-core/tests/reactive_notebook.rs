//! Integration tests for reactive re-execution.
//!
//! Drives a notebook of script cells through edits, deletions and
//! structural errors and checks what re-runs and what gets published.

use pulsar_core::lang::script::{ScriptLanguage, Value};
use pulsar_core::{
    BlockedReason, CellError, CellId, CellStatus, EngineConfig, ExecutionPolicy, Notebook,
    WidgetDef, WidgetValue,
};

// =============================================================================
// Test Helpers
// =============================================================================

type ScriptNotebook = Notebook<ScriptLanguage>;

fn id(n: usize) -> CellId {
    CellId::new(n)
}

/// Load cells with ids matching their positions and run them once.
fn load(cells: &[&str]) -> ScriptNotebook {
    load_with(cells, EngineConfig::default())
}

fn load_with(cells: &[&str], config: EngineConfig) -> ScriptNotebook {
    let cells = cells
        .iter()
        .enumerate()
        .map(|(i, source)| (id(i), source.to_string()))
        .collect();
    let (notebook, _) = Notebook::load(ScriptLanguage, config, cells).expect("load failed");
    notebook
}

fn int(notebook: &ScriptNotebook, name: &str) -> Option<i64> {
    notebook.value(name).and_then(Value::as_int)
}

fn status(notebook: &ScriptNotebook, cell: usize) -> CellStatus {
    notebook.cell(id(cell)).expect("cell exists").status
}

// =============================================================================
// Re-run sets
// =============================================================================

#[test]
fn test_edit_reruns_exactly_the_downstream_closure() {
    let mut nb = load(&["a = 1;", "b = a + 1;", "c = b * 2;"]);
    assert_eq!(int(&nb, "c"), Some(4));

    nb.edit_cell(id(0), "a = 10;").unwrap();
    let report = nb.run_dirty().unwrap();
    assert_eq!(report.ran, vec![id(0), id(1), id(2)]);
    assert_eq!(int(&nb, "a"), Some(10));
    assert_eq!(int(&nb, "b"), Some(11));
    assert_eq!(int(&nb, "c"), Some(22));

    nb.edit_cell(id(1), "b = a + 5;").unwrap();
    let report = nb.run_dirty().unwrap();
    assert_eq!(report.ran, vec![id(1), id(2)]);
    assert_eq!(int(&nb, "b"), Some(15));
    assert_eq!(int(&nb, "c"), Some(30));
}

#[test]
fn test_unrelated_cells_do_not_rerun() {
    let mut nb = load(&["a = 1;", "x = 100;", "b = a + 1;", "y = x + 1;"]);

    nb.edit_cell(id(1), "x = 200;").unwrap();
    let report = nb.run_dirty().unwrap();
    assert_eq!(report.ran, vec![id(1), id(3)]);
    assert_eq!(int(&nb, "y"), Some(201));
    assert_eq!(int(&nb, "b"), Some(2));
}

#[test]
fn test_order_follows_dependencies_not_position() {
    let nb = load(&["total = base + extra;", "extra = base * 2;", "base = 3;"]);
    assert_eq!(nb.execution_order(), vec![id(2), id(1), id(0)]);
    assert_eq!(int(&nb, "total"), Some(9));
}

#[test]
fn test_unchanged_source_runs_nothing() {
    let mut nb = load(&["a = 1;", "b = a + 1;"]);
    let generation = nb.generation();

    let report = nb.run_dirty().unwrap();
    assert!(report.ran.is_empty());

    assert!(!nb.edit_cell(id(0), "a = 1;").unwrap());
    let report = nb.run_dirty().unwrap();
    assert!(report.ran.is_empty());
    assert_eq!(int(&nb, "b"), Some(2));
    assert!(nb.generation() > generation);
}

/// Every published name and value, in document order.
fn published(notebook: &ScriptNotebook) -> Vec<(String, Value)> {
    notebook
        .execution_order()
        .into_iter()
        .flat_map(|cell| notebook.published_by(cell))
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[test]
fn test_rerunning_unchanged_cells_publishes_identical_values() {
    let mut nb = load(&[
        "a = 1.5;",
        "b = a * 3.0;",
        r#"c = format!("{} units", b);"#,
        "n = 7;",
        "fn scale(v: f64) -> f64 { v * b }",
        "scaled = scale(2.0);",
        "items = vec![n, n * 2];",
    ]);
    let first = published(&nb);
    assert_eq!(first.len(), 7);

    let report = nb.run_all().unwrap();
    assert_eq!(report.ran.len(), 7);
    let second = published(&nb);

    let report = nb.run_all().unwrap();
    assert_eq!(report.ran.len(), 7);
    let third = published(&nb);

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(nb.value("c"), Some(&Value::Str("4.5 units".to_string())));
    assert_eq!(nb.value("scaled"), Some(&Value::Float(9.0)));
}

#[test]
fn test_run_all_reruns_everything_in_order() {
    let mut nb = load(&["b = a + 1;", "a = 1;"]);
    let report = nb.run_all().unwrap();
    assert_eq!(report.ran, vec![id(1), id(0)]);
}

#[test]
fn test_parallel_policy_matches_linear() {
    let cells = [
        "a = 2;",
        "b = a * 3;",
        "c = a * 5;",
        "d = b + c;",
        "e = d - a;",
    ];
    let linear = load(&cells);
    let parallel = load_with(
        &cells,
        EngineConfig::default().with_policy(ExecutionPolicy::Parallel),
    );
    for name in ["a", "b", "c", "d", "e"] {
        assert_eq!(linear.value(name), parallel.value(name), "value of {}", name);
    }
}

// =============================================================================
// Structural errors
// =============================================================================

#[test]
fn test_conflict_excludes_every_claimant() {
    let nb = load(&["x = 1;", "y = 0;", "x = 2;", "z = x + 1;"]);

    for cell in [0, 2] {
        assert_eq!(status(&nb, cell), CellStatus::Error);
        let error = nb.cell_error(id(cell)).unwrap();
        assert!(matches!(error, CellError::Conflict { name, cells } if name == "x" && cells == &vec![id(0), id(2)]));
    }
    assert_eq!(status(&nb, 1), CellStatus::Ok);
    assert_eq!(status(&nb, 3), CellStatus::Blocked);
    assert_eq!(nb.value("x"), None);
}

#[test]
fn test_conflict_is_independent_of_creation_order() {
    let mut forward = ScriptNotebook::new(ScriptLanguage, EngineConfig::default()).unwrap();
    forward.insert_cell(id(0), "x = 1;", 0).unwrap();
    forward.insert_cell(id(1), "x = 2;", 1).unwrap();
    forward.run_dirty().unwrap();

    let mut backward = ScriptNotebook::new(ScriptLanguage, EngineConfig::default()).unwrap();
    backward.insert_cell(id(1), "x = 2;", 0).unwrap();
    backward.insert_cell(id(0), "x = 1;", 0).unwrap();
    backward.run_dirty().unwrap();

    assert_eq!(forward.conflicts(), backward.conflicts());
    assert_eq!(forward.cell_error(id(0)), backward.cell_error(id(0)));
    assert_eq!(forward.cell_error(id(1)), backward.cell_error(id(1)));
}

#[test]
fn test_resolving_a_conflict_runs_the_survivor_and_readers() {
    let mut nb = load(&["x = 1;", "x = 2;", "z = x + 1;"]);
    assert_eq!(status(&nb, 2), CellStatus::Blocked);

    nb.edit_cell(id(1), "w = 2;").unwrap();
    let report = nb.run_dirty().unwrap();
    assert!(report.ran.contains(&id(0)));
    assert!(report.ran.contains(&id(2)));
    assert_eq!(int(&nb, "z"), Some(2));
    assert!(nb.conflicts().is_empty());
}

#[test]
fn test_cycle_is_isolated_from_the_rest() {
    let nb = load(&["p = q + 1;", "q = p + 1;", "z = 1;", "w = z + 1;", "r = p;"]);

    assert_eq!(nb.cycles(), vec![vec![id(0), id(1)]]);
    for cell in [0, 1] {
        assert!(matches!(
            nb.cell_error(id(cell)),
            Some(CellError::Cycle { members }) if members == &vec![id(0), id(1)]
        ));
    }
    assert_eq!(int(&nb, "w"), Some(2));
    assert_eq!(status(&nb, 4), CellStatus::Blocked);
}

#[test]
fn test_breaking_a_cycle_recovers() {
    let mut nb = load(&["p = q + 1;", "q = p + 1;"]);
    nb.edit_cell(id(1), "q = 5;").unwrap();
    nb.run_dirty().unwrap();

    assert!(nb.cycles().is_empty());
    assert_eq!(int(&nb, "p"), Some(6));
    assert_eq!(status(&nb, 0), CellStatus::Ok);
}

#[test]
fn test_parse_error_keeps_old_value_out_of_reach() {
    let mut nb = load(&["a = 1;", "b = a + 1;"]);

    nb.edit_cell(id(0), "a = = 2").unwrap();
    nb.run_dirty().unwrap();
    assert!(matches!(nb.cell_error(id(0)), Some(CellError::Parse { .. })));
    assert_eq!(nb.value("a"), None);
    assert_eq!(status(&nb, 1), CellStatus::Error);

    nb.edit_cell(id(0), "a = 2;").unwrap();
    nb.run_dirty().unwrap();
    assert_eq!(int(&nb, "b"), Some(3));
}

// =============================================================================
// Runtime errors and deletion
// =============================================================================

#[test]
fn test_runtime_error_blocks_downstream() {
    let nb = load(&["a = 1 / 0;", "b = a + 1;", "c = b + 1;", "d = 4;"]);

    assert_eq!(status(&nb, 0), CellStatus::Error);
    assert!(matches!(nb.cell_error(id(0)), Some(CellError::Runtime { .. })));
    assert_eq!(status(&nb, 1), CellStatus::Blocked);
    assert_eq!(status(&nb, 2), CellStatus::Blocked);
    assert_eq!(status(&nb, 3), CellStatus::Ok);
    assert_eq!(
        nb.cell(id(1)).unwrap().blocked_by.map(|r: BlockedReason| r.upstream),
        Some(id(0))
    );
    assert_eq!(nb.value("a"), None);
}

#[test]
fn test_deleted_owner_leaves_readers_without_a_value() {
    let mut nb = load(&["a = 1;", "b = a + 1;", "c = b;"]);

    nb.delete_cell(id(0)).unwrap();
    let report = nb.run_dirty().unwrap();
    assert_eq!(report.errored, vec![id(1)]);
    assert_eq!(report.blocked, vec![id(2)]);
    let message = nb.cell_error(id(1)).unwrap().to_string();
    assert!(message.contains("cannot find value `a`"), "{}", message);
    assert_eq!(nb.value("a"), None);
    assert_eq!(nb.value("b"), None);
}

#[test]
fn test_external_value_fills_a_deleted_name() {
    let mut nb = load(&["a = 1;", "b = a + 1;"]);
    nb.delete_cell(id(0)).unwrap();
    nb.run_dirty().unwrap();

    nb.set_external("a", Value::Int(41));
    let report = nb.run_dirty().unwrap();
    assert_eq!(report.ran, vec![id(1)]);
    assert_eq!(int(&nb, "b"), Some(42));
}

#[test]
fn test_external_value_is_shadowed_by_a_cell() {
    let mut nb = load(&["b = a + 1;"]);
    nb.set_external("a", Value::Int(1));
    nb.run_dirty().unwrap();
    assert_eq!(int(&nb, "b"), Some(2));

    nb.insert_cell(id(1), "a = 100;", 0).unwrap();
    nb.run_dirty().unwrap();
    assert_eq!(int(&nb, "b"), Some(101));
}

// =============================================================================
// Widgets and graph maintenance
// =============================================================================

#[test]
fn test_widget_update_reruns_owner_and_readers() {
    let mut nb = load(&[r#"speed = slider("speed", 0, 100, 50);"#, "double = speed * 2;"]);
    assert_eq!(int(&nb, "double"), Some(100));

    let widgets = nb.widgets();
    assert_eq!(widgets.len(), 1);
    assert_eq!(widgets[0].cell_id, id(0));
    assert!(matches!(&widgets[0].def, WidgetDef::Slider { id, .. } if id == "speed"));

    assert!(nb.update_widget("speed", WidgetValue::Number(80.0)).unwrap());
    let report = nb.run_dirty().unwrap();
    assert_eq!(report.ran, vec![id(0), id(1)]);
    assert_eq!(int(&nb, "double"), Some(160));

    assert!(!nb.update_widget("speed", WidgetValue::Number(80.0)).unwrap());
    assert!(nb.update_widget("missing", WidgetValue::Number(1.0)).is_err());
}

#[test]
fn test_incremental_graph_matches_full_rebuild() {
    let mut nb = load(&["a = 1;", "b = a + 1;", "c = a + b;"]);
    assert!(nb.graph().matches_full_rebuild());

    nb.edit_cell(id(1), "b = c;").unwrap();
    assert!(nb.graph().matches_full_rebuild());

    nb.insert_cell(id(3), "d = c + b;", 1).unwrap();
    assert!(nb.graph().matches_full_rebuild());

    nb.move_cell(id(0), 3).unwrap();
    assert!(nb.graph().matches_full_rebuild());

    nb.delete_cell(id(2)).unwrap();
    assert!(nb.graph().matches_full_rebuild());

    nb.edit_cell(id(1), "b = a;").unwrap();
    nb.run_dirty().unwrap();
    assert!(nb.graph().matches_full_rebuild());
    assert_eq!(int(&nb, "b"), Some(1));
}

#[test]
fn test_local_names_never_create_edges() {
    let nb = load(&["_tmp = 1;\na = _tmp + 1;", "_tmp = 5;\nb = a + _tmp;"]);
    assert!(nb.conflicts().is_empty());
    assert_eq!(nb.value("_tmp"), None);
    assert_eq!(int(&nb, "b"), Some(7));
}
