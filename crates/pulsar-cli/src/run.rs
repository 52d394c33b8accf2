//! Run command implementation for Pulsar CLI.
//!
//! Loads a document, runs every cell once and prints the results.

use std::time::Instant;

use serde::Serialize;

use pulsar_core::{CellId, EngineConfig, ExecutionPolicy, LinearExecutor, ParallelExecutor, PassReport};

use crate::colors;
use crate::document::OpenDocument;
use crate::output::{CellReport, ProgressPrinter, cell_reports, print_cell, print_header, print_summary};

#[derive(Serialize)]
struct RunOutput {
    report: PassReport,
    cells: Vec<CellReport>,
}

/// Execute a document.
pub fn execute(document: &str, config: EngineConfig, json: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut doc = OpenDocument::open(document, config)?;

    if json {
        let report = run_pass(&mut doc, false, Vec::new());
        let output = RunOutput {
            report,
            cells: cell_reports(&doc),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_header("Running", &doc.name());
    if doc.notebook.is_empty() {
        println!(
            "\n{}No cells found in document.{}",
            colors::YELLOW,
            colors::RESET
        );
        println!("Cells are separated by `// %%` marker lines");
        return Ok(());
    }

    let report = run_pass(&mut doc, true, Vec::new());

    println!("\n{}Outputs:{}", colors::BOLD, colors::RESET);
    println!("{}", "─".repeat(50));
    for view in doc.notebook.cells() {
        print_cell(&doc, &view);
    }

    print_summary(&report, start.elapsed());
    Ok(())
}

/// Run a pass with the configured policy, optionally printing progress.
pub fn run_pass(doc: &mut OpenDocument, progress: bool, changed: Vec<CellId>) -> PassReport {
    match doc.notebook.config().policy {
        ExecutionPolicy::Linear => {
            let mut executor = LinearExecutor::new();
            if progress {
                executor.set_callback(ProgressPrinter::new(doc));
            }
            executor.run(&mut doc.notebook, changed)
        }
        ExecutionPolicy::Parallel => {
            let mut executor = ParallelExecutor::new();
            if progress {
                executor.set_callback(ProgressPrinter::new(doc));
            }
            executor.run(&mut doc.notebook, changed)
        }
    }
}
