//! Watch command implementation for Pulsar CLI.
//!
//! Keeps one notebook alive, applies each saved revision of the document as
//! a diff and re-runs only the cells that changed or depend on a change.

use std::path::Path;
use std::time::Instant;

use pulsar_core::EngineConfig;

use crate::colors;
use crate::document::OpenDocument;
use crate::output::{print_cell, print_header, print_summary};
use crate::run::run_pass;
use crate::watcher::{FileEvent, FileWatcher};

/// Execute the watch command.
pub async fn execute(document: &str, config: EngineConfig, clear_screen: bool) -> anyhow::Result<()> {
    let mut doc = OpenDocument::open(document, config)?;
    let abs_path = Path::new(document).canonicalize()?;
    doc.path = abs_path.clone();

    if clear_screen {
        clear_terminal();
    }
    print_header("Watching", &doc.name());
    rerun(&mut doc, true);

    let mut watcher = FileWatcher::new(&abs_path)
        .map_err(|e| anyhow::anyhow!("Failed to create file watcher: {}", e))?;

    while let Some(event) = watcher.recv().await {
        match event {
            FileEvent::Modified(_) => {
                if clear_screen {
                    clear_terminal();
                }
                match doc.reload() {
                    Ok(0) => {
                        println!("{}No cell changed.{}", colors::DIM, colors::RESET);
                    }
                    Ok(changes) => {
                        println!(
                            "\n{}{} change(s), re-running...{}",
                            colors::YELLOW,
                            changes,
                            colors::RESET
                        );
                        rerun(&mut doc, false);
                    }
                    Err(e) => eprintln!("{}Error:{} {}", colors::RED, colors::RESET, e),
                }
            }
            FileEvent::Removed(path) => {
                eprintln!(
                    "\n{}Warning:{} Document removed: {}",
                    colors::YELLOW,
                    colors::RESET,
                    path.display()
                );
            }
        }
    }

    Ok(())
}

/// Run the dirty cells (or everything on the first run) and print them.
fn rerun(doc: &mut OpenDocument, all: bool) {
    let start = Instant::now();
    let changed = if all {
        doc.notebook.graph().order().to_vec()
    } else {
        Vec::new()
    };
    let report = run_pass(doc, true, changed);

    println!("\n{}Outputs:{}", colors::BOLD, colors::RESET);
    println!("{}", "─".repeat(50));
    for id in report
        .ran
        .iter()
        .chain(&report.errored)
        .chain(&report.blocked)
        .chain(&report.excluded)
    {
        if let Some(view) = doc.notebook.cell(*id) {
            print_cell(doc, &view);
        }
    }
    print_summary(&report, start.elapsed());
    println!(
        "\n{}Watching for changes... (Ctrl+C to stop){}",
        colors::DIM,
        colors::RESET
    );
}

/// Clear the terminal screen.
fn clear_terminal() {
    print!("\x1B[2J\x1B[1;1H");
    colors::flush_stdout();
}
