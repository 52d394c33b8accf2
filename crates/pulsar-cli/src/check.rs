//! Check command implementation for Pulsar CLI.
//!
//! Reports parse errors, conflicts, cycles and mutation warnings without
//! running any cell.

use pulsar_core::EngineConfig;

use crate::colors;
use crate::document::OpenDocument;
use crate::output::print_header;

/// Check a document. Returns `true` when it has static errors.
pub fn execute(document: &str, config: EngineConfig, json: bool) -> anyhow::Result<bool> {
    let doc = OpenDocument::open(document, config)?;
    let diagnostics = doc.notebook.diagnostics();

    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
        return Ok(diagnostics.has_static_errors());
    }

    print_header("Checking", &doc.name());
    for view in doc.notebook.cells() {
        println!(
            "  {}{}{} {}",
            colors::DIM,
            view.id,
            colors::RESET,
            doc.label(view.id)
        );
    }
    println!();

    if diagnostics.is_clean() {
        println!("{}No problems found.{}", colors::GREEN, colors::RESET);
    } else {
        print!("{}", diagnostics);
    }

    Ok(diagnostics.has_static_errors())
}
