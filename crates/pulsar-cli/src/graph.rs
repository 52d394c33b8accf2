//! Graph command implementation for Pulsar CLI.
//!
//! Prints the dependency edges and the order a full run would use.

use serde::Serialize;

use pulsar_core::{CellId, EngineConfig};

use crate::colors;
use crate::document::OpenDocument;
use crate::output::print_header;

#[derive(Serialize)]
struct GraphOutput {
    edges: Vec<EdgeOutput>,
    order: Vec<String>,
}

#[derive(Serialize)]
struct EdgeOutput {
    from: String,
    to: String,
    symbol: String,
}

pub fn execute(document: &str, config: EngineConfig, json: bool) -> anyhow::Result<()> {
    let doc = OpenDocument::open(document, config)?;
    let edges: Vec<EdgeOutput> = doc
        .notebook
        .edges()
        .into_iter()
        .map(|edge| EdgeOutput {
            from: doc.label(edge.from),
            to: doc.label(edge.to),
            symbol: edge.symbol,
        })
        .collect();
    let order: Vec<String> = doc
        .notebook
        .execution_order()
        .into_iter()
        .map(|id: CellId| doc.label(id))
        .collect();

    if json {
        let output = GraphOutput { edges, order };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_header("Graph of", &doc.name());
    println!("{}Edges:{}", colors::BOLD, colors::RESET);
    if edges.is_empty() {
        println!("  {}(none){}", colors::DIM, colors::RESET);
    }
    for edge in &edges {
        println!("  {} -> {} ({})", edge.from, edge.to, edge.symbol);
    }

    println!("\n{}Execution order:{}", colors::BOLD, colors::RESET);
    println!("  {}", order.join(" -> "));
    Ok(())
}
