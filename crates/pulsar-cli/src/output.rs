//! Terminal and JSON rendering of notebook results.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use pulsar_core::lang::script::Value;
use pulsar_core::{
    BlockedReason, CellError, CellId, CellStatus, CellView, ExecutionCallback, PassReport,
};

use crate::colors;
use crate::document::OpenDocument;

/// Per-cell result, as emitted by `--json`.
#[derive(Debug, Serialize)]
pub struct CellReport {
    pub id: CellId,
    pub label: String,
    pub status: CellStatus,
    pub display: Option<String>,
    pub symbols: BTreeMap<String, String>,
    pub error: Option<CellError>,
    pub blocked_by: Option<BlockedReason>,
    pub cancelled: bool,
    pub duration_ms: Option<f64>,
}

pub fn cell_reports(doc: &OpenDocument) -> Vec<CellReport> {
    doc.notebook
        .cells()
        .into_iter()
        .map(|view| CellReport {
            id: view.id,
            label: doc.label(view.id),
            status: view.status,
            display: view.display.map(|value| value.to_string()),
            symbols: doc
                .notebook
                .published_by(view.id)
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            error: view.error.cloned(),
            blocked_by: view.blocked_by,
            cancelled: view.cancelled,
            duration_ms: view.duration.map(|d| d.as_secs_f64() * 1000.0),
        })
        .collect()
}

pub fn print_header(action: &str, name: &str) {
    println!(
        "\n{}Pulsar{} {} {}{}{}",
        colors::BOLD,
        colors::RESET,
        action,
        colors::CYAN,
        name,
        colors::RESET
    );
    println!("{}", "─".repeat(50));
}

fn status_color(status: CellStatus) -> &'static str {
    match status {
        CellStatus::Ok => colors::GREEN,
        CellStatus::Error => colors::RED,
        CellStatus::Blocked | CellStatus::Stale => colors::YELLOW,
        CellStatus::Running => colors::CYAN,
    }
}

/// Print one cell: status, display value, published names and any error.
pub fn print_cell(doc: &OpenDocument, view: &CellView<'_, Value>) {
    println!(
        "{}{}{} {}[{}]{}",
        colors::BOLD,
        doc.label(view.id),
        colors::RESET,
        status_color(view.status),
        view.status,
        colors::RESET
    );
    if let Some(display) = view.display {
        println!("  => {}", display);
    }
    for (name, value) in doc.notebook.published_by(view.id) {
        println!("  {} = {}", name, value);
    }
    if let Some(reason) = view.blocked_by {
        let upstream = doc.label(reason.upstream);
        println!(
            "  {}{}{} (upstream: {})",
            colors::YELLOW,
            reason,
            colors::RESET,
            upstream
        );
    } else if let Some(error) = view.error {
        println!("  {}error:{} {}", colors::RED, colors::RESET, error);
    } else if view.cancelled {
        println!("  {}cancelled{}", colors::DIM, colors::RESET);
    }
}

pub fn print_summary(report: &PassReport, total: Duration) {
    println!("\n{}", "─".repeat(50));
    let color = if report.errored.is_empty() && report.excluded.is_empty() {
        colors::GREEN
    } else {
        colors::YELLOW
    };
    println!(
        "{}Completed{} {} cells in {:.2}s ({} errored, {} blocked, {} excluded)",
        color,
        colors::RESET,
        report.ran.len(),
        total.as_secs_f64(),
        report.errored.len(),
        report.blocked.len(),
        report.excluded.len()
    );
}

/// Prints one line per cell as a pass progresses.
pub struct ProgressPrinter {
    labels: BTreeMap<CellId, String>,
}

impl ProgressPrinter {
    pub fn new(doc: &OpenDocument) -> Self {
        let labels = doc
            .notebook
            .cells()
            .iter()
            .map(|view| (view.id, doc.label(view.id)))
            .collect();
        Self { labels }
    }

    fn label(&self, id: CellId) -> String {
        self.labels
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

impl ExecutionCallback for ProgressPrinter {
    fn on_cell_started(&self, cell_id: CellId) {
        tracing::debug!("Running {}", self.label(cell_id));
    }

    fn on_cell_completed(&self, cell_id: CellId, duration: Duration) {
        println!(
            "  {}✓{} {} {}({:.1}ms){}",
            colors::GREEN,
            colors::RESET,
            self.label(cell_id),
            colors::DIM,
            duration.as_secs_f64() * 1000.0,
            colors::RESET
        );
    }

    fn on_cell_error(&self, cell_id: CellId, error: &CellError) {
        println!(
            "  {}✗{} {} {}({}){}",
            colors::RED,
            colors::RESET,
            self.label(cell_id),
            colors::DIM,
            error.kind(),
            colors::RESET
        );
    }

    fn on_cell_blocked(&self, cell_id: CellId, reason: &BlockedReason) {
        println!(
            "  {}○{} {} {}(blocked by {}){}",
            colors::YELLOW,
            colors::RESET,
            self.label(cell_id),
            colors::DIM,
            self.label(reason.upstream),
            colors::RESET
        );
    }

    fn on_level_started(&self, level: usize, cell_count: usize) {
        if cell_count > 1 {
            println!("  {}level {}: {} cells{}", colors::DIM, level, cell_count, colors::RESET);
        }
    }
}
