//! Scheduling: which cells a change set re-runs, and in what order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::graph::{CellId, GraphEngine};

/// The cells one pass runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    /// Schedulable cells in execution order.
    pub order: Vec<CellId>,
    /// Cells in the closure that carry a static error and will not run,
    /// in document order.
    pub excluded: Vec<CellId>,
    /// `order` grouped by dependency level.
    pub levels: Vec<Vec<CellId>>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty() && self.excluded.is_empty()
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.order.contains(&id) || self.excluded.contains(&id)
    }
}

/// Computes execution plans from the dependency graph.
pub struct Scheduler;

impl Scheduler {
    /// Plan a pass for `changed`.
    ///
    /// Takes the forward closure of the changed cells, drops cells for which
    /// `is_excluded` holds, and orders the rest with Kahn's algorithm. Ties
    /// between unconstrained cells break by document position.
    pub fn plan(
        graph: &GraphEngine,
        changed: impl IntoIterator<Item = CellId>,
        is_excluded: impl Fn(CellId) -> bool,
    ) -> ExecutionPlan {
        let closure = graph.forward_closure(changed);
        let positions = graph.positions();

        let mut excluded: Vec<CellId> = Vec::new();
        let mut in_degree: FxHashMap<CellId, usize> = FxHashMap::default();
        for &id in &closure {
            if is_excluded(id) {
                excluded.push(id);
            } else {
                in_degree.insert(id, 0);
            }
        }
        excluded.sort_by_key(|id| positions.get(id).copied());

        let ids: Vec<CellId> = in_degree.keys().copied().collect();
        for id in ids {
            let count = graph
                .dependencies(id)
                .iter()
                .filter(|dep| in_degree.contains_key(dep))
                .count();
            in_degree.insert(id, count);
        }

        let position = |id: CellId| positions.get(&id).copied().unwrap_or(usize::MAX);
        let mut ready: BinaryHeap<Reverse<(usize, CellId)>> = in_degree
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&id, _)| Reverse((position(id), id)))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            order.push(id);
            for dependent in graph.dependents(id) {
                if let Some(count) = in_degree.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse((position(dependent), dependent)));
                    }
                }
            }
        }

        if order.len() != in_degree.len() {
            // Cycle members are always excluded, so the remaining subgraph is acyclic.
            tracing::warn!(
                "Scheduler left {} cells unordered",
                in_degree.len() - order.len()
            );
        }

        let levels = graph.topological_levels(&order);
        tracing::debug!(
            "Planned {} cells ({} excluded) in {} levels",
            order.len(),
            excluded.len(),
            levels.len()
        );

        ExecutionPlan {
            order,
            excluded,
            levels,
        }
    }
}
