//! The reactive dependency graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use rustc_hash::{FxHashMap, FxHashSet};

use super::types::{CellId, Conflict, Edge, GraphSnapshot};
use crate::analyze::CellSymbols;
use crate::error::{CellError, Error, Result};

/// The reactive dependency graph engine.
///
/// Maintained incrementally: adding, editing or removing a cell only touches
/// the edges of the names that cell defines or reads. Edges go from every cell
/// claiming a name to every cell reading it, so a name with two claimants
/// gives both of them edges and is reported as a conflict.
pub struct GraphEngine {
    /// The directed graph: edges go from producer to consumer, labelled with
    /// the symbol that connects them.
    graph: StableDiGraph<CellId, String>,
    /// Cell ID to node index mapping
    node_indices: FxHashMap<CellId, NodeIndex>,
    /// Cells in document order
    order: Vec<CellId>,
    /// Name sets by cell
    symbols: FxHashMap<CellId, CellSymbols>,
    /// Name to the cells defining it
    claims: BTreeMap<String, BTreeSet<CellId>>,
    /// Name to the cells reading it
    readers: BTreeMap<String, BTreeSet<CellId>>,
    /// Non-trivial strongly connected components, refreshed on every change
    cycles: Vec<Vec<CellId>>,
}

impl GraphEngine {
    /// Create a new empty graph engine.
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::default(),
            node_indices: FxHashMap::default(),
            order: Vec::new(),
            symbols: FxHashMap::default(),
            claims: BTreeMap::new(),
            readers: BTreeMap::new(),
            cycles: Vec::new(),
        }
    }

    /// Build a graph from scratch.
    pub fn from_cells(cells: impl IntoIterator<Item = (CellId, CellSymbols)>) -> Result<Self> {
        let mut graph = Self::new();
        for (id, symbols) in cells {
            let position = graph.len();
            graph.add_cell(id, position, symbols)?;
        }
        Ok(graph)
    }

    /// Insert a cell at `position` in document order.
    pub fn add_cell(&mut self, id: CellId, position: usize, symbols: CellSymbols) -> Result<()> {
        if self.node_indices.contains_key(&id) {
            return Err(Error::DuplicateCell(id));
        }
        if position > self.order.len() {
            return Err(Error::InvalidOperation(format!(
                "position {} is past the end of a document with {} cells",
                position,
                self.order.len()
            )));
        }

        let node = self.graph.add_node(id);
        self.node_indices.insert(id, node);
        self.order.insert(position, id);
        self.symbols.insert(id, CellSymbols::default());
        self.set_symbols(id, symbols);
        Ok(())
    }

    /// Replace the name sets of an existing cell.
    pub fn update_cell(&mut self, id: CellId, symbols: CellSymbols) -> Result<()> {
        if !self.node_indices.contains_key(&id) {
            return Err(Error::CellNotFound(id));
        }
        self.set_symbols(id, symbols);
        Ok(())
    }

    /// Remove a cell, returning the cells that depended on it.
    pub fn remove_cell(&mut self, id: CellId) -> Result<Vec<CellId>> {
        let Some(&node) = self.node_indices.get(&id) else {
            return Err(Error::CellNotFound(id));
        };
        let dependents = self.dependents(id);

        self.set_symbols(id, CellSymbols::default());
        self.graph.remove_node(node);
        self.node_indices.remove(&id);
        self.symbols.remove(&id);
        self.order.retain(|&cell| cell != id);
        self.refresh_cycles();

        Ok(dependents)
    }

    /// Move a cell to `index` in document order.
    pub fn move_cell(&mut self, id: CellId, index: usize) -> Result<()> {
        let Some(from) = self.position(id) else {
            return Err(Error::CellNotFound(id));
        };
        if index >= self.order.len() {
            return Err(Error::InvalidOperation(format!(
                "cannot move {} to position {} in a document with {} cells",
                id,
                index,
                self.order.len()
            )));
        }
        let cell = self.order.remove(from);
        self.order.insert(index, cell);
        self.refresh_cycles();
        Ok(())
    }

    fn set_symbols(&mut self, id: CellId, symbols: CellSymbols) {
        let old = self.symbols.get(&id).cloned().unwrap_or_default();
        if old == symbols {
            return;
        }

        let affected: BTreeSet<String> = old
            .defined
            .iter()
            .chain(&old.read)
            .chain(&symbols.defined)
            .chain(&symbols.read)
            .cloned()
            .collect();

        for name in &affected {
            self.remove_edges_for(name);
        }

        for name in &old.defined {
            remove_from(&mut self.claims, name, id);
        }
        for name in &old.read {
            remove_from(&mut self.readers, name, id);
        }
        for name in &symbols.defined {
            self.claims.entry(name.clone()).or_default().insert(id);
        }
        for name in &symbols.read {
            self.readers.entry(name.clone()).or_default().insert(id);
        }
        self.symbols.insert(id, symbols);

        for name in &affected {
            self.add_edges_for(name);
        }
        tracing::debug!(
            "Updated {}: {} names affected, {} edges total",
            id,
            affected.len(),
            self.graph.edge_count()
        );
        self.refresh_cycles();
    }

    fn remove_edges_for(&mut self, name: &str) {
        let Some(claimants) = self.claims.get(name) else {
            return;
        };
        let stale: Vec<_> = claimants
            .iter()
            .filter_map(|id| self.node_indices.get(id))
            .flat_map(|&node| self.graph.edges_directed(node, Direction::Outgoing))
            .filter(|edge| edge.weight() == name)
            .map(|edge| edge.id())
            .collect();
        for edge in stale {
            self.graph.remove_edge(edge);
        }
    }

    fn add_edges_for(&mut self, name: &str) {
        let (Some(claimants), Some(readers)) = (self.claims.get(name), self.readers.get(name))
        else {
            return;
        };
        for producer in claimants {
            for consumer in readers {
                if producer == consumer {
                    continue;
                }
                let from = self.node_indices[producer];
                let to = self.node_indices[consumer];
                tracing::trace!("Edge {} -> {} via '{}'", producer, consumer, name);
                self.graph.add_edge(from, to, name.to_string());
            }
        }
    }

    fn refresh_cycles(&mut self) {
        use petgraph::algo::kosaraju_scc;

        let positions = self.positions();
        let mut cycles: Vec<Vec<CellId>> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut members: Vec<CellId> =
                    component.into_iter().map(|node| self.graph[node]).collect();
                members.sort_by_key(|id| positions.get(id).copied());
                members
            })
            .collect();
        cycles.sort_by_key(|members| members.first().and_then(|id| positions.get(id).copied()));
        self.cycles = cycles;
    }

    /// Get the number of cells.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.node_indices.contains_key(&id)
    }

    /// Cells in document order.
    pub fn order(&self) -> &[CellId] {
        &self.order
    }

    /// Document position of a cell.
    pub fn position(&self, id: CellId) -> Option<usize> {
        self.order.iter().position(|&cell| cell == id)
    }

    /// Document positions of every cell.
    pub fn positions(&self) -> FxHashMap<CellId, usize> {
        self.order
            .iter()
            .enumerate()
            .map(|(position, &id)| (id, position))
            .collect()
    }

    /// Name sets of a cell.
    pub fn symbols(&self, id: CellId) -> Option<&CellSymbols> {
        self.symbols.get(&id)
    }

    /// The single cell defining `name`, if exactly one does.
    pub fn owner(&self, name: &str) -> Option<CellId> {
        match self.claims.get(name) {
            Some(claimants) if claimants.len() == 1 => claimants.iter().next().copied(),
            _ => None,
        }
    }

    /// Whether any cell defines `name`.
    pub fn is_claimed(&self, name: &str) -> bool {
        self.claims.get(name).is_some_and(|claimants| !claimants.is_empty())
    }

    /// Cells reading `name`, in document order.
    pub fn readers(&self, name: &str) -> Vec<CellId> {
        let mut readers: Vec<CellId> = self
            .readers
            .get(name)
            .map(|cells| cells.iter().copied().collect())
            .unwrap_or_default();
        self.sort_by_position(&mut readers);
        readers
    }

    fn sort_by_position(&self, cells: &mut [CellId]) {
        let positions = self.positions();
        cells.sort_by_key(|id| positions.get(id).copied());
    }

    fn neighbors(&self, id: CellId, direction: Direction) -> Vec<CellId> {
        let Some(&node) = self.node_indices.get(&id) else {
            return Vec::new();
        };
        let unique: FxHashSet<CellId> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|neighbor| self.graph[neighbor])
            .collect();
        let mut cells: Vec<CellId> = unique.into_iter().collect();
        self.sort_by_position(&mut cells);
        cells
    }

    /// Get direct dependencies of a cell, in document order.
    pub fn dependencies(&self, id: CellId) -> Vec<CellId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Get direct dependents of a cell (cells that depend on this one).
    pub fn dependents(&self, id: CellId) -> Vec<CellId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// The changed cells plus all their transitive dependents.
    pub fn forward_closure(&self, changed: impl IntoIterator<Item = CellId>) -> FxHashSet<CellId> {
        let mut reached = FxHashSet::default();
        let mut queue = VecDeque::new();
        for id in changed {
            if self.contains(id) && reached.insert(id) {
                queue.push_back(id);
            }
        }

        // BFS to find all dependents
        while let Some(cell_id) = queue.pop_front() {
            if let Some(&node_idx) = self.node_indices.get(&cell_id) {
                for neighbor_idx in self.graph.neighbors(node_idx) {
                    let neighbor_id = self.graph[neighbor_idx];
                    if reached.insert(neighbor_id) {
                        queue.push_back(neighbor_id);
                    }
                }
            }
        }
        reached
    }

    /// All edges, ordered by producer position, consumer position, then symbol.
    pub fn edges(&self) -> Vec<Edge> {
        let positions = self.positions();
        let mut edges: Vec<Edge> = self
            .graph
            .edge_references()
            .map(|edge| Edge {
                from: self.graph[edge.source()],
                to: self.graph[edge.target()],
                symbol: edge.weight().clone(),
            })
            .collect();
        edges.sort_by(|a, b| {
            let key = |edge: &Edge| (positions.get(&edge.from).copied(), positions.get(&edge.to).copied());
            key(a).cmp(&key(b)).then_with(|| a.symbol.cmp(&b.symbol))
        });
        edges
    }

    /// Names defined by more than one cell, ordered by the first claimant's position.
    pub fn conflicts(&self) -> Vec<Conflict> {
        let positions = self.positions();
        let mut conflicts: Vec<Conflict> = self
            .claims
            .iter()
            .filter(|(_, claimants)| claimants.len() > 1)
            .map(|(name, claimants)| {
                let mut cells: Vec<CellId> = claimants.iter().copied().collect();
                cells.sort_by_key(|id| positions.get(id).copied());
                Conflict {
                    name: name.clone(),
                    cells,
                }
            })
            .collect();
        conflicts.sort_by(|a, b| {
            let first = |c: &Conflict| c.cells.first().and_then(|id| positions.get(id).copied());
            first(a).cmp(&first(b)).then_with(|| a.name.cmp(&b.name))
        });
        conflicts
    }

    /// Dependency cycles, each listed in document order.
    pub fn cycles(&self) -> &[Vec<CellId>] {
        &self.cycles
    }

    /// Conflict and cycle errors by cell.
    ///
    /// A cell in several conflicts reports the alphabetically first name. A
    /// conflict takes precedence over cycle membership.
    pub fn structural_errors(&self) -> BTreeMap<CellId, CellError> {
        let mut errors = BTreeMap::new();
        for members in &self.cycles {
            for &id in members {
                errors.insert(
                    id,
                    CellError::Cycle {
                        members: members.clone(),
                    },
                );
            }
        }

        let mut conflicts = self.conflicts();
        conflicts.sort_by(|a, b| b.name.cmp(&a.name));
        for conflict in conflicts {
            for &id in &conflict.cells {
                errors.insert(id, conflict.to_error());
            }
        }
        errors
    }

    /// Group cells by dependency level for parallel execution.
    ///
    /// Cells in the same level have no dependencies on each other and can be
    /// executed in parallel. `cells` must be in topological order.
    pub fn topological_levels(&self, cells: &[CellId]) -> Vec<Vec<CellId>> {
        let mut level_of: FxHashMap<CellId, usize> = FxHashMap::default();
        let mut levels: Vec<Vec<CellId>> = Vec::new();

        for &id in cells {
            let level = self
                .dependencies(id)
                .iter()
                .filter_map(|dep| level_of.get(dep))
                .map(|level| level + 1)
                .max()
                .unwrap_or(0);
            level_of.insert(id, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(id);
        }

        levels
    }

    /// Structural view for comparing graphs.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            order: self.order.clone(),
            edges: self.edges(),
            conflicts: self.conflicts(),
            cycles: self.cycles.clone(),
        }
    }

    /// Rebuild this graph from scratch and compare it with the incremental state.
    pub fn matches_full_rebuild(&self) -> bool {
        let cells = self
            .order
            .iter()
            .map(|id| (*id, self.symbols.get(id).cloned().unwrap_or_default()));
        match Self::from_cells(cells) {
            Ok(rebuilt) => rebuilt.snapshot() == self.snapshot(),
            Err(_) => false,
        }
    }
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_from(map: &mut BTreeMap<String, BTreeSet<CellId>>, name: &str, id: CellId) {
    if let Some(cells) = map.get_mut(name) {
        cells.remove(&id);
        if cells.is_empty() {
            map.remove(name);
        }
    }
}
