//! Vertex arena, edges and the address/range/matrix mappings.
//!
//! Every mutation here updates the graph and the mappings together, so a
//! lookup never yields a vertex the graph does not know and vice versa.

use cellgraph_common::{AbsoluteCellRange, CellValue, SheetId, SimpleCellAddress};
use cellgraph_parse::{ASTNode, CellDependency, ReferenceType};
use rustc_hash::{FxHashMap, FxHashSet};

use super::address_mapping::AddressMapping;
use super::graph::{Graph, GraphError};
use super::matrix_mapping::MatrixMapping;
use super::range_mapping::RangeMapping;
use super::sheet_mapping::SheetMapping;
use super::vertex::{MatrixValues, MatrixVertex, RangeVertex, Vertex, VertexId};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Arena; ids are never reused while the engine lives.
    pub(super) vertices: Vec<Option<Vertex>>,
    pub(super) graph: Graph<VertexId>,
    pub(super) sheets: SheetMapping,
    pub(super) addresses: AddressMapping,
    pub(super) ranges: RangeMapping,
    pub(super) matrices: MatrixMapping,
    /// Address of every single-cell vertex (value, empty, formula).
    pub(super) positions: FxHashMap<VertexId, SimpleCellAddress>,
    pub(super) volatile: FxHashSet<VertexId>,
    pub(super) structural: FxHashSet<VertexId>,
    pub(super) infinite_ranges: FxHashSet<VertexId>,
    /// Seeds for the next partial run.
    pub(super) changed: FxHashSet<VertexId>,
}

impl DependencyGraph {
    pub fn new(sheets: SheetMapping) -> Self {
        Self {
            sheets,
            ..Self::default()
        }
    }

    pub fn sheets(&self) -> &SheetMapping {
        &self.sheets
    }

    pub(crate) fn sheets_mut(&mut self) -> &mut SheetMapping {
        &mut self.sheets
    }

    pub fn graph(&self) -> &Graph<VertexId> {
        &self.graph
    }

    pub fn addresses(&self) -> &AddressMapping {
        &self.addresses
    }

    pub(crate) fn addresses_mut(&mut self) -> &mut AddressMapping {
        &mut self.addresses
    }

    pub fn ranges(&self) -> &RangeMapping {
        &self.ranges
    }

    pub fn matrices(&self) -> &MatrixMapping {
        &self.matrices
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.as_index()).and_then(Option::as_ref)
    }

    pub(crate) fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.vertices.get_mut(id.as_index()).and_then(Option::as_mut)
    }

    pub fn fetch(&self, id: VertexId) -> Result<&Vertex, GraphError> {
        self.vertex(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))
    }

    /// Live vertices.
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn volatile_vertices(&self) -> &FxHashSet<VertexId> {
        &self.volatile
    }

    pub fn structural_vertices(&self) -> &FxHashSet<VertexId> {
        &self.structural
    }

    pub(crate) fn mark_changed(&mut self, id: VertexId) {
        self.changed.insert(id);
    }

    pub(crate) fn take_changed(&mut self) -> FxHashSet<VertexId> {
        std::mem::take(&mut self.changed)
    }

    pub fn vertex_at(&self, addr: SimpleCellAddress) -> Option<VertexId> {
        self.addresses.get(addr)
    }

    pub fn position_of(&self, id: VertexId) -> Option<SimpleCellAddress> {
        self.positions.get(&id).copied()
    }

    /// What the cell at `addr` currently shows.
    pub fn cell_value(&self, addr: SimpleCellAddress) -> CellValue {
        self.vertex_at(addr)
            .and_then(|id| self.vertex(id))
            .map_or(CellValue::Empty, |v| v.value_at(addr))
    }

    /// Bound an infinite range by the populated extent of its sheet.
    pub fn clamp_range(&self, range: &AbsoluteCellRange) -> Option<AbsoluteCellRange> {
        if range.is_finite() {
            return Some(*range);
        }
        range.clamp(
            self.addresses.sheet_width(range.sheet()),
            self.addresses.sheet_height(range.sheet()),
        )
    }

    /// Values of `range`, row-major.
    pub fn range_values(&self, range: &AbsoluteCellRange) -> Vec<CellValue> {
        match self.clamp_range(range) {
            Some(r) => r.addresses().map(|a| self.cell_value(a)).collect(),
            None => Vec::new(),
        }
    }

    /* ───────────────────── arena primitives ───────────────────── */

    pub(crate) fn add_vertex(&mut self, vertex: Vertex) -> VertexId {
        let id = VertexId::new(self.vertices.len() as u32);
        if let Vertex::Formula(f) = &vertex {
            if f.is_volatile {
                self.volatile.insert(id);
            }
            if f.is_dependent_on_structure_change {
                self.structural.insert(id);
            }
        }
        self.vertices.push(Some(vertex));
        self.graph.add_node(id);
        id
    }

    /// Drop `id` from the arena and the graph. Returns its former sources.
    /// Mappings are the caller's business.
    pub(crate) fn remove_vertex(&mut self, id: VertexId) -> Result<Vec<VertexId>, GraphError> {
        let sources: Vec<VertexId> = self
            .graph
            .predecessors(id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        self.graph.remove_node(id)?;
        if let Some(slot) = self.vertices.get_mut(id.as_index()) {
            *slot = None;
        }
        self.positions.remove(&id);
        self.volatile.remove(&id);
        self.structural.remove(&id);
        self.infinite_ranges.remove(&id);
        self.changed.remove(&id);
        Ok(sources)
    }

    pub(crate) fn add_edge(&mut self, from: VertexId, to: VertexId) -> Result<(), GraphError> {
        self.graph.add_edge(from, to)
    }

    fn place(&mut self, addr: SimpleCellAddress, id: VertexId) {
        self.addresses.set(addr, id);
        self.positions.insert(id, addr);
    }

    /// Give every single-cell vertex on `sheet` its current address again.
    pub(super) fn rebuild_positions(&mut self, sheet: SheetId) {
        let matrices: FxHashSet<VertexId> =
            self.matrices.entries(sheet).into_iter().map(|(_, id)| id).collect();
        self.positions.retain(|_, a| a.sheet != sheet);
        for (addr, id) in self.addresses.entries(sheet) {
            if !matrices.contains(&id) {
                self.positions.insert(id, addr);
            }
        }
    }

    pub(super) fn connect_infinite_ranges(
        &mut self,
        addr: SimpleCellAddress,
        id: VertexId,
    ) -> Result<(), GraphError> {
        let covering: Vec<VertexId> = self
            .infinite_ranges
            .iter()
            .copied()
            .filter(|r| {
                self.vertex(*r)
                    .and_then(Vertex::as_range)
                    .is_some_and(|rv| rv.range.contains(&addr))
            })
            .collect();
        for r in covering {
            self.graph.add_edge(id, r)?;
        }
        Ok(())
    }

    pub(crate) fn fetch_cell_or_create_empty(
        &mut self,
        addr: SimpleCellAddress,
    ) -> Result<VertexId, GraphError> {
        if let Some(id) = self.vertex_at(addr) {
            return Ok(id);
        }
        let id = self.add_vertex(Vertex::Empty);
        self.place(addr, id);
        self.connect_infinite_ranges(addr, id)?;
        Ok(id)
    }

    /// Move every dependent of `old` to `new`, then drop `old`.
    pub(crate) fn exchange_node(&mut self, old: VertexId, new: VertexId) -> Result<(), GraphError> {
        let targets: Vec<VertexId> = self
            .graph
            .adjacent_nodes(old)
            .ok_or_else(|| GraphError::UnknownNode(old.to_string()))?
            .iter()
            .map(|&t| if t == old { new } else { t })
            .collect();
        for t in targets {
            self.graph.add_edge(new, t)?;
        }
        let sources = self.remove_vertex(old)?;
        self.collect_garbage(sources)
    }

    /// Remove empty and range vertices nobody depends on any more.
    pub(crate) fn collect_garbage(&mut self, candidates: Vec<VertexId>) -> Result<(), GraphError> {
        let mut stack = candidates;
        while let Some(id) = stack.pop() {
            if self.graph.dependents_count(id) > 0 {
                continue;
            }
            match self.vertex(id) {
                Some(Vertex::Empty) => {
                    if let Some(addr) = self.position_of(id) {
                        if self.addresses.get(addr) == Some(id) {
                            self.addresses.remove(addr);
                        }
                    }
                    self.remove_vertex(id)?;
                }
                Some(Vertex::Range(r)) => {
                    let range = r.range;
                    self.ranges.remove(&range);
                    stack.extend(self.remove_vertex(id)?);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /* ───────────────────── cells and formulas ───────────────────── */

    /// Put `vertex` at `addr` and wire `deps` into it. A vertex already at
    /// `addr` hands its dependents over and is dropped.
    pub(crate) fn set_cell_vertex(
        &mut self,
        addr: SimpleCellAddress,
        vertex: Vertex,
        deps: &[CellDependency],
    ) -> Result<VertexId, GraphError> {
        let old = self.vertex_at(addr);
        if let Some(old) = old {
            if self.matrices.containing(&addr).is_some() {
                return Err(GraphError::MalformedRange(format!("{addr} lies inside a matrix")));
            }
            if let (Some(Vertex::Value(current)), Vertex::Value(new)) =
                (self.vertex_mut(old), &vertex)
            {
                *current = new.clone();
                self.mark_changed(old);
                return Ok(old);
            }
        }

        let id = self.add_vertex(vertex);
        self.add_dependencies(id, deps)?;
        // A formula reading its own fresh address left an empty placeholder
        // there; exchanging it turns that edge into a self-loop.
        match old.or_else(|| self.vertex_at(addr)) {
            Some(old) => self.exchange_node(old, id)?,
            None => self.connect_infinite_ranges(addr, id)?,
        }
        self.place(addr, id);
        self.mark_changed(id);
        Ok(id)
    }

    pub(crate) fn add_dependencies(
        &mut self,
        id: VertexId,
        deps: &[CellDependency],
    ) -> Result<(), GraphError> {
        for dep in deps {
            let source = match dep {
                CellDependency::Cell(addr) => self.fetch_cell_or_create_empty(*addr)?,
                CellDependency::Range(range) => self.range_vertex(*range)?,
            };
            self.graph.add_edge(source, id)?;
        }
        Ok(())
    }

    /// Clear `addr`. The address keeps an empty vertex only while something
    /// still depends on it.
    pub(crate) fn clear_cell(&mut self, addr: SimpleCellAddress) -> Result<(), GraphError> {
        let Some(old) = self.vertex_at(addr) else {
            return Ok(());
        };
        if matches!(self.vertex(old), Some(Vertex::Empty)) {
            return Ok(());
        }
        if self.graph.dependents_count(old) > 0 {
            let id = self.add_vertex(Vertex::Empty);
            self.exchange_node(old, id)?;
            self.place(addr, id);
            self.mark_changed(id);
        } else {
            self.addresses.remove(addr);
            let sources = self.remove_vertex(old)?;
            self.collect_garbage(sources)?;
        }
        Ok(())
    }

    /* ───────────────────────── ranges ───────────────────────── */

    /// The vertex for `range`, created and wired on first use.
    ///
    /// A finite range whose copy without the last row already exists is
    /// wired to that smaller range plus its own last row only.
    pub(crate) fn range_vertex(&mut self, range: AbsoluteCellRange) -> Result<VertexId, GraphError> {
        if let Some(id) = self.ranges.get(&range) {
            return Ok(id);
        }
        if range.start.col > range.end.col || range.start.row > range.end.row {
            return Err(GraphError::MalformedRange(range.to_string()));
        }
        let id = self.add_vertex(Vertex::Range(RangeVertex::new(range)));
        self.ranges.set(range, id);

        if !range.is_finite() {
            self.infinite_ranges.insert(id);
            let mut cells: Vec<VertexId> = self
                .addresses
                .entries(range.sheet())
                .into_iter()
                .filter(|(a, _)| range.contains(a))
                .map(|(_, v)| v)
                .collect();
            cells.dedup();
            for c in cells {
                self.graph.add_edge(c, id)?;
            }
            return Ok(id);
        }

        let rest = match self.ranges.find_smaller(&range) {
            Some((smaller, rest)) => {
                self.graph.add_edge(smaller, id)?;
                rest
            }
            None => range,
        };
        self.wire_cells(rest, id)?;
        Ok(id)
    }

    /// Edge from every cell of `area` into `target`.
    pub(super) fn wire_cells(
        &mut self,
        area: AbsoluteCellRange,
        target: VertexId,
    ) -> Result<(), GraphError> {
        let addrs: Vec<SimpleCellAddress> = area.addresses().collect();
        for addr in addrs {
            let cell = self.fetch_cell_or_create_empty(addr)?;
            self.graph.add_edge(cell, target)?;
        }
        Ok(())
    }

    /// The smaller range `range_id` was wired from, if it really was.
    pub fn smaller_range_of(&self, range_id: VertexId) -> Option<(VertexId, AbsoluteCellRange)> {
        let range = self.vertex(range_id)?.as_range()?.range;
        let (smaller, rest) = self.ranges.find_smaller(&range)?;
        self.graph
            .has_edge(smaller, range_id)
            .then_some((smaller, rest))
    }

    /// Clear the memo of `range_id` and of every range whose criterion
    /// results were computed from it.
    pub(crate) fn clear_range_cache(&self, range_id: VertexId) {
        let mut stack = vec![range_id];
        let mut seen = FxHashSet::default();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(r) = self.vertex(id).and_then(Vertex::as_range) {
                stack.extend(r.clear_cache());
            }
        }
    }

    /* ───────────────────────── matrices ───────────────────────── */

    /// Place `matrix`, taking over the dependents of whatever occupied its
    /// span. Callers make sure the span overlaps no other matrix.
    pub(crate) fn add_matrix(
        &mut self,
        matrix: MatrixVertex,
        deps: &[CellDependency],
    ) -> Result<VertexId, GraphError> {
        let span = matrix.span();
        if self.matrices.intersecting(&span).first().is_some() {
            return Err(GraphError::MalformedRange(span.to_string()));
        }
        let id = self.add_vertex(Vertex::Matrix(matrix));
        self.add_dependencies(id, deps)?;
        for addr in span.addresses().collect::<Vec<_>>() {
            match self.vertex_at(addr) {
                Some(old) => self.exchange_node(old, id)?,
                None => self.connect_infinite_ranges(addr, id)?,
            }
            self.addresses.set(addr, id);
        }
        self.matrices.set(span, id);
        self.mark_changed(id);
        Ok(id)
    }

    /// Remove the matrix over `span` and hand its dependents to per-cell
    /// vertices. Numeric matrices leave their numbers behind as values;
    /// formula matrices leave empty cells.
    pub(crate) fn dissolve_matrix(&mut self, span: AbsoluteCellRange) -> Result<(), GraphError> {
        let id = self
            .matrices
            .get(&span)
            .ok_or_else(|| GraphError::MalformedRange(span.to_string()))?;
        let Some(Vertex::Matrix(matrix)) = self.vertex(id) else {
            return Err(GraphError::UnknownNode(id.to_string()));
        };
        let leftovers: Vec<(SimpleCellAddress, CellValue)> = match (&matrix.formula, &matrix.values) {
            (None, MatrixValues::Computed(_)) => matrix.cells(),
            _ => Vec::new(),
        };
        let targets: Vec<VertexId> = self
            .graph
            .adjacent_nodes(id)
            .map(|s| s.iter().copied().filter(|t| *t != id).collect())
            .unwrap_or_default();

        self.matrices.remove(&span);
        for addr in span.addresses() {
            self.addresses.remove(addr);
        }
        let sources = self.remove_vertex(id)?;

        for (addr, value) in leftovers {
            let cell = self.add_vertex(Vertex::Value(value));
            self.place(addr, cell);
            self.connect_infinite_ranges(addr, cell)?;
        }
        for t in targets {
            self.relink_dependent(t, span)?;
            self.mark_changed(t);
        }
        for addr in span.addresses() {
            if let Some(cell) = self.vertex_at(addr) {
                self.mark_changed(cell);
            }
        }
        self.collect_garbage(sources)
    }

    /// Re-add the edges `target` had into the cells of a dissolved span.
    fn relink_dependent(
        &mut self,
        target: VertexId,
        span: AbsoluteCellRange,
    ) -> Result<(), GraphError> {
        let cells: Vec<SimpleCellAddress> = match self.vertex(target) {
            Some(Vertex::Range(r)) => r
                .range
                .intersection(&span)
                .map(|i| i.addresses().collect())
                .unwrap_or_default(),
            Some(Vertex::Formula(f)) => cell_references_in(&f.ast, f.address, &span),
            Some(Vertex::Matrix(m)) => m
                .formula
                .as_ref()
                .map(|ast| cell_references_in(ast, m.start, &span))
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        for addr in cells {
            let cell = self.fetch_cell_or_create_empty(addr)?;
            self.graph.add_edge(cell, target)?;
        }
        Ok(())
    }

    /* ─────────────────────── distribution ─────────────────────── */

    /// A copy holding only `nodes` and the edges among them.
    pub(crate) fn subgraph(&self, nodes: &FxHashSet<VertexId>) -> DependencyGraph {
        let mut graph = Graph::new();
        for &n in nodes {
            graph.add_node(n);
        }
        for &n in nodes {
            if let Some(targets) = self.graph.adjacent_nodes(n) {
                for t in targets.iter().filter(|t| nodes.contains(t)) {
                    // Both endpoints were added above.
                    let _ = graph.add_edge(n, *t);
                }
            }
        }
        let vertices = self
            .vertices
            .iter()
            .enumerate()
            .map(|(i, v)| {
                if nodes.contains(&VertexId::new(i as u32)) {
                    v.clone()
                } else {
                    None
                }
            })
            .collect();
        let keep = |id: &VertexId| nodes.contains(id);
        let mut ranges = RangeMapping::new();
        let mut matrices = MatrixMapping::new();
        for sheet in self.sheets.ids() {
            for (r, id) in self.ranges.entries(sheet).into_iter().filter(|(_, id)| keep(id)) {
                ranges.set(r, id);
            }
            for (s, id) in self.matrices.entries(sheet).into_iter().filter(|(_, id)| keep(id)) {
                matrices.set(s, id);
            }
        }
        DependencyGraph {
            vertices,
            graph,
            sheets: self.sheets.clone(),
            addresses: self.addresses.filtered(|id| nodes.contains(&id)),
            ranges,
            matrices,
            positions: self
                .positions
                .iter()
                .filter(|(id, _)| nodes.contains(*id))
                .map(|(id, a)| (*id, *a))
                .collect(),
            volatile: self.volatile.iter().copied().filter(keep).collect(),
            structural: self.structural.iter().copied().filter(keep).collect(),
            infinite_ranges: self.infinite_ranges.iter().copied().filter(keep).collect(),
            changed: FxHashSet::default(),
        }
    }
}

/// Cells inside `span` that `ast`, placed at `base`, references directly.
fn cell_references_in(
    ast: &ASTNode,
    base: SimpleCellAddress,
    span: &AbsoluteCellRange,
) -> Vec<SimpleCellAddress> {
    let mut out = Vec::new();
    ast.walk(&mut |node| {
        if let ASTNode::Reference(r @ ReferenceType::Cell { .. }) = node {
            if let Some(addr) = r.resolve_cell(base) {
                if span.contains(&addr) && !out.contains(&addr) {
                    out.push(addr);
                }
            }
        }
    });
    out
}
