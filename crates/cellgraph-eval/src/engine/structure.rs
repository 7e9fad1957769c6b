//! Row and column insertion, removal and moves, plus block moves and
//! sheet removal.
//!
//! Vertices move together with their cells, so edges between cells survive
//! an edit untouched. What has to change is everything keyed by position:
//! the address, range and matrix mappings, and the references stored in
//! formula trees, which are rewritten against the formula's new address.

use std::sync::Arc;

use cellgraph_common::{
    AbsoluteCellRange, Axis, SheetId, SimpleCellAddress, Span, UNBOUNDED, insert_coord,
    insert_span, remove_coord, remove_span,
};
use cellgraph_parse::{ASTNode, AxisRef, ReferenceType, RelativeCell};
use rustc_hash::{FxHashMap, FxHashSet};

use super::eval::Engine;
use super::vertex::{MatrixVertex, Vertex, VertexId};
use super::{EngineError, ExportedChange, GraphError};

/// One structural edit: `span` inserted, or removed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineEdit {
    pub span: Span,
    pub removal: bool,
    /// Number of lines the sheet may have along `span.axis`.
    pub limit: u32,
}

impl LineEdit {
    /// New position of line `c`, `None` when it is removed or pushed past
    /// the sheet limit.
    pub fn coord(&self, c: u32) -> Option<u32> {
        let Span { start, count, .. } = self.span;
        if self.removal {
            return remove_coord(c, start, count);
        }
        let moved = insert_coord(c, start, count);
        (moved == UNBOUNDED || moved < self.limit).then_some(moved)
    }

    /// New extent of the band `[lo, hi]`. Whole-axis bands never move.
    pub fn band(&self, lo: u32, hi: u32) -> Option<(u32, u32)> {
        let Span { start, count, .. } = self.span;
        if lo == 0 && hi == UNBOUNDED {
            return Some((lo, hi));
        }
        if self.removal {
            return remove_span(lo, hi, start, count);
        }
        let (lo, hi) = insert_span(lo, hi, start, count);
        (hi == UNBOUNDED || hi < self.limit).then_some((lo, hi))
    }

    pub fn address(&self, addr: SimpleCellAddress) -> Option<SimpleCellAddress> {
        if addr.sheet != self.span.sheet {
            return Some(addr);
        }
        let axis = self.span.axis;
        Some(addr.with_coord(axis, self.coord(addr.coord(axis))?))
    }

    pub fn range(&self, range: &AbsoluteCellRange) -> Option<AbsoluteCellRange> {
        if range.sheet() != self.span.sheet {
            return Some(*range);
        }
        let axis = self.span.axis;
        let (lo, hi) = self.band(range.start.coord(axis), range.end.coord(axis))?;
        Some(AbsoluteCellRange::new(
            range.start.with_coord(axis, lo),
            range.end.with_coord(axis, hi),
        ))
    }

    /// Whether the edit cuts `[lo, hi]` into pieces that do not stay together.
    fn splits(&self, lo: u32, hi: u32) -> bool {
        if self.removal {
            self.span.intersects(lo, hi) && !(self.span.start <= lo && hi <= self.span.end())
        } else {
            lo < self.span.start && self.span.start <= hi
        }
    }

    /// The inserted or removed lines as a range.
    fn area(&self) -> AbsoluteCellRange {
        let Span {
            sheet,
            axis,
            start,
            count,
        } = self.span;
        let end = start.saturating_add(count - 1);
        match axis {
            Axis::Row => AbsoluteCellRange::from_coordinates(sheet, 0, start, UNBOUNDED, end),
            Axis::Column => AbsoluteCellRange::from_coordinates(sheet, start, 0, end, UNBOUNDED),
        }
    }
}

/// Rewrite the references of `ast`, written at `old_base`, for a formula
/// now living at `new_base`. Sets `lost` when a reference became `#REF!`.
pub(crate) fn move_references(
    ast: &ASTNode,
    old_base: SimpleCellAddress,
    new_base: SimpleCellAddress,
    edit: &LineEdit,
    lost: &mut bool,
) -> ASTNode {
    ast.map_references(&mut |r| {
        let moved = move_reference(r, old_base, new_base, edit);
        *lost |= moved.is_none();
        moved
    })
}

fn move_reference(
    r: &ReferenceType,
    old: SimpleCellAddress,
    new: SimpleCellAddress,
    edit: &LineEdit,
) -> Option<ReferenceType> {
    let touched = r.sheet().unwrap_or(old.sheet) == edit.span.sheet;
    let along = |axis: Axis| (touched && edit.span.axis == axis).then_some(edit);
    Some(match r {
        ReferenceType::Cell { sheet, cell } => ReferenceType::Cell {
            sheet: *sheet,
            cell: RelativeCell {
                col: move_point(cell.col, old.col, new.col, along(Axis::Column))?,
                row: move_point(cell.row, old.row, new.row, along(Axis::Row))?,
            },
        },
        ReferenceType::Range { sheet, start, end } => {
            let (sc, ec) = move_pair(start.col, end.col, old.col, new.col, along(Axis::Column))?;
            let (sr, er) = move_pair(start.row, end.row, old.row, new.row, along(Axis::Row))?;
            ReferenceType::Range {
                sheet: *sheet,
                start: RelativeCell { col: sc, row: sr },
                end: RelativeCell { col: ec, row: er },
            }
        }
        ReferenceType::ColumnRange { sheet, start, end } => {
            let (start, end) = move_pair(*start, *end, old.col, new.col, along(Axis::Column))?;
            ReferenceType::ColumnRange {
                sheet: *sheet,
                start,
                end,
            }
        }
        ReferenceType::RowRange { sheet, start, end } => {
            let (start, end) = move_pair(*start, *end, old.row, new.row, along(Axis::Row))?;
            ReferenceType::RowRange {
                sheet: *sheet,
                start,
                end,
            }
        }
    })
}

fn move_point(a: AxisRef, old_base: u32, new_base: u32, edit: Option<&LineEdit>) -> Option<AxisRef> {
    let Some(target) = a.resolve(old_base) else {
        return Some(a);
    };
    let target = match edit {
        Some(edit) => edit.coord(target)?,
        None => target,
    };
    Some(a.rebase(target, new_base))
}

fn move_pair(
    start: AxisRef,
    end: AxisRef,
    old_base: u32,
    new_base: u32,
    edit: Option<&LineEdit>,
) -> Option<(AxisRef, AxisRef)> {
    let (Some(a), Some(b)) = (start.resolve(old_base), end.resolve(old_base)) else {
        return Some((start, end));
    };
    let (lo, hi) = match edit {
        Some(edit) => edit.band(a.min(b), a.max(b))?,
        None => (a.min(b), a.max(b)),
    };
    let (ta, tb) = if a <= b { (lo, hi) } else { (hi, lo) };
    Some((start.rebase(ta, new_base), end.rebase(tb, new_base)))
}

/// A block of cells lifted from `source` and dropped on `target`, a
/// rectangle of the same shape.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CellMove {
    pub source: AbsoluteCellRange,
    pub target: AbsoluteCellRange,
    /// Set when `source` is made of complete rows or columns, so that
    /// `2:3` or `B:C` style ranges inside it travel too.
    pub whole_lines: Option<Axis>,
}

impl CellMove {
    pub fn new(source: AbsoluteCellRange, destination: SimpleCellAddress) -> Self {
        Self {
            source,
            target: AbsoluteCellRange::span_from(destination, source.width(), source.height()),
            whole_lines: None,
        }
    }

    /// Landing spot of a source cell. Unbounded coordinates stay unbounded
    /// because whole-line moves never shift along the line.
    fn shift(&self, addr: SimpleCellAddress) -> SimpleCellAddress {
        let along = |c: u32, from: u32, to: u32| {
            if c == UNBOUNDED { c } else { c - from + to }
        };
        SimpleCellAddress::new(
            self.target.sheet(),
            along(addr.col, self.source.start.col, self.target.start.col),
            along(addr.row, self.source.start.row, self.target.start.row),
        )
    }

    pub fn address(&self, addr: SimpleCellAddress) -> Option<SimpleCellAddress> {
        self.source.contains(&addr).then(|| self.shift(addr))
    }

    /// New place of `range` when it lies wholly inside the moved block.
    pub fn range(&self, range: &AbsoluteCellRange) -> Option<AbsoluteCellRange> {
        let (src, sheet) = (&self.source, range.sheet() == self.source.sheet());
        let inside = match self.whole_lines {
            Some(Axis::Row) if range.start.col == 0 && range.end.col == UNBOUNDED => {
                sheet && src.start.row <= range.start.row && range.end.row <= src.end.row
            }
            Some(Axis::Column) if range.start.row == 0 && range.end.row == UNBOUNDED => {
                sheet && src.start.col <= range.start.col && range.end.col <= src.end.col
            }
            _ => src.contains_range(range),
        };
        inside.then(|| AbsoluteCellRange::new(self.shift(range.start), self.shift(range.end)))
    }
}

/// Rewrite the references of `ast` for a cell move. `moved` says whether
/// the formula itself travels with the block, from `old_base` to
/// `new_base`. Sets `lost` when a reference became `#REF!`.
pub(crate) fn relocate_references(
    ast: &ASTNode,
    old_base: SimpleCellAddress,
    new_base: SimpleCellAddress,
    mv: &CellMove,
    moved: bool,
    lost: &mut bool,
) -> ASTNode {
    ast.map_references(&mut |r| {
        let out = relocate_reference(r, old_base, new_base, mv, moved);
        *lost |= out.is_none();
        out
    })
}

fn relocate_reference(
    r: &ReferenceType,
    old: SimpleCellAddress,
    new: SimpleCellAddress,
    mv: &CellMove,
    moved: bool,
) -> Option<ReferenceType> {
    let qualifier = |target: SheetId| match r.sheet() {
        None if target == new.sheet => None,
        _ => Some(target),
    };
    let cell = |rel: &RelativeCell, at: SimpleCellAddress| RelativeCell {
        col: rel.col.rebase(at.col, new.col),
        row: rel.row.rebase(at.row, new.row),
    };
    Some(match r {
        ReferenceType::Cell { cell: rel, .. } => {
            let Some(target) = r.resolve_cell(old) else {
                return Some(r.clone());
            };
            let target = match mv.address(target) {
                Some(shifted) => shifted,
                // the block overwrote what the formula pointed at
                None if moved && mv.target.contains(&target) => return None,
                None => target,
            };
            ReferenceType::Cell {
                sheet: qualifier(target.sheet),
                cell: cell(rel, target),
            }
        }
        ReferenceType::Range { sheet, start, end } => {
            let on = sheet.unwrap_or(old.sheet);
            let (Some(a), Some(b)) = (start.resolve(on, old), end.resolve(on, old)) else {
                return Some(r.clone());
            };
            let (a, b) = match mv.range(&AbsoluteCellRange::new(a, b)) {
                Some(_) => (mv.shift(a), mv.shift(b)),
                None => (a, b),
            };
            ReferenceType::Range {
                sheet: qualifier(a.sheet),
                start: cell(start, a),
                end: cell(end, b),
            }
        }
        ReferenceType::ColumnRange { start, end, .. } => {
            let (Some(a), Some(b)) = (start.resolve(old.col), end.resolve(old.col)) else {
                return Some(r.clone());
            };
            let (sheet, a, b) = match r.to_range(old).and_then(|range| mv.range(&range)) {
                Some(shifted) => {
                    let delta = shifted.start.col as i64 - a.min(b) as i64;
                    let by = |c: u32| (c as i64 + delta) as u32;
                    (shifted.sheet(), by(a), by(b))
                }
                None => (r.sheet().unwrap_or(old.sheet), a, b),
            };
            ReferenceType::ColumnRange {
                sheet: qualifier(sheet),
                start: start.rebase(a, new.col),
                end: end.rebase(b, new.col),
            }
        }
        ReferenceType::RowRange { start, end, .. } => {
            let (Some(a), Some(b)) = (start.resolve(old.row), end.resolve(old.row)) else {
                return Some(r.clone());
            };
            let (sheet, a, b) = match r.to_range(old).and_then(|range| mv.range(&range)) {
                Some(shifted) => {
                    let delta = shifted.start.row as i64 - a.min(b) as i64;
                    let by = |c: u32| (c as i64 + delta) as u32;
                    (shifted.sheet(), by(a), by(b))
                }
                None => (r.sheet().unwrap_or(old.sheet), a, b),
            };
            ReferenceType::RowRange {
                sheet: qualifier(sheet),
                start: start.rebase(a, new.row),
                end: end.rebase(b, new.row),
            }
        }
    })
}

/// Replace every reference to `sheet` with `#REF!`.
fn forget_sheet(ast: &ASTNode, base: SimpleCellAddress, sheet: SheetId, lost: &mut bool) -> ASTNode {
    ast.map_references(&mut |r| {
        let gone = r.sheet().unwrap_or(base.sheet) == sheet;
        *lost |= gone;
        (!gone).then(|| r.clone())
    })
}

impl Engine {
    /// Insert `count` empty rows before row `index`.
    pub fn add_rows(
        &mut self,
        sheet: SheetId,
        index: u32,
        count: u32,
    ) -> Result<Vec<ExportedChange>, EngineError> {
        self.insert_lines(Span::rows(sheet, index, count))
    }

    /// Remove rows `[start, start + count)`.
    pub fn remove_rows(
        &mut self,
        sheet: SheetId,
        start: u32,
        count: u32,
    ) -> Result<Vec<ExportedChange>, EngineError> {
        self.remove_lines(Span::rows(sheet, start, count))
    }

    pub fn add_columns(
        &mut self,
        sheet: SheetId,
        index: u32,
        count: u32,
    ) -> Result<Vec<ExportedChange>, EngineError> {
        self.insert_lines(Span::columns(sheet, index, count))
    }

    pub fn remove_columns(
        &mut self,
        sheet: SheetId,
        start: u32,
        count: u32,
    ) -> Result<Vec<ExportedChange>, EngineError> {
        self.remove_lines(Span::columns(sheet, start, count))
    }

    fn line_edit(&self, span: Span, removal: bool) -> Result<LineEdit, EngineError> {
        self.ensure_sheet(span.sheet)?;
        if span.count == 0 {
            return Err(EngineError::InvalidArguments(
                "count must be at least 1".to_string(),
            ));
        }
        let limit = match span.axis {
            Axis::Row => self.config.max_rows,
            Axis::Column => self.config.max_columns,
        };
        Ok(LineEdit {
            span,
            removal,
            limit,
        })
    }

    fn insert_lines(&mut self, span: Span) -> Result<Vec<ExportedChange>, EngineError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "insert_lines",
            sheet = span.sheet,
            axis = ?span.axis,
            start = span.start,
            count = span.count
        )
        .entered();

        let edit = self.line_edit(span, false)?;
        let extent = match span.axis {
            Axis::Row => self.graph.addresses().sheet_height(span.sheet),
            Axis::Column => self.graph.addresses().sheet_width(span.sheet),
        };
        if span.start < extent && extent as u64 + span.count as u64 > edit.limit as u64 {
            return Err(self.size_limit());
        }
        self.split_matrices(&edit)?;

        self.graph
            .addresses
            .insert_lines(span.sheet, span.axis, span.start, span.count);
        self.move_matrix_spans(&edit);
        let moved = self.move_ranges(&edit)?;
        self.rewrite_formulas(&edit);
        self.graph.rebuild_positions(span.sheet);

        // cells of the new lines inside a grown range
        let area = edit.area();
        for (id, old, new) in moved.resized {
            if !new.is_finite() || new.extent(span.axis) == old.extent(span.axis) {
                continue;
            }
            self.graph.mark_changed(id);
            let Some(fresh) = new.intersection(&area) else {
                continue;
            };
            let covered: Vec<AbsoluteCellRange> = self
                .graph
                .graph()
                .predecessors(id)
                .into_iter()
                .flatten()
                .filter_map(|p| self.graph.vertex(*p).and_then(Vertex::as_range))
                .map(|r| r.range)
                .collect();
            let addrs: Vec<SimpleCellAddress> = fresh
                .addresses()
                .filter(|a| !covered.iter().any(|c| c.contains(a)))
                .collect();
            for addr in addrs {
                let cell = self.graph.fetch_cell_or_create_empty(addr)?;
                self.graph.add_edge(cell, id)?;
            }
        }
        self.finish_edit(true, Vec::new())
    }

    fn remove_lines(&mut self, span: Span) -> Result<Vec<ExportedChange>, EngineError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "remove_lines",
            sheet = span.sheet,
            axis = ?span.axis,
            start = span.start,
            count = span.count
        )
        .entered();

        let edit = self.line_edit(span, true)?;
        self.split_matrices(&edit)?;

        let removed = self
            .graph
            .addresses
            .remove_lines(span.sheet, span.axis, span.start, span.count);
        let mut doomed: Vec<VertexId> = removed.into_iter().map(|(_, id)| id).collect();
        self.move_matrix_spans(&edit);
        let moved = self.move_ranges(&edit)?;
        doomed.extend(moved.dropped);
        let candidates = self.drop_vertices(doomed)?;

        for (keep, duplicate) in moved.merged {
            self.merge_ranges(keep, duplicate)?;
        }
        for (id, old, new) in moved.resized {
            if new.extent(span.axis) != old.extent(span.axis) && self.graph.vertex(id).is_some() {
                self.graph.mark_changed(id);
            }
        }

        self.rewrite_formulas(&edit);
        self.graph.rebuild_positions(span.sheet);
        self.graph.collect_garbage(candidates)?;
        self.finish_edit(true, Vec::new())
    }

    /// Refuse edits that cut through a matrix formula; dissolve numeric
    /// matrices they cut through.
    fn split_matrices(&mut self, edit: &LineEdit) -> Result<(), EngineError> {
        let axis = edit.span.axis;
        let mut numeric = Vec::new();
        for (span, id) in self.graph.matrices().entries(edit.span.sheet) {
            if !edit.splits(span.start.coord(axis), span.end.coord(axis)) {
                continue;
            }
            let is_formula = self
                .graph
                .vertex(id)
                .and_then(Vertex::as_matrix)
                .is_some_and(MatrixVertex::is_formula);
            if is_formula {
                return Err(EngineError::MatrixEdit(span.start));
            }
            numeric.push(span);
        }
        for span in numeric {
            self.graph.dissolve_matrix(span)?;
        }
        Ok(())
    }

    fn move_matrix_spans(&mut self, edit: &LineEdit) {
        let sheet = edit.span.sheet;
        let moved = self
            .graph
            .matrices()
            .entries(sheet)
            .into_iter()
            .filter_map(|(span, id)| edit.range(&span).map(|s| (s, id)))
            .collect();
        self.graph.matrices.replace_sheet(sheet, moved);
    }

    fn move_ranges(&mut self, edit: &LineEdit) -> Result<MovedRanges, GraphError> {
        let sheet = edit.span.sheet;
        let mut out = MovedRanges::default();
        let mut kept = Vec::new();
        let mut by_key: FxHashMap<String, VertexId> = FxHashMap::default();
        for (old, id) in self.graph.ranges().entries(sheet) {
            let Some(new) = edit.range(&old) else {
                out.dropped.push(id);
                continue;
            };
            if let Some(&keep) = by_key.get(&new.key()) {
                out.merged.push((keep, id));
                continue;
            }
            by_key.insert(new.key(), id);
            kept.push((new, id));
            if new != old {
                out.resized.push((id, old, new));
            }
        }
        self.graph.ranges.replace_sheet(sheet, kept);
        for &(id, _, new) in &out.resized {
            match self.graph.vertex_mut(id) {
                Some(Vertex::Range(r)) => r.range = new,
                _ => return Err(GraphError::UnknownNode(id.to_string())),
            }
            self.graph.clear_range_cache(id);
        }
        Ok(out)
    }

    /// Remove `ids` and mark whatever read them. Returns their former
    /// sources as garbage candidates.
    fn drop_vertices(&mut self, ids: Vec<VertexId>) -> Result<Vec<VertexId>, GraphError> {
        let doomed: FxHashSet<VertexId> = ids.into_iter().collect();
        let mut ordered: Vec<VertexId> = doomed.iter().copied().collect();
        ordered.sort_unstable();
        let mut candidates = Vec::new();
        for id in ordered {
            if self.graph.vertex(id).is_none() {
                continue;
            }
            let dependents: Vec<VertexId> = self
                .graph
                .graph()
                .adjacent_nodes(id)
                .into_iter()
                .flatten()
                .copied()
                .filter(|d| !doomed.contains(d))
                .collect();
            for d in dependents {
                self.graph.mark_changed(d);
            }
            candidates.extend(self.graph.remove_vertex(id)?);
        }
        candidates.retain(|c| !doomed.contains(c));
        Ok(candidates)
    }

    /// Fold `duplicate` into `keep` after both ranges landed on one key.
    fn merge_ranges(&mut self, keep: VertexId, duplicate: VertexId) -> Result<(), GraphError> {
        if self.graph.vertex(duplicate).is_none() {
            return Ok(());
        }
        self.graph.graph.remove_edge(duplicate, keep);
        let sources: Vec<VertexId> = self
            .graph
            .graph()
            .predecessors(duplicate)
            .into_iter()
            .flatten()
            .copied()
            .filter(|s| *s != keep)
            .collect();
        for s in sources {
            self.graph.add_edge(s, keep)?;
        }
        self.graph.mark_changed(keep);
        self.graph.exchange_node(duplicate, keep)
    }

    /// Re-anchor every formula tree after `edit` and move formula
    /// addresses. Formulas that lost a reference are marked for recompute.
    fn rewrite_formulas(&mut self, edit: &LineEdit) {
        let mut lost_refs = Vec::new();
        for (index, slot) in self.graph.vertices.iter_mut().enumerate() {
            let mut lost = false;
            match slot {
                Some(Vertex::Formula(f)) => {
                    let new_base = edit.address(f.address).unwrap_or(f.address);
                    f.ast = Arc::new(move_references(&f.ast, f.address, new_base, edit, &mut lost));
                    f.address = new_base;
                }
                Some(Vertex::Matrix(m)) => {
                    let new_start = edit.address(m.start).unwrap_or(m.start);
                    if let Some(ast) = &m.formula {
                        m.formula = Some(Arc::new(move_references(
                            ast, m.start, new_start, edit, &mut lost,
                        )));
                    }
                    m.start = new_start;
                }
                _ => {}
            }
            if lost {
                lost_refs.push(VertexId::new(index as u32));
            }
        }
        for id in lost_refs {
            self.graph.mark_changed(id);
        }
    }
}

impl Engine {
    /// Move the block `source` so that its top-left cell lands on
    /// `destination`, possibly on another sheet.
    ///
    /// References into the block follow it. Formulas inside the block keep
    /// pointing at the same cells outside it, except cells the block lands
    /// on, which become `#REF!`. Whatever sat under the target is replaced.
    pub fn move_cells(
        &mut self,
        source: AbsoluteCellRange,
        destination: SimpleCellAddress,
    ) -> Result<Vec<ExportedChange>, EngineError> {
        if !source.is_finite() {
            return Err(EngineError::InvalidArguments(format!("cannot move {source}")));
        }
        self.move_block(CellMove::new(source, destination))
    }

    /// Move rows `[start, start + count)` so they sit right before row
    /// `target` as numbered before the move.
    pub fn move_rows(
        &mut self,
        sheet: SheetId,
        start: u32,
        count: u32,
        target: u32,
    ) -> Result<Vec<ExportedChange>, EngineError> {
        self.move_lines(Span::rows(sheet, start, count), target)
    }

    pub fn move_columns(
        &mut self,
        sheet: SheetId,
        start: u32,
        count: u32,
        target: u32,
    ) -> Result<Vec<ExportedChange>, EngineError> {
        self.move_lines(Span::columns(sheet, start, count), target)
    }

    /// Drop `sheet` with everything on it. References to it from other
    /// sheets become `#REF!`; the ids of other sheets do not change.
    pub fn remove_sheet(&mut self, sheet: SheetId) -> Result<Vec<ExportedChange>, EngineError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("remove_sheet", sheet).entered();
        self.ensure_sheet(sheet)?;

        let mut lost_refs = Vec::new();
        for (index, slot) in self.graph.vertices.iter_mut().enumerate() {
            let mut lost = false;
            match slot {
                Some(Vertex::Formula(f)) if f.address.sheet != sheet => {
                    f.ast = Arc::new(forget_sheet(&f.ast, f.address, sheet, &mut lost));
                }
                Some(Vertex::Matrix(m)) if m.start.sheet != sheet => {
                    if let Some(ast) = &m.formula {
                        m.formula = Some(Arc::new(forget_sheet(ast, m.start, sheet, &mut lost)));
                    }
                }
                _ => {}
            }
            if lost {
                lost_refs.push(VertexId::new(index as u32));
            }
        }
        for id in lost_refs {
            self.graph.mark_changed(id);
        }

        let mut doomed: Vec<VertexId> = self
            .graph
            .addresses()
            .entries(sheet)
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        doomed.extend(self.graph.ranges().entries(sheet).into_iter().map(|(_, id)| id));
        self.graph.addresses.remove_sheet(sheet);
        self.graph.ranges.replace_sheet(sheet, Vec::new());
        self.graph.matrices.replace_sheet(sheet, Vec::new());
        let candidates = self.drop_vertices(doomed)?;
        self.graph.positions.retain(|_, a| a.sheet != sheet);
        self.graph.sheets.remove(sheet);
        self.graph.collect_garbage(candidates)?;
        self.finish_edit(true, Vec::new())
    }

    /// Formulas store sheet ids, so only the name changes.
    pub fn rename_sheet(&mut self, sheet: SheetId, name: &str) -> Result<(), EngineError> {
        self.ensure_sheet(sheet)?;
        if self.graph.sheets().get_id(name).is_some_and(|other| other != sheet) {
            return Err(EngineError::SheetNameTaken(name.to_string()));
        }
        self.graph.sheets.rename(sheet, name);
        Ok(())
    }

    fn move_lines(&mut self, span: Span, target: u32) -> Result<Vec<ExportedChange>, EngineError> {
        let edit = self.line_edit(span, true)?;
        let end = span.start as u64 + span.count as u64;
        if end > edit.limit as u64 || target >= edit.limit {
            return Err(self.size_limit());
        }
        if target > span.start && (target as u64) < end {
            return Err(EngineError::InvalidArguments(format!(
                "cannot move lines {}..{end} before line {target} inside them",
                span.start
            )));
        }
        if target == span.start || target as u64 == end {
            return self.finish_edit(false, Vec::new());
        }

        self.batch(|e| {
            e.insert_lines(Span { start: target, ..span })?;
            let band = Span {
                start: if target < span.start { span.start + span.count } else { span.start },
                ..span
            };
            let last = band.end();
            let (source, destination) = match span.axis {
                Axis::Row => (
                    AbsoluteCellRange::from_coordinates(
                        span.sheet,
                        0,
                        band.start,
                        e.config.max_columns.saturating_sub(1),
                        last,
                    ),
                    SimpleCellAddress::new(span.sheet, 0, target),
                ),
                Axis::Column => (
                    AbsoluteCellRange::from_coordinates(
                        span.sheet,
                        band.start,
                        0,
                        last,
                        e.config.max_rows.saturating_sub(1),
                    ),
                    SimpleCellAddress::new(span.sheet, target, 0),
                ),
            };
            let mut mv = CellMove::new(source, destination);
            mv.whole_lines = Some(span.axis);
            e.move_block(mv)?;
            e.remove_lines(band)?;
            Ok(())
        })
    }

    fn move_block(&mut self, mv: CellMove) -> Result<Vec<ExportedChange>, EngineError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("move_cells", source = %mv.source, target = %mv.target)
            .entered();
        self.ensure_sheet(mv.source.sheet())?;
        self.ensure_sheet(mv.target.sheet())?;
        let limits = self.config.limits();
        if !limits.contains(&mv.source.end) {
            return Err(EngineError::InvalidArguments(format!("cannot move {}", mv.source)));
        }
        if !limits.contains(&mv.target.start) || !limits.contains(&mv.target.end) {
            return Err(self.size_limit());
        }
        if mv.source == mv.target {
            return self.finish_edit(false, Vec::new());
        }

        let mut numeric = Vec::new();
        for area in [mv.source, mv.target] {
            for (span, id) in self.graph.matrices().intersecting(&area) {
                let is_formula = self
                    .graph
                    .vertex(id)
                    .and_then(Vertex::as_matrix)
                    .is_some_and(MatrixVertex::is_formula);
                if is_formula {
                    return Err(EngineError::MatrixEdit(span.start));
                }
                if !numeric.contains(&span) {
                    numeric.push(span);
                }
            }
        }
        for span in numeric {
            self.graph.dissolve_matrix(span)?;
        }

        self.relocate_formulas(&mv);
        let writes = self.relocate_vertices(&mv)?;
        self.finish_edit(true, writes)
    }

    /// Rewrite every formula tree for `mv` and move the addresses of the
    /// formulas that travel.
    fn relocate_formulas(&mut self, mv: &CellMove) {
        let mut touched = Vec::new();
        for (index, slot) in self.graph.vertices.iter_mut().enumerate() {
            let mut lost = false;
            let mut moved = false;
            match slot {
                Some(Vertex::Formula(f)) => {
                    let landed = mv.address(f.address);
                    moved = landed.is_some();
                    let new_base = landed.unwrap_or(f.address);
                    f.ast = Arc::new(relocate_references(
                        &f.ast, f.address, new_base, mv, moved, &mut lost,
                    ));
                    f.address = new_base;
                }
                Some(Vertex::Matrix(m)) => {
                    if let Some(ast) = &m.formula {
                        m.formula = Some(Arc::new(relocate_references(
                            ast, m.start, m.start, mv, false, &mut lost,
                        )));
                    }
                }
                _ => {}
            }
            if lost || moved {
                touched.push(VertexId::new(index as u32));
            }
        }
        for id in touched {
            self.graph.mark_changed(id);
        }
    }

    /// Carry the vertices of the block to the target and repair the edges
    /// of everything that read the cells involved. Returns the addresses
    /// whose contents changed.
    fn relocate_vertices(&mut self, mv: &CellMove) -> Result<Vec<SimpleCellAddress>, EngineError> {
        let within = |area: &AbsoluteCellRange, graph: &super::DependencyGraph| {
            graph
                .addresses()
                .entries(area.sheet())
                .into_iter()
                .filter(|(a, _)| area.contains(a))
                .collect::<Vec<_>>()
        };
        let lifted = within(&mv.source, &self.graph);
        for &(addr, _) in &lifted {
            self.graph.addresses.remove(addr);
        }
        let moved: FxHashSet<VertexId> = lifted.iter().map(|&(_, id)| id).collect();
        let travelling: Vec<(AbsoluteCellRange, VertexId)> = self
            .graph
            .ranges()
            .entries(mv.source.sheet())
            .into_iter()
            .filter(|(r, _)| mv.range(r).is_some())
            .collect();
        let travelling_ids: FxHashSet<VertexId> = travelling.iter().map(|&(_, id)| id).collect();
        let is_outside_range = |graph: &super::DependencyGraph, id: &VertexId| {
            matches!(graph.vertex(*id), Some(Vertex::Range(_))) && !travelling_ids.contains(id)
        };

        // ranges staying behind lose the lifted cells
        let mut orphaned = Vec::new();
        for &(addr, id) in &lifted {
            let readers: Vec<VertexId> = self
                .graph
                .graph()
                .adjacent_nodes(id)
                .into_iter()
                .flatten()
                .copied()
                .filter(|r| is_outside_range(&self.graph, r))
                .collect();
            for r in readers {
                self.graph.graph.remove_edge(id, r);
                orphaned.push((addr, r));
            }
        }

        let overwritten = within(&mv.target, &self.graph);
        for &(addr, _) in &overwritten {
            self.graph.addresses.remove(addr);
        }

        let mut writes = Vec::new();
        for &(addr, id) in &lifted {
            let landed = mv.shift(addr);
            self.graph.addresses.set(landed, id);
            self.graph.connect_infinite_ranges(landed, id)?;
            writes.push(addr);
            writes.push(landed);
        }

        // readers of overwritten cells now read whatever landed there
        let mut candidates: Vec<VertexId> = lifted.iter().map(|&(_, id)| id).collect();
        for (addr, old) in overwritten {
            writes.push(addr);
            let readers: Vec<VertexId> = self
                .graph
                .graph()
                .adjacent_nodes(old)
                .into_iter()
                .flatten()
                .copied()
                .filter(|d| *d != old && !moved.contains(d))
                .collect();
            if !readers.is_empty() {
                let cell = self.graph.fetch_cell_or_create_empty(addr)?;
                for d in readers {
                    self.graph.add_edge(cell, d)?;
                    self.graph.mark_changed(d);
                }
            }
            candidates.extend(self.graph.remove_vertex(old)?);
        }

        for (addr, r) in orphaned {
            if self.graph.vertex(r).is_none() {
                continue;
            }
            let infinite = self
                .graph
                .vertex(r)
                .and_then(Vertex::as_range)
                .is_some_and(|rv| !rv.range.is_finite());
            let cell = match self.graph.vertex_at(addr) {
                Some(cell) => Some(cell),
                None if infinite => None,
                None => Some(self.graph.fetch_cell_or_create_empty(addr)?),
            };
            if let Some(cell) = cell {
                self.graph.add_edge(cell, r)?;
            }
            self.graph.mark_changed(r);
            self.graph.clear_range_cache(r);
        }

        // a travelling range no longer feeds the bigger ranges left behind
        for &(old, id) in &travelling {
            let bigger: Vec<VertexId> = self
                .graph
                .graph()
                .adjacent_nodes(id)
                .into_iter()
                .flatten()
                .copied()
                .filter(|r| is_outside_range(&self.graph, r))
                .collect();
            for r in bigger {
                self.graph.graph.remove_edge(id, r);
                self.graph.wire_cells(old, r)?;
                self.graph.mark_changed(r);
                self.graph.clear_range_cache(r);
            }
        }

        for &(old, _) in &travelling {
            self.graph.ranges.remove(&old);
        }
        for (old, id) in travelling {
            let Some(new) = mv.range(&old) else {
                continue;
            };
            match self.graph.ranges().get(&new) {
                Some(existing) => {
                    self.graph.exchange_node(id, existing)?;
                    self.graph.mark_changed(existing);
                }
                None => {
                    self.graph.ranges.set(new, id);
                    if let Some(Vertex::Range(r)) = self.graph.vertex_mut(id) {
                        r.range = new;
                    }
                    self.graph.clear_range_cache(id);
                }
            }
        }

        self.graph.rebuild_positions(mv.source.sheet());
        if mv.target.sheet() != mv.source.sheet() {
            self.graph.rebuild_positions(mv.target.sheet());
        }
        self.graph.collect_garbage(candidates)?;
        writes.sort_unstable();
        writes.dedup();
        Ok(writes)
    }
}

#[derive(Debug, Default)]
struct MovedRanges {
    /// (vertex, old range, new range) for ranges whose key changed.
    resized: Vec<(VertexId, AbsoluteCellRange, AbsoluteCellRange)>,
    /// Ranges that no longer cover any line.
    dropped: Vec<VertexId>,
    /// (kept, duplicate) pairs that collapsed onto one key.
    merged: Vec<(VertexId, VertexId)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellgraph_parse::parse;

    fn rows(start: u32, count: u32, removal: bool) -> LineEdit {
        LineEdit {
            span: Span::rows(0, start, count),
            removal,
            limit: 100,
        }
    }

    fn a(col: u32, row: u32) -> SimpleCellAddress {
        SimpleCellAddress::new(0, col, row)
    }

    fn rewrite(formula: &str, at: SimpleCellAddress, edit: &LineEdit) -> (String, bool) {
        let sheets = vec!["Sheet1"];
        let ast = parse(formula, at, &sheets).unwrap();
        let new_base = edit.address(at).unwrap_or(at);
        let mut lost = false;
        let moved = move_references(&ast, at, new_base, edit, &mut lost);
        (cellgraph_parse::unparse(&moved, new_base, &sheets), lost)
    }

    #[test]
    fn insertion_shifts_references_below_the_index() {
        let edit = rows(1, 1, false);
        assert_eq!(rewrite("=A1+A2", a(1, 2), &edit), ("=A1+A3".to_string(), false));
        assert_eq!(rewrite("=SUM(A1:A3)", a(1, 5), &edit), ("=SUM(A1:A4)".to_string(), false));
        assert_eq!(rewrite("=$A$2", a(1, 0), &edit), ("=$A$3".to_string(), false));
        assert_eq!(rewrite("=SUM(A:A)", a(1, 2), &edit), ("=SUM(A:A)".to_string(), false));
    }

    #[test]
    fn removal_turns_lost_references_into_ref_errors() {
        let edit = rows(0, 3, true);
        assert_eq!(rewrite("=A2", a(1, 5), &edit), ("=#REF!".to_string(), true));
        assert_eq!(rewrite("=SUM(A1:A3)", a(1, 5), &edit), ("=SUM(#REF!)".to_string(), true));
        assert_eq!(rewrite("=SUM(A1:A5)", a(1, 5), &edit), ("=SUM(A1:A2)".to_string(), false));
        assert_eq!(rewrite("=A5", a(1, 5), &edit), ("=A2".to_string(), false));
    }

    #[test]
    fn insertion_past_the_limit_loses_the_reference() {
        let edit = rows(0, 5, false);
        assert_eq!(rewrite("=A98", a(1, 0), &edit), ("=#REF!".to_string(), true));
        assert_eq!(edit.coord(94), Some(99));
        assert_eq!(edit.coord(95), None);
    }

    #[test]
    fn splitting_is_strict_on_insert_and_partial_on_remove() {
        assert!(rows(2, 1, false).splits(1, 3));
        assert!(!rows(1, 1, false).splits(1, 3));
        assert!(!rows(4, 1, false).splits(1, 3));
        assert!(rows(3, 2, true).splits(1, 3));
        assert!(!rows(1, 3, true).splits(1, 3));
        assert!(!rows(5, 1, true).splits(1, 3));
    }

    fn relocate(formula: &str, at: SimpleCellAddress, mv: &CellMove) -> (String, bool) {
        let sheets = vec!["Sheet1", "Data"];
        let ast = parse(formula, at, &sheets).unwrap();
        let new_base = mv.address(at).unwrap_or(at);
        let mut lost = false;
        let moved = relocate_references(&ast, at, new_base, mv, new_base != at, &mut lost);
        (cellgraph_parse::unparse(&moved, new_base, &sheets), lost)
    }

    #[test]
    fn references_follow_the_moved_block() {
        let mv = CellMove::new(AbsoluteCellRange::new(a(0, 0), a(0, 1)), a(2, 0));
        assert_eq!(relocate("=A1+A3", a(1, 4), &mv), ("=C1+A3".to_string(), false));
        assert_eq!(relocate("=$A$2", a(1, 4), &mv), ("=$C$2".to_string(), false));
        assert_eq!(relocate("=SUM(A1:A2)", a(1, 4), &mv), ("=SUM(C1:C2)".to_string(), false));
        assert_eq!(relocate("=SUM(A1:A3)", a(1, 4), &mv), ("=SUM(A1:A3)".to_string(), false));
        assert_eq!(relocate("=C1", a(1, 4), &mv), ("=C1".to_string(), false));
    }

    #[test]
    fn moved_formula_loses_cells_it_landed_on() {
        let mv = CellMove::new(AbsoluteCellRange::new(a(0, 0), a(0, 1)), a(2, 0));
        assert_eq!(
            relocate("=A1+C1+B1", a(0, 1), &mv),
            ("=C1+#REF!+B1".to_string(), true)
        );
    }

    #[test]
    fn moving_to_another_sheet_qualifies_references() {
        let mv = CellMove::new(
            AbsoluteCellRange::single(a(0, 0)),
            SimpleCellAddress::new(1, 2, 0),
        );
        assert_eq!(relocate("=A1*2", a(1, 4), &mv), ("=Data!C1*2".to_string(), false));
        assert_eq!(relocate("=B5", a(0, 0), &mv), ("=Sheet1!B5".to_string(), false));
    }

    #[test]
    fn whole_line_moves_carry_row_ranges() {
        let band = AbsoluteCellRange::from_coordinates(0, 0, 1, 99, 2);
        let mut mv = CellMove::new(band, a(0, 5));
        mv.whole_lines = Some(Axis::Row);
        assert_eq!(relocate("=SUM(2:3)", a(0, 9), &mv), ("=SUM(6:7)".to_string(), false));
        assert_eq!(relocate("=SUM(A:A)", a(1, 9), &mv), ("=SUM(A:A)".to_string(), false));
    }

    #[test]
    fn forgotten_sheet_references_become_ref_errors() {
        let sheets = vec!["Sheet1", "Data"];
        let ast = parse("=Data!A1+A1", a(1, 0), &sheets).unwrap();
        let mut lost = false;
        let out = forget_sheet(&ast, a(1, 0), 1, &mut lost);
        assert!(lost);
        assert_eq!(cellgraph_parse::unparse(&out, a(1, 0), &sheets), "=#REF!+A1");
    }
}
