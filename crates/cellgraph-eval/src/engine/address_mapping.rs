//! Address -> vertex lookup, one backend per sheet.
//!
//! Ragged sheets use nested hash maps; well-filled sheets use per-row
//! arrays indexed by column. The backend is picked at build time from
//! the sheet's fill ratio through an [`AddressMappingPolicy`].

use std::fmt;
use std::sync::Arc;

use cellgraph_common::{
    Axis, SheetId, SimpleCellAddress, insert_coord, remove_coord,
};
use rustc_hash::FxHashMap;

use super::vertex::VertexId;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StrategyKind {
    Sparse,
    Dense,
}

/// Chooses a backend from a sheet's non-empty fill ratio (0.0 ..= 1.0).
#[derive(Clone)]
pub enum AddressMappingPolicy {
    AlwaysSparse,
    AlwaysDense,
    /// Dense when the fill ratio exceeds `threshold`.
    ThresholdBased { threshold: f64 },
    Custom(Arc<dyn Fn(f64) -> StrategyKind + Send + Sync>),
}

impl Default for AddressMappingPolicy {
    fn default() -> Self {
        AddressMappingPolicy::ThresholdBased { threshold: 0.8 }
    }
}

impl fmt::Debug for AddressMappingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlwaysSparse => write!(f, "AlwaysSparse"),
            Self::AlwaysDense => write!(f, "AlwaysDense"),
            Self::ThresholdBased { threshold } => {
                write!(f, "ThresholdBased {{ threshold: {threshold} }}")
            }
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl AddressMappingPolicy {
    pub fn choose(&self, fill_ratio: f64) -> StrategyKind {
        match self {
            Self::AlwaysSparse => StrategyKind::Sparse,
            Self::AlwaysDense => StrategyKind::Dense,
            Self::ThresholdBased { threshold } => {
                if fill_ratio > *threshold {
                    StrategyKind::Dense
                } else {
                    StrategyKind::Sparse
                }
            }
            Self::Custom(f) => f(fill_ratio),
        }
    }
}

/// Contract shared by both backends. Coordinates are zero-based.
pub trait AddressMappingStrategy {
    fn get_cell(&self, col: u32, row: u32) -> Option<VertexId>;
    fn set_cell(&mut self, col: u32, row: u32, id: VertexId);
    fn remove_cell(&mut self, col: u32, row: u32) -> Option<VertexId>;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Every mapped cell as `(col, row, id)`.
    fn entries(&self) -> Vec<(u32, u32, VertexId)>;
    fn len(&self) -> usize;

    fn has(&self, col: u32, row: u32) -> bool {
        self.get_cell(col, row).is_some()
    }
}

/* ─────────────────────────── sparse ─────────────────────────── */

#[derive(Debug, Clone, Default)]
pub struct SparseStrategy {
    /// col -> row -> vertex
    cells: FxHashMap<u32, FxHashMap<u32, VertexId>>,
    width: u32,
    height: u32,
    len: usize,
}

impl SparseStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AddressMappingStrategy for SparseStrategy {
    fn get_cell(&self, col: u32, row: u32) -> Option<VertexId> {
        self.cells.get(&col)?.get(&row).copied()
    }

    fn set_cell(&mut self, col: u32, row: u32, id: VertexId) {
        if self.cells.entry(col).or_default().insert(row, id).is_none() {
            self.len += 1;
        }
        self.width = self.width.max(col + 1);
        self.height = self.height.max(row + 1);
    }

    fn remove_cell(&mut self, col: u32, row: u32) -> Option<VertexId> {
        let column = self.cells.get_mut(&col)?;
        let removed = column.remove(&row);
        if column.is_empty() {
            self.cells.remove(&col);
        }
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn entries(&self) -> Vec<(u32, u32, VertexId)> {
        let mut out: Vec<_> = self
            .cells
            .iter()
            .flat_map(|(&col, rows)| rows.iter().map(move |(&row, &id)| (col, row, id)))
            .collect();
        out.sort_unstable_by_key(|&(c, r, _)| (r, c));
        out
    }

    fn len(&self) -> usize {
        self.len
    }
}

/* ─────────────────────────── dense ──────────────────────────── */

#[derive(Debug, Clone, Default)]
pub struct DenseStrategy {
    /// One slot vector per row, grown to the last column written in that
    /// row. Rows nobody wrote stay unallocated.
    rows: Vec<Vec<Option<VertexId>>>,
    width: u32,
    height: u32,
    len: usize,
}

impl DenseStrategy {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            rows: Vec::new(),
            width,
            height,
            len: 0,
        }
    }

    /// Slots actually held, for checking that growth stays lazy.
    #[cfg(test)]
    fn allocated_slots(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

impl AddressMappingStrategy for DenseStrategy {
    fn get_cell(&self, col: u32, row: u32) -> Option<VertexId> {
        self.rows.get(row as usize)?.get(col as usize).copied().flatten()
    }

    fn set_cell(&mut self, col: u32, row: u32, id: VertexId) {
        let (r, c) = (row as usize, col as usize);
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let cells = &mut self.rows[r];
        if cells.len() <= c {
            cells.resize(c + 1, None);
        }
        if cells[c].replace(id).is_none() {
            self.len += 1;
        }
        self.width = self.width.max(col + 1);
        self.height = self.height.max(row + 1);
    }

    fn remove_cell(&mut self, col: u32, row: u32) -> Option<VertexId> {
        let removed = self.rows.get_mut(row as usize)?.get_mut(col as usize)?.take();
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn entries(&self) -> Vec<(u32, u32, VertexId)> {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(r, cells)| {
                cells
                    .iter()
                    .enumerate()
                    .filter_map(move |(c, id)| id.map(|id| (c as u32, r as u32, id)))
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.len
    }
}

/* ─────────────────────── per-sheet wrapper ──────────────────── */

#[derive(Debug, Clone)]
pub enum SheetStrategy {
    Sparse(SparseStrategy),
    Dense(DenseStrategy),
}

impl SheetStrategy {
    pub fn new(kind: StrategyKind, width: u32, height: u32) -> Self {
        match kind {
            StrategyKind::Sparse => SheetStrategy::Sparse(SparseStrategy::new()),
            StrategyKind::Dense => SheetStrategy::Dense(DenseStrategy::new(width, height)),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            SheetStrategy::Sparse(_) => StrategyKind::Sparse,
            SheetStrategy::Dense(_) => StrategyKind::Dense,
        }
    }

    fn inner(&self) -> &dyn AddressMappingStrategy {
        match self {
            SheetStrategy::Sparse(s) => s,
            SheetStrategy::Dense(d) => d,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn AddressMappingStrategy {
        match self {
            SheetStrategy::Sparse(s) => s,
            SheetStrategy::Dense(d) => d,
        }
    }

    /// Same backend kind, rebuilt from `entries` with room for `width x height`.
    fn rebuilt(&self, width: u32, height: u32, entries: Vec<(u32, u32, VertexId)>) -> Self {
        let mut fresh = SheetStrategy::new(self.kind(), width, height);
        for (col, row, id) in entries {
            fresh.inner_mut().set_cell(col, row, id);
        }
        fresh
    }
}

/// Address -> vertex for the whole workbook.
#[derive(Debug, Clone, Default)]
pub struct AddressMapping {
    sheets: FxHashMap<SheetId, SheetStrategy>,
}

impl AddressMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, sheet: SheetId, strategy: SheetStrategy) {
        self.sheets.insert(sheet, strategy);
    }

    pub fn has_sheet(&self, sheet: SheetId) -> bool {
        self.sheets.contains_key(&sheet)
    }

    pub fn remove_sheet(&mut self, sheet: SheetId) -> Option<SheetStrategy> {
        self.sheets.remove(&sheet)
    }

    pub fn strategy_kind(&self, sheet: SheetId) -> Option<StrategyKind> {
        self.sheets.get(&sheet).map(SheetStrategy::kind)
    }

    pub fn get(&self, addr: SimpleCellAddress) -> Option<VertexId> {
        self.sheets.get(&addr.sheet)?.inner().get_cell(addr.col, addr.row)
    }

    pub fn has(&self, addr: SimpleCellAddress) -> bool {
        self.get(addr).is_some()
    }

    pub fn set(&mut self, addr: SimpleCellAddress, id: VertexId) {
        self.sheets
            .entry(addr.sheet)
            .or_insert_with(|| SheetStrategy::Sparse(SparseStrategy::new()))
            .inner_mut()
            .set_cell(addr.col, addr.row, id);
    }

    pub fn remove(&mut self, addr: SimpleCellAddress) -> Option<VertexId> {
        self.sheets
            .get_mut(&addr.sheet)?
            .inner_mut()
            .remove_cell(addr.col, addr.row)
    }

    pub fn sheet_width(&self, sheet: SheetId) -> u32 {
        self.sheets.get(&sheet).map_or(0, |s| s.inner().width())
    }

    pub fn sheet_height(&self, sheet: SheetId) -> u32 {
        self.sheets.get(&sheet).map_or(0, |s| s.inner().height())
    }

    pub fn entries(&self, sheet: SheetId) -> Vec<(SimpleCellAddress, VertexId)> {
        self.sheets.get(&sheet).map_or_else(Vec::new, |s| {
            s.inner()
                .entries()
                .into_iter()
                .map(|(c, r, id)| (SimpleCellAddress::new(sheet, c, r), id))
                .collect()
        })
    }

    pub fn len(&self) -> usize {
        self.sheets.values().map(|s| s.inner().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shift every cell at or after `index` on `axis` by `count`.
    pub fn insert_lines(&mut self, sheet: SheetId, axis: Axis, index: u32, count: u32) {
        let Some(strategy) = self.sheets.get(&sheet) else {
            return;
        };
        let (w, h) = (strategy.inner().width(), strategy.inner().height());
        let moved = strategy
            .inner()
            .entries()
            .into_iter()
            .map(|(c, r, id)| match axis {
                Axis::Row => (c, insert_coord(r, index, count), id),
                Axis::Column => (insert_coord(c, index, count), r, id),
            })
            .collect();
        let (w, h) = match axis {
            Axis::Row if index < h => (w, h + count),
            Axis::Column if index < w => (w + count, h),
            _ => (w, h),
        };
        let rebuilt = strategy.rebuilt(w, h, moved);
        self.sheets.insert(sheet, rebuilt);
    }

    /// Drop the band `[start, start + count)` on `axis` and close the gap.
    /// Returns the removed cells at their old addresses.
    pub fn remove_lines(
        &mut self,
        sheet: SheetId,
        axis: Axis,
        start: u32,
        count: u32,
    ) -> Vec<(SimpleCellAddress, VertexId)> {
        let Some(strategy) = self.sheets.get(&sheet) else {
            return Vec::new();
        };
        let (w, h) = (strategy.inner().width(), strategy.inner().height());
        let mut removed = Vec::new();
        let mut kept = Vec::new();
        for (c, r, id) in strategy.inner().entries() {
            let coord = match axis {
                Axis::Row => r,
                Axis::Column => c,
            };
            match remove_coord(coord, start, count) {
                None => removed.push((SimpleCellAddress::new(sheet, c, r), id)),
                Some(n) => kept.push(match axis {
                    Axis::Row => (c, n, id),
                    Axis::Column => (n, r, id),
                }),
            }
        }
        let lost = |extent: u32| extent.saturating_sub(start).min(count);
        let (w, h) = match axis {
            Axis::Row => (w, h - lost(h)),
            Axis::Column => (w - lost(w), h),
        };
        let rebuilt = strategy.rebuilt(w, h, kept);
        self.sheets.insert(sheet, rebuilt);
        removed
    }

    /// A copy holding only the cells whose vertex satisfies `keep`.
    pub fn filtered(&self, keep: impl Fn(VertexId) -> bool) -> Self {
        let mut out = AddressMapping::new();
        for (&sheet, strategy) in &self.sheets {
            let entries = strategy
                .inner()
                .entries()
                .into_iter()
                .filter(|(_, _, id)| keep(*id))
                .collect();
            out.sheets.insert(
                sheet,
                strategy.rebuilt(strategy.inner().width(), strategy.inner().height(), entries),
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(col: u32, row: u32) -> SimpleCellAddress {
        SimpleCellAddress::new(0, col, row)
    }

    fn both() -> Vec<AddressMapping> {
        [StrategyKind::Sparse, StrategyKind::Dense]
            .into_iter()
            .map(|kind| {
                let mut m = AddressMapping::new();
                m.add_sheet(0, SheetStrategy::new(kind, 2, 2));
                m
            })
            .collect()
    }

    #[test]
    fn both_backends_share_the_contract() {
        for mut m in both() {
            m.set(addr(0, 0), VertexId::new(1));
            m.set(addr(3, 4), VertexId::new(2));
            assert_eq!(m.get(addr(3, 4)), Some(VertexId::new(2)));
            assert!(m.has(addr(0, 0)));
            assert!(!m.has(addr(1, 1)));
            assert_eq!(m.sheet_width(0), 4);
            assert_eq!(m.sheet_height(0), 5);
            assert_eq!(m.len(), 2);
            assert_eq!(m.remove(addr(0, 0)), Some(VertexId::new(1)));
            assert_eq!(m.len(), 1);
        }
    }

    #[test]
    fn structural_shifts() {
        for mut m in both() {
            m.set(addr(0, 0), VertexId::new(1));
            m.set(addr(0, 1), VertexId::new(2));
            m.set(addr(1, 2), VertexId::new(3));
            m.insert_lines(0, Axis::Row, 1, 2);
            assert_eq!(m.get(addr(0, 0)), Some(VertexId::new(1)));
            assert_eq!(m.get(addr(0, 3)), Some(VertexId::new(2)));
            assert_eq!(m.get(addr(1, 4)), Some(VertexId::new(3)));

            let removed = m.remove_lines(0, Axis::Row, 2, 2);
            assert_eq!(removed, vec![(addr(0, 3), VertexId::new(2))]);
            assert_eq!(m.get(addr(1, 2)), Some(VertexId::new(3)));

            m.insert_lines(0, Axis::Column, 0, 1);
            assert_eq!(m.get(addr(2, 2)), Some(VertexId::new(3)));
        }
    }

    #[test]
    fn dense_rows_grow_only_where_written() {
        let mut dense = DenseStrategy::new(4, 4);
        dense.set_cell(1, 1, VertexId::new(1));
        dense.set_cell(16_383, 1_048_575, VertexId::new(2));
        assert_eq!(dense.width(), 16_384);
        assert_eq!(dense.height(), 1_048_576);
        assert_eq!(dense.len(), 2);
        assert_eq!(dense.allocated_slots(), 2 + 16_384);
        assert_eq!(dense.get_cell(16_383, 1_048_575), Some(VertexId::new(2)));
        assert_eq!(dense.get_cell(16_383, 1), None);
        assert_eq!(dense.get_cell(0, 500), None);
        assert_eq!(
            dense.entries(),
            vec![(1, 1, VertexId::new(1)), (16_383, 1_048_575, VertexId::new(2))]
        );
        assert_eq!(dense.remove_cell(1, 1), Some(VertexId::new(1)));
        assert_eq!(dense.remove_cell(7, 3), None);
        assert_eq!(dense.len(), 1);
    }

    #[test]
    fn threshold_policy() {
        let p = AddressMappingPolicy::default();
        assert_eq!(p.choose(0.9), StrategyKind::Dense);
        assert_eq!(p.choose(0.8), StrategyKind::Sparse);
        let custom = AddressMappingPolicy::Custom(Arc::new(|_| StrategyKind::Dense));
        assert_eq!(custom.choose(0.0), StrategyKind::Dense);
    }
}
