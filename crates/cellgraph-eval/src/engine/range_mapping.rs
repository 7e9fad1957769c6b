use cellgraph_common::{AbsoluteCellRange, SheetId};
use rustc_hash::FxHashMap;

use super::vertex::VertexId;

/// Range -> range vertex, keyed per sheet by the four corner coordinates.
#[derive(Debug, Clone, Default)]
pub struct RangeMapping {
    by_sheet: FxHashMap<SheetId, FxHashMap<String, (AbsoluteCellRange, VertexId)>>,
}

impl RangeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, range: &AbsoluteCellRange) -> Option<VertexId> {
        self.by_sheet
            .get(&range.sheet())?
            .get(&range.key())
            .map(|(_, id)| *id)
    }

    pub fn set(&mut self, range: AbsoluteCellRange, id: VertexId) {
        self.by_sheet
            .entry(range.sheet())
            .or_default()
            .insert(range.key(), (range, id));
    }

    pub fn remove(&mut self, range: &AbsoluteCellRange) -> Option<VertexId> {
        let sheet_map = self.by_sheet.get_mut(&range.sheet())?;
        let removed = sheet_map.remove(&range.key()).map(|(_, id)| id);
        if sheet_map.is_empty() {
            self.by_sheet.remove(&range.sheet());
        }
        removed
    }

    /// The vertex for `range` without its last row, and that last row.
    pub fn find_smaller(&self, range: &AbsoluteCellRange) -> Option<(VertexId, AbsoluteCellRange)> {
        let smaller = range.without_last_row()?;
        Some((self.get(&smaller)?, range.last_row()))
    }

    /// Ranges on `sheet`, ordered by height then position.
    pub fn entries(&self, sheet: SheetId) -> Vec<(AbsoluteCellRange, VertexId)> {
        let mut out: Vec<_> = self
            .by_sheet
            .get(&sheet)
            .map(|m| m.values().copied().collect())
            .unwrap_or_default();
        out.sort_by_key(|(r, id)| (r.height(), *r, *id));
        out
    }

    /// Replace every range of `sheet`.
    pub fn replace_sheet(&mut self, sheet: SheetId, entries: Vec<(AbsoluteCellRange, VertexId)>) {
        let map: FxHashMap<_, _> = entries.into_iter().map(|(r, id)| (r.key(), (r, id))).collect();
        if map.is_empty() {
            self.by_sheet.remove(&sheet);
        } else {
            self.by_sheet.insert(sheet, map);
        }
    }

    pub fn len(&self) -> usize {
        self.by_sheet.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
