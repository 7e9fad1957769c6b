use cellgraph_common::{AbsoluteCellRange, SheetId, SimpleCellAddress};
use rustc_hash::FxHashMap;

use super::vertex::VertexId;

/// Matrix span -> matrix vertex. Spans never overlap.
#[derive(Debug, Clone, Default)]
pub struct MatrixMapping {
    by_sheet: FxHashMap<SheetId, FxHashMap<String, (AbsoluteCellRange, VertexId)>>,
}

impl MatrixMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, span: &AbsoluteCellRange) -> Option<VertexId> {
        self.by_sheet
            .get(&span.sheet())?
            .get(&span.key())
            .map(|(_, id)| *id)
    }

    pub fn set(&mut self, span: AbsoluteCellRange, id: VertexId) {
        self.by_sheet
            .entry(span.sheet())
            .or_default()
            .insert(span.key(), (span, id));
    }

    pub fn remove(&mut self, span: &AbsoluteCellRange) -> Option<VertexId> {
        let sheet_map = self.by_sheet.get_mut(&span.sheet())?;
        let removed = sheet_map.remove(&span.key()).map(|(_, id)| id);
        if sheet_map.is_empty() {
            self.by_sheet.remove(&span.sheet());
        }
        removed
    }

    /// The matrix whose span covers `addr`.
    pub fn containing(&self, addr: &SimpleCellAddress) -> Option<(AbsoluteCellRange, VertexId)> {
        self.by_sheet
            .get(&addr.sheet)?
            .values()
            .find(|(span, _)| span.contains(addr))
            .copied()
    }

    /// Every matrix overlapping `range`.
    pub fn intersecting(&self, range: &AbsoluteCellRange) -> Vec<(AbsoluteCellRange, VertexId)> {
        let mut out: Vec<_> = self
            .by_sheet
            .get(&range.sheet())
            .map(|m| {
                m.values()
                    .filter(|(span, _)| span.intersection(range).is_some())
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        out.sort();
        out
    }

    pub fn entries(&self, sheet: SheetId) -> Vec<(AbsoluteCellRange, VertexId)> {
        let mut out: Vec<_> = self
            .by_sheet
            .get(&sheet)
            .map(|m| m.values().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_span_by_cell() {
        let mut m = MatrixMapping::new();
        let span = AbsoluteCellRange::from_coordinates(0, 1, 1, 2, 3);
        m.set(span, VertexId::new(4));
        assert_eq!(m.containing(&SimpleCellAddress::new(0, 2, 3)), Some((span, VertexId::new(4))));
        assert_eq!(m.containing(&SimpleCellAddress::new(0, 0, 3)), None);
        assert_eq!(
            m.intersecting(&AbsoluteCellRange::from_coordinates(0, 0, 0, 1, 1)).len(),
            1
        );
        assert_eq!(m.remove(&span), Some(VertexId::new(4)));
        assert!(m.is_empty());
    }
}
