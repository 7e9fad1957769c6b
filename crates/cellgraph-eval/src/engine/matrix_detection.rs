//! Numeric matrix detection for the graph builder.
//!
//! Plain numbers are grouped into 4-neighbour connected components. A
//! component that exactly fills its bounding box and is large enough
//! becomes one numeric matrix vertex instead of many value vertices.

use cellgraph_common::{SheetId, SimpleCellAddress};
use rustc_hash::{FxHashMap, FxHashSet};

use super::vertex::Matrix;

/// A rectangle of numbers found on one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedMatrix {
    pub start: SimpleCellAddress,
    pub matrix: Matrix,
}

impl DetectedMatrix {
    pub fn cells(&self) -> impl Iterator<Item = SimpleCellAddress> + '_ {
        let start = self.start;
        (0..self.matrix.height).flat_map(move |r| {
            (0..self.matrix.width)
                .map(move |c| SimpleCellAddress::new(start.sheet, start.col + c, start.row + r))
        })
    }
}

/// Find every full rectangle of at least `threshold` numbers among `numbers`.
pub fn detect_matrices(
    sheet: SheetId,
    numbers: &FxHashMap<(u32, u32), f64>,
    threshold: usize,
) -> Vec<DetectedMatrix> {
    let threshold = threshold.max(1);
    let mut seen: FxHashSet<(u32, u32)> = FxHashSet::default();
    let mut found = Vec::new();

    let mut starts: Vec<(u32, u32)> = numbers.keys().copied().collect();
    starts.sort_unstable_by_key(|&(c, r)| (r, c));

    for origin in starts {
        if !seen.insert(origin) {
            continue;
        }
        let component = flood(origin, numbers, &mut seen);
        if component.len() < threshold {
            continue;
        }
        let (min_c, min_r, max_c, max_r) = bounds(&component);
        let (width, height) = (max_c - min_c + 1, max_r - min_r + 1);
        if component.len() as u64 != width as u64 * height as u64 {
            continue;
        }
        let mut data = Vec::with_capacity(component.len());
        for r in min_r..=max_r {
            for c in min_c..=max_c {
                data.push(numbers.get(&(c, r)).copied().unwrap_or_default());
            }
        }
        found.push(DetectedMatrix {
            start: SimpleCellAddress::new(sheet, min_c, min_r),
            matrix: Matrix::new(width, height, data),
        });
    }
    found
}

fn flood(
    origin: (u32, u32),
    numbers: &FxHashMap<(u32, u32), f64>,
    seen: &mut FxHashSet<(u32, u32)>,
) -> Vec<(u32, u32)> {
    let mut component = Vec::new();
    let mut stack = vec![origin];
    while let Some((c, r)) = stack.pop() {
        component.push((c, r));
        let neighbours = [
            c.checked_sub(1).map(|c| (c, r)),
            c.checked_add(1).map(|c| (c, r)),
            r.checked_sub(1).map(|r| (c, r)),
            r.checked_add(1).map(|r| (c, r)),
        ];
        for n in neighbours.into_iter().flatten() {
            if numbers.contains_key(&n) && seen.insert(n) {
                stack.push(n);
            }
        }
    }
    component
}

fn bounds(cells: &[(u32, u32)]) -> (u32, u32, u32, u32) {
    cells.iter().fold(
        (u32::MAX, u32::MAX, 0, 0),
        |(min_c, min_r, max_c, max_r), &(c, r)| {
            (min_c.min(c), min_r.min(r), max_c.max(c), max_r.max(r))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(cells: &[(u32, u32)]) -> FxHashMap<(u32, u32), f64> {
        cells
            .iter()
            .enumerate()
            .map(|(i, &cell)| (cell, i as f64))
            .collect()
    }

    #[test]
    fn full_rectangles_become_matrices() {
        let grid = numbers(&[(0, 0), (1, 0), (0, 1), (1, 1), (5, 5)]);
        let found = detect_matrices(0, &grid, 4);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].start, SimpleCellAddress::new(0, 0, 0));
        assert_eq!((found[0].matrix.width, found[0].matrix.height), (2, 2));
        assert_eq!(found[0].matrix.get(1, 1), Some(3.0));
        assert_eq!(found[0].cells().count(), 4);
    }

    #[test]
    fn ragged_and_small_components_are_skipped() {
        // L shape: 3 cells in a 2x2 box
        let grid = numbers(&[(0, 0), (0, 1), (1, 1)]);
        assert!(detect_matrices(0, &grid, 1).is_empty());
        let single = numbers(&[(3, 3)]);
        assert!(detect_matrices(0, &single, 2).is_empty());
        assert_eq!(detect_matrices(0, &single, 1).len(), 1);
    }
}
