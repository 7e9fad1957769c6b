//! Sheet-scoped coordinates, ranges and the row/column arithmetic shared by
//! the parser (reference rewriting) and the engine (re-addressing vertices).

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable sheet identifier, dense and zero-based.
pub type SheetId = u32;

/// Sentinel for the open end of a column (`A:A`) or row (`1:1`) range.
pub const UNBOUNDED: u32 = u32::MAX;

/// The two structural axes of a sheet.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Axis {
    Row,
    Column,
}

/// Zero-based `(sheet, col, row)` address.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimpleCellAddress {
    pub sheet: SheetId,
    pub col: u32,
    pub row: u32,
}

impl SimpleCellAddress {
    pub const fn new(sheet: SheetId, col: u32, row: u32) -> Self {
        Self { sheet, col, row }
    }

    #[inline]
    pub fn coord(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Row => self.row,
            Axis::Column => self.col,
        }
    }

    #[inline]
    pub fn with_coord(mut self, axis: Axis, value: u32) -> Self {
        match axis {
            Axis::Row => self.row = value,
            Axis::Column => self.col = value,
        }
        self
    }

    /// Offset by a signed delta; `None` when the result leaves the sheet.
    pub fn offset(&self, cols: i64, rows: i64) -> Option<Self> {
        let col = u32::try_from(self.col as i64 + cols).ok()?;
        let row = u32::try_from(self.row as i64 + rows).ok()?;
        Some(Self::new(self.sheet, col, row))
    }

    /// A1 rendering without the sheet qualifier.
    pub fn a1(&self) -> String {
        format!("{}{}", column_label(self.col), self.row as u64 + 1)
    }
}

impl fmt::Display for SimpleCellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}!{}", self.sheet, self.a1())
    }
}

/// Convert a zero-based column index into letters (`0 -> A`, `27 -> AB`).
pub fn column_label(mut col: u32) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Convert column letters into a zero-based index. Case-insensitive.
pub fn column_index(label: &str) -> Option<u32> {
    if label.is_empty() || label.len() > 7 {
        return None;
    }
    let mut acc: u64 = 0;
    for b in label.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        acc = acc * 26 + (b.to_ascii_uppercase() - b'A' + 1) as u64;
    }
    u32::try_from(acc - 1).ok()
}

/// Inclusive rectangle on one sheet, normalised so `start <= end` per axis.
///
/// Column ranges (`A:B`) carry `end.row == UNBOUNDED`, row ranges (`1:2`)
/// carry `end.col == UNBOUNDED`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbsoluteCellRange {
    pub start: SimpleCellAddress,
    pub end: SimpleCellAddress,
}

impl AbsoluteCellRange {
    /// Build from two corners on the same sheet, normalising their order.
    pub fn new(a: SimpleCellAddress, b: SimpleCellAddress) -> Self {
        Self {
            start: SimpleCellAddress::new(a.sheet, a.col.min(b.col), a.row.min(b.row)),
            end: SimpleCellAddress::new(a.sheet, a.col.max(b.col), a.row.max(b.row)),
        }
    }

    pub fn from_coordinates(sheet: SheetId, x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self::new(
            SimpleCellAddress::new(sheet, x1, y1),
            SimpleCellAddress::new(sheet, x2, y2),
        )
    }

    /// `width x height` rectangle anchored at `start`. Both must be >= 1.
    pub fn span_from(start: SimpleCellAddress, width: u32, height: u32) -> Self {
        Self {
            start,
            end: SimpleCellAddress::new(
                start.sheet,
                start.col + width.saturating_sub(1),
                start.row + height.saturating_sub(1),
            ),
        }
    }

    pub fn single(addr: SimpleCellAddress) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    #[inline]
    pub fn sheet(&self) -> SheetId {
        self.start.sheet
    }

    pub fn is_finite(&self) -> bool {
        self.end.row != UNBOUNDED && self.end.col != UNBOUNDED
    }

    pub fn width(&self) -> u32 {
        self.end.col.saturating_sub(self.start.col).saturating_add(1)
    }

    pub fn height(&self) -> u32 {
        self.end.row.saturating_sub(self.start.row).saturating_add(1)
    }

    pub fn extent(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Row => self.height(),
            Axis::Column => self.width(),
        }
    }

    pub fn size(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn contains(&self, addr: &SimpleCellAddress) -> bool {
        addr.sheet == self.start.sheet
            && addr.col >= self.start.col
            && addr.col <= self.end.col
            && addr.row >= self.start.row
            && addr.row <= self.end.row
    }

    pub fn contains_range(&self, other: &AbsoluteCellRange) -> bool {
        self.contains(&other.start) && self.contains(&other.end)
    }

    pub fn intersection(&self, other: &AbsoluteCellRange) -> Option<AbsoluteCellRange> {
        if self.sheet() != other.sheet() {
            return None;
        }
        let start_col = self.start.col.max(other.start.col);
        let start_row = self.start.row.max(other.start.row);
        let end_col = self.end.col.min(other.end.col);
        let end_row = self.end.row.min(other.end.row);
        if start_col > end_col || start_row > end_row {
            return None;
        }
        Some(AbsoluteCellRange::from_coordinates(
            self.sheet(),
            start_col,
            start_row,
            end_col,
            end_row,
        ))
    }

    /// Bound an unbounded range by the sheet's populated size.
    pub fn clamp(&self, sheet_width: u32, sheet_height: u32) -> Option<AbsoluteCellRange> {
        if sheet_width == 0 || sheet_height == 0 {
            return None;
        }
        let end_col = self.end.col.min(sheet_width - 1);
        let end_row = self.end.row.min(sheet_height - 1);
        if end_col < self.start.col || end_row < self.start.row {
            return None;
        }
        Some(AbsoluteCellRange::from_coordinates(
            self.sheet(),
            self.start.col,
            self.start.row,
            end_col,
            end_row,
        ))
    }

    /// The same rectangle without its last row, when it has more than one.
    pub fn without_last_row(&self) -> Option<AbsoluteCellRange> {
        if !self.is_finite() || self.height() < 2 {
            return None;
        }
        Some(AbsoluteCellRange {
            start: self.start,
            end: SimpleCellAddress::new(self.end.sheet, self.end.col, self.end.row - 1),
        })
    }

    pub fn last_row(&self) -> AbsoluteCellRange {
        AbsoluteCellRange {
            start: SimpleCellAddress::new(self.start.sheet, self.start.col, self.end.row),
            end: self.end,
        }
    }

    /// Row-major iteration. Callers clamp unbounded ranges first.
    pub fn addresses(&self) -> impl Iterator<Item = SimpleCellAddress> + '_ {
        let sheet = self.sheet();
        (self.start.row..=self.end.row).flat_map(move |row| {
            (self.start.col..=self.end.col).map(move |col| SimpleCellAddress::new(sheet, col, row))
        })
    }

    /// Stable textual key of the four corners.
    pub fn key(&self) -> String {
        format!(
            "{},{},{},{}",
            self.start.col, self.start.row, self.end.col, self.end.row
        )
    }

    /// Re-shape after inserting `count` lines at `index` on `axis`.
    ///
    /// Ranges at or below the insertion point move, ranges spanning it grow.
    pub fn after_insert(&self, axis: Axis, index: u32, count: u32) -> AbsoluteCellRange {
        let (lo, hi) = (self.start.coord(axis), self.end.coord(axis));
        let (lo, hi) = insert_span(lo, hi, index, count);
        AbsoluteCellRange {
            start: self.start.with_coord(axis, lo),
            end: self.end.with_coord(axis, hi),
        }
    }

    /// Re-shape after removing `span`; `None` when nothing is left.
    pub fn after_remove(&self, axis: Axis, start: u32, count: u32) -> Option<AbsoluteCellRange> {
        let (lo, hi) = remove_span(self.start.coord(axis), self.end.coord(axis), start, count)?;
        Some(AbsoluteCellRange {
            start: self.start.with_coord(axis, lo),
            end: self.end.with_coord(axis, hi),
        })
    }
}

impl fmt::Display for AbsoluteCellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}!{}:{}", self.sheet(), self.start.a1(), self.end.a1())
    }
}

/// A band of whole rows or columns on one sheet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub sheet: SheetId,
    pub axis: Axis,
    pub start: u32,
    pub count: u32,
}

impl Span {
    pub const fn rows(sheet: SheetId, start: u32, count: u32) -> Self {
        Self {
            sheet,
            axis: Axis::Row,
            start,
            count,
        }
    }

    pub const fn columns(sheet: SheetId, start: u32, count: u32) -> Self {
        Self {
            sheet,
            axis: Axis::Column,
            start,
            count,
        }
    }

    /// Last line of the band (inclusive).
    pub fn end(&self) -> u32 {
        self.start + self.count.saturating_sub(1)
    }

    pub fn contains(&self, addr: &SimpleCellAddress) -> bool {
        let c = addr.coord(self.axis);
        addr.sheet == self.sheet && c >= self.start && c <= self.end()
    }

    /// Whether the band crosses `[lo, hi]` on its axis.
    pub fn intersects(&self, lo: u32, hi: u32) -> bool {
        self.start <= hi && lo <= self.end()
    }
}

/// Position of a single coordinate after an insertion.
#[inline]
pub fn insert_coord(c: u32, index: u32, count: u32) -> u32 {
    if c >= index && c != UNBOUNDED {
        c.saturating_add(count)
    } else {
        c
    }
}

/// Position of a single coordinate after a removal, `None` if removed.
#[inline]
pub fn remove_coord(c: u32, start: u32, count: u32) -> Option<u32> {
    if c == UNBOUNDED || c < start {
        Some(c)
    } else if c < start + count {
        None
    } else {
        Some(c - count)
    }
}

/// `[lo, hi]` after inserting `count` lines at `index`.
pub fn insert_span(lo: u32, hi: u32, index: u32, count: u32) -> (u32, u32) {
    if index <= lo {
        (insert_coord(lo, index, count), insert_coord(hi, index, count))
    } else if index <= hi {
        (lo, insert_coord(hi, index, count))
    } else {
        (lo, hi)
    }
}

/// `[lo, hi]` after removing `count` lines from `start`; `None` if emptied.
pub fn remove_span(lo: u32, hi: u32, start: u32, count: u32) -> Option<(u32, u32)> {
    if count == 0 {
        return Some((lo, hi));
    }
    let end = start + count - 1;
    if hi < start {
        return Some((lo, hi));
    }
    if lo > end {
        return Some((lo - count, if hi == UNBOUNDED { hi } else { hi - count }));
    }
    let new_lo = lo.min(start);
    let new_hi = if hi == UNBOUNDED {
        UNBOUNDED
    } else if hi > end {
        hi - count
    } else if start == 0 {
        return None;
    } else {
        start - 1
    };
    if new_lo > new_hi || (lo >= start && hi <= end) {
        return None;
    }
    Some((new_lo, new_hi))
}
