//! Address-agnostic references.
//!
//! A reference stores, per axis, either an absolute coordinate (`$A$1`) or an
//! offset from the cell holding the formula. Two formulas that differ only by
//! a uniform shift of their relative references therefore share one AST.

use std::fmt;

use cellgraph_common::{
    AbsoluteCellRange, SheetId, SimpleCellAddress, UNBOUNDED, column_index, column_label,
};

/// Resolves sheet names for qualified references and back for rendering.
pub trait SheetLookup {
    fn sheet_id(&self, name: &str) -> Option<SheetId>;
    fn sheet_name(&self, id: SheetId) -> Option<&str>;
}

impl<S: AsRef<str>> SheetLookup for Vec<S> {
    fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.iter()
            .position(|s| s.as_ref().eq_ignore_ascii_case(name))
            .map(|i| i as SheetId)
    }

    fn sheet_name(&self, id: SheetId) -> Option<&str> {
        self.get(id as usize).map(|s| s.as_ref())
    }
}

/// One coordinate of a reference.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AxisRef {
    /// Offset from the formula's own row/column.
    Relative(i64),
    /// `$`-anchored coordinate.
    Absolute(u32),
}

impl AxisRef {
    pub fn new(target: u32, base: u32, absolute: bool) -> Self {
        if absolute {
            AxisRef::Absolute(target)
        } else {
            AxisRef::Relative(target as i64 - base as i64)
        }
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self, AxisRef::Absolute(_))
    }

    /// Concrete coordinate for a formula placed at `base`; `None` when the
    /// offset points before the first row/column.
    pub fn resolve(&self, base: u32) -> Option<u32> {
        match *self {
            AxisRef::Absolute(v) => Some(v),
            AxisRef::Relative(off) => u32::try_from(base as i64 + off).ok(),
        }
    }

    /// Same kind of anchor, pointing at `target` from `new_base`.
    pub fn rebase(&self, target: u32, new_base: u32) -> Self {
        AxisRef::new(target, new_base, self.is_absolute())
    }

    fn hash_key(&self) -> String {
        match self {
            AxisRef::Relative(off) => off.to_string(),
            AxisRef::Absolute(v) => format!("${v}"),
        }
    }
}

/// Column and row of a single cell reference.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RelativeCell {
    pub col: AxisRef,
    pub row: AxisRef,
}

impl RelativeCell {
    pub fn resolve(&self, sheet: SheetId, base: SimpleCellAddress) -> Option<SimpleCellAddress> {
        Some(SimpleCellAddress::new(
            sheet,
            self.col.resolve(base.col)?,
            self.row.resolve(base.row)?,
        ))
    }

    fn hash_key(&self) -> String {
        format!("R{}C{}", self.row.hash_key(), self.col.hash_key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    Cell {
        sheet: Option<SheetId>,
        cell: RelativeCell,
    },
    Range {
        sheet: Option<SheetId>,
        start: RelativeCell,
        end: RelativeCell,
    },
    /// `A:C`, every row of the given columns.
    ColumnRange {
        sheet: Option<SheetId>,
        start: AxisRef,
        end: AxisRef,
    },
    /// `2:5`, every column of the given rows.
    RowRange {
        sheet: Option<SheetId>,
        start: AxisRef,
        end: AxisRef,
    },
}

impl ReferenceType {
    pub fn sheet(&self) -> Option<SheetId> {
        match self {
            ReferenceType::Cell { sheet, .. }
            | ReferenceType::Range { sheet, .. }
            | ReferenceType::ColumnRange { sheet, .. }
            | ReferenceType::RowRange { sheet, .. } => *sheet,
        }
    }

    pub fn is_range(&self) -> bool {
        !matches!(self, ReferenceType::Cell { .. })
    }

    /// The referenced cell for a formula at `base`.
    pub fn resolve_cell(&self, base: SimpleCellAddress) -> Option<SimpleCellAddress> {
        match self {
            ReferenceType::Cell { sheet, cell } => cell.resolve(sheet.unwrap_or(base.sheet), base),
            _ => None,
        }
    }

    /// The referenced rectangle for a formula at `base`. A cell reference
    /// yields a one-cell range.
    pub fn to_range(&self, base: SimpleCellAddress) -> Option<AbsoluteCellRange> {
        let sheet = self.sheet().unwrap_or(base.sheet);
        match self {
            ReferenceType::Cell { cell, .. } => {
                Some(AbsoluteCellRange::single(cell.resolve(sheet, base)?))
            }
            ReferenceType::Range { start, end, .. } => Some(AbsoluteCellRange::new(
                start.resolve(sheet, base)?,
                end.resolve(sheet, base)?,
            )),
            ReferenceType::ColumnRange { start, end, .. } => {
                let (a, b) = (start.resolve(base.col)?, end.resolve(base.col)?);
                Some(AbsoluteCellRange::from_coordinates(
                    sheet,
                    a.min(b),
                    0,
                    a.max(b),
                    UNBOUNDED,
                ))
            }
            ReferenceType::RowRange { start, end, .. } => {
                let (a, b) = (start.resolve(base.row)?, end.resolve(base.row)?);
                Some(AbsoluteCellRange::from_coordinates(
                    sheet,
                    0,
                    a.min(b),
                    UNBOUNDED,
                    a.max(b),
                ))
            }
        }
    }

    /// Placeholder used by the structural hash.
    pub fn hash_key(&self) -> String {
        let sheet = self.sheet().map(|s| s.to_string()).unwrap_or_default();
        match self {
            ReferenceType::Cell { cell, .. } => format!("#{sheet}#{}", cell.hash_key()),
            ReferenceType::Range { start, end, .. } => {
                format!("#{sheet}#{}:{}", start.hash_key(), end.hash_key())
            }
            ReferenceType::ColumnRange { start, end, .. } => {
                format!("#{sheet}#C{}:C{}", start.hash_key(), end.hash_key())
            }
            ReferenceType::RowRange { start, end, .. } => {
                format!("#{sheet}#R{}:R{}", start.hash_key(), end.hash_key())
            }
        }
    }

    /// A1 text for a formula placed at `base`; `None` when the reference
    /// resolves outside the sheet.
    pub fn render(&self, base: SimpleCellAddress, sheets: &dyn SheetLookup) -> Option<String> {
        let mut out = String::new();
        if let Some(id) = self.sheet() {
            out.push_str(&quote_sheet_name(sheets.sheet_name(id)?));
            out.push('!');
        }
        let col = |a: &AxisRef, base: u32| -> Option<String> {
            let v = a.resolve(base)?;
            Some(format!(
                "{}{}",
                if a.is_absolute() { "$" } else { "" },
                column_label(v)
            ))
        };
        let row = |a: &AxisRef, base: u32| -> Option<String> {
            let v = a.resolve(base)?;
            Some(format!(
                "{}{}",
                if a.is_absolute() { "$" } else { "" },
                v as u64 + 1
            ))
        };
        match self {
            ReferenceType::Cell { cell, .. } => {
                out.push_str(&col(&cell.col, base.col)?);
                out.push_str(&row(&cell.row, base.row)?);
            }
            ReferenceType::Range { start, end, .. } => {
                out.push_str(&col(&start.col, base.col)?);
                out.push_str(&row(&start.row, base.row)?);
                out.push(':');
                out.push_str(&col(&end.col, base.col)?);
                out.push_str(&row(&end.row, base.row)?);
            }
            ReferenceType::ColumnRange { start, end, .. } => {
                out.push_str(&col(start, base.col)?);
                out.push(':');
                out.push_str(&col(end, base.col)?);
            }
            ReferenceType::RowRange { start, end, .. } => {
                out.push_str(&row(start, base.row)?);
                out.push(':');
                out.push_str(&row(end, base.row)?);
            }
        }
        Some(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    UnknownSheet(String),
    NotAReference,
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceError::UnknownSheet(name) => write!(f, "unknown sheet '{name}'"),
            ReferenceError::NotAReference => write!(f, "not a reference"),
        }
    }
}

impl std::error::Error for ReferenceError {}

enum Part {
    Cell {
        col: u32,
        col_abs: bool,
        row: u32,
        row_abs: bool,
    },
    Column(u32, bool),
    Row(u32, bool),
}

fn parse_part(s: &str) -> Option<Part> {
    let bytes = s.as_bytes();
    let mut i = 0;
    let col_abs = bytes.first() == Some(&b'$');
    if col_abs {
        i += 1;
    }
    let letters_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    let letters = &s[letters_start..i];
    let row_abs = bytes.get(i) == Some(&b'$');
    if row_abs {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let digits = &s[digits_start..i];
    if i != bytes.len() {
        return None;
    }

    let row = if digits.is_empty() {
        None
    } else {
        let n: u32 = digits.parse().ok()?;
        Some(n.checked_sub(1)?)
    };

    match (letters.is_empty(), row) {
        (false, Some(row)) => Some(Part::Cell {
            col: column_index(letters)?,
            col_abs,
            row,
            row_abs,
        }),
        (false, None) if !row_abs => Some(Part::Column(column_index(letters)?, col_abs)),
        // `$5` parses with the anchor read as a column anchor.
        (true, Some(row)) if !row_abs || !col_abs => Some(Part::Row(row, col_abs || row_abs)),
        _ => None,
    }
}

/// Split an optional `Sheet!` / `'My sheet'!` qualifier off a reference.
fn split_sheet(text: &str) -> Result<(Option<String>, &str), ReferenceError> {
    if let Some(rest) = text.strip_prefix('\'') {
        let bytes = rest.as_bytes();
        let mut name = String::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    name.push('\'');
                    i += 2;
                    continue;
                }
                let tail = &rest[i + 1..];
                return match tail.strip_prefix('!') {
                    Some(local) => Ok((Some(name), local)),
                    None => Err(ReferenceError::NotAReference),
                };
            }
            let ch_len = rest[i..].chars().next().map_or(1, char::len_utf8);
            name.push_str(&rest[i..i + ch_len]);
            i += ch_len;
        }
        return Err(ReferenceError::NotAReference);
    }
    match text.rfind('!') {
        Some(pos) => Ok((Some(text[..pos].to_string()), &text[pos + 1..])),
        None => Ok((None, text)),
    }
}

/// Parse reference text (`B3`, `$A$1:C4`, `Sheet2!A:A`, `3:5`) relative to
/// the cell `base` holding the formula.
pub fn parse_reference(
    text: &str,
    base: SimpleCellAddress,
    sheets: &dyn SheetLookup,
) -> Result<ReferenceType, ReferenceError> {
    let (sheet_name, local) = split_sheet(text.trim())?;
    if local.is_empty() {
        return Err(ReferenceError::NotAReference);
    }

    let mut parts = local.split(':');
    let first = parts.next().and_then(parse_part);
    let second = match parts.next() {
        Some(p) => Some(parse_part(p).ok_or(ReferenceError::NotAReference)?),
        None => None,
    };
    if parts.next().is_some() {
        return Err(ReferenceError::NotAReference);
    }
    let first = first.ok_or(ReferenceError::NotAReference)?;

    let reference = |sheet: Option<SheetId>| -> Result<ReferenceType, ReferenceError> {
        let cell = |col, col_abs, row, row_abs| RelativeCell {
            col: AxisRef::new(col, base.col, col_abs),
            row: AxisRef::new(row, base.row, row_abs),
        };
        match (&first, &second) {
            (
                Part::Cell {
                    col,
                    col_abs,
                    row,
                    row_abs,
                },
                None,
            ) => Ok(ReferenceType::Cell {
                sheet,
                cell: cell(*col, *col_abs, *row, *row_abs),
            }),
            (
                Part::Cell {
                    col: c1,
                    col_abs: ca1,
                    row: r1,
                    row_abs: ra1,
                },
                Some(Part::Cell {
                    col: c2,
                    col_abs: ca2,
                    row: r2,
                    row_abs: ra2,
                }),
            ) => {
                // Keep the anchors with the corner they were written on, but
                // order the corners so start <= end.
                let (c_lo, ca_lo, c_hi, ca_hi) = if c1 <= c2 {
                    (*c1, *ca1, *c2, *ca2)
                } else {
                    (*c2, *ca2, *c1, *ca1)
                };
                let (r_lo, ra_lo, r_hi, ra_hi) = if r1 <= r2 {
                    (*r1, *ra1, *r2, *ra2)
                } else {
                    (*r2, *ra2, *r1, *ra1)
                };
                Ok(ReferenceType::Range {
                    sheet,
                    start: cell(c_lo, ca_lo, r_lo, ra_lo),
                    end: cell(c_hi, ca_hi, r_hi, ra_hi),
                })
            }
            (Part::Column(a, a_abs), Some(Part::Column(b, b_abs))) => {
                let ((lo, lo_abs), (hi, hi_abs)) = order((*a, *a_abs), (*b, *b_abs));
                Ok(ReferenceType::ColumnRange {
                    sheet,
                    start: AxisRef::new(lo, base.col, lo_abs),
                    end: AxisRef::new(hi, base.col, hi_abs),
                })
            }
            (Part::Row(a, a_abs), Some(Part::Row(b, b_abs))) => {
                let ((lo, lo_abs), (hi, hi_abs)) = order((*a, *a_abs), (*b, *b_abs));
                Ok(ReferenceType::RowRange {
                    sheet,
                    start: AxisRef::new(lo, base.row, lo_abs),
                    end: AxisRef::new(hi, base.row, hi_abs),
                })
            }
            _ => Err(ReferenceError::NotAReference),
        }
    };

    // Shape first, so that a bad shape is never reported as a missing sheet.
    reference(None)?;
    match sheet_name {
        None => reference(None),
        Some(name) => match sheets.sheet_id(&name) {
            Some(id) => reference(Some(id)),
            None => Err(ReferenceError::UnknownSheet(name)),
        },
    }
}

fn order(a: (u32, bool), b: (u32, bool)) -> ((u32, bool), (u32, bool)) {
    if a.0 <= b.0 { (a, b) } else { (b, a) }
}

/// Quote a sheet name for use in a formula when it is not a plain identifier.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && !name.as_bytes()[0].is_ascii_digit()
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}
