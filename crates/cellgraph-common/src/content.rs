use crate::{CellValue, ErrorKind};

/// Classification of the raw text a user types into a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCellContent {
    Empty,
    Number(f64),
    Boolean(bool),
    Text(String),
    Error(ErrorKind),
    /// `=...`, stored with the leading `=`.
    Formula(String),
    /// `{=...}`, stored as the inner `=...` formula.
    MatrixFormula(String),
}

impl RawCellContent {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return RawCellContent::Empty;
        }
        if is_matrix_formula(trimmed) {
            return RawCellContent::MatrixFormula(trimmed[1..trimmed.len() - 1].to_string());
        }
        if raw.starts_with('=') {
            return RawCellContent::Formula(raw.to_string());
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return RawCellContent::Number(n);
            }
        }
        if trimmed.eq_ignore_ascii_case("TRUE") {
            return RawCellContent::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("FALSE") {
            return RawCellContent::Boolean(false);
        }
        if let Some(kind) = ErrorKind::parse(trimmed) {
            return RawCellContent::Error(kind);
        }
        RawCellContent::Text(raw.to_string())
    }

    pub fn is_formula(&self) -> bool {
        matches!(
            self,
            RawCellContent::Formula(_) | RawCellContent::MatrixFormula(_)
        )
    }

    /// The literal value for non-formula content.
    pub fn literal_value(&self) -> Option<CellValue> {
        match self {
            RawCellContent::Empty => Some(CellValue::Empty),
            RawCellContent::Number(n) => Some(CellValue::Number(*n)),
            RawCellContent::Boolean(b) => Some(CellValue::Boolean(*b)),
            RawCellContent::Text(s) => Some(CellValue::Text(s.clone())),
            RawCellContent::Error(kind) => Some(CellValue::error(*kind)),
            RawCellContent::Formula(_) | RawCellContent::MatrixFormula(_) => None,
        }
    }
}

pub fn is_matrix_formula(text: &str) -> bool {
    text.len() > 3 && text.starts_with("{=") && text.ends_with('}')
}
