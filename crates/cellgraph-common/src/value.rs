use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
};

use crate::{CellError, ErrorKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ───────────────────── serial date utilities ─────────────────────────
  Serial 1  = 1900-01-01
  Serial 60 = 1900-02-29  (phantom day kept for compatibility)
  Serial 61 = 1900-03-01
Time is the fractional part of a day, no timezone.
------------------------------------------------------------------- */

pub fn datetime_to_serial(dt: &NaiveDateTime) -> f64 {
    let (Some(epoch), Some(leap_fix)) = (
        NaiveDate::from_ymd_opt(1899, 12, 31),
        NaiveDate::from_ymd_opt(1900, 3, 1),
    ) else {
        return 0.0;
    };
    let days = (dt.date() - epoch).num_days();
    let serial_days = if dt.date() >= leap_fix { days + 1 } else { days };
    let secs_in_day = dt.time().num_seconds_from_midnight() as f64;
    serial_days as f64 + secs_in_day / 86_400.0
}

/// A scalar cell value.
///
/// This is what a cell *shows*; array results live inside matrix vertices
/// and are addressed one cell at a time.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
    #[default]
    Empty,
}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            CellValue::Number(n) => n.to_bits().hash(state),
            CellValue::Text(s) => s.hash(state),
            CellValue::Boolean(b) => b.hash(state),
            CellValue::Error(e) => e.hash(state),
            CellValue::Empty => state.write_u8(0),
        }
    }
}

impl Eq for CellValue {}

impl Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Error(e) => write!(f, "{}", e.kind),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl CellValue {
    pub fn error(kind: ErrorKind) -> Self {
        CellValue::Error(kind.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_error(&self) -> Option<&CellError> {
        match self {
            CellValue::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Numeric coercion used by arithmetic operators.
    ///
    /// Empty is zero, booleans are 0/1, text must parse as a number.
    pub fn coerce_to_number(&self) -> Result<f64, CellError> {
        match self {
            CellValue::Number(n) => Ok(*n),
            CellValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            CellValue::Empty => Ok(0.0),
            CellValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| CellError::value().with_message(format!("'{s}' is not a number"))),
            CellValue::Error(e) => Err(e.clone()),
        }
    }

    /// Text coercion used by `&`.
    pub fn coerce_to_text(&self) -> Result<String, CellError> {
        match self {
            CellValue::Error(e) => Err(e.clone()),
            other => Ok(other.to_string()),
        }
    }

    pub fn coerce_to_bool(&self) -> Result<bool, CellError> {
        match self {
            CellValue::Boolean(b) => Ok(*b),
            CellValue::Number(n) => Ok(*n != 0.0),
            CellValue::Empty => Ok(false),
            CellValue::Text(s) if s.eq_ignore_ascii_case("TRUE") => Ok(true),
            CellValue::Text(s) if s.eq_ignore_ascii_case("FALSE") => Ok(false),
            CellValue::Text(_) => Err(CellError::value()),
            CellValue::Error(e) => Err(e.clone()),
        }
    }

    pub fn is_truthy(&self) -> bool {
        self.coerce_to_bool().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_coercion() {
        assert_eq!(CellValue::Empty.coerce_to_number(), Ok(0.0));
        assert_eq!(CellValue::Boolean(true).coerce_to_number(), Ok(1.0));
        assert_eq!(CellValue::from(" 2.5 ").coerce_to_number(), Ok(2.5));
        assert_eq!(
            CellValue::from("abc").coerce_to_number(),
            Err(CellError::value())
        );
    }

    #[test]
    fn serial_dates() {
        let dt = NaiveDate::from_ymd_opt(1900, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        assert_eq!(datetime_to_serial(&dt), 61.5);
    }

    #[test]
    fn display_matches_sheet_rendering() {
        assert_eq!(CellValue::Boolean(false).to_string(), "FALSE");
        assert_eq!(CellValue::error(ErrorKind::Na).to_string(), "#N/A");
        assert_eq!(CellValue::Empty.to_string(), "");
    }
}
