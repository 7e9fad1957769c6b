//! Cell-level error values.
//!
//! - **`ErrorKind`** : the closed set of error codes a cell can hold
//! - **`CellError`** : a kind plus an optional human message
//!
//! Errors are *values*: once construction validation has passed they flow
//! through dependent formulas like any other [`CellValue`](crate::CellValue)
//! and never unwind to the embedding application.

use std::{
    error::Error,
    fmt,
    hash::{Hash, Hasher},
};

use crate::CellValue;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// All recognised error codes.
///
/// **Note:** names are CamelCase while `Display` renders them the way a
/// spreadsheet shows them (`#DIV/0!`, …).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    DivByZero,
    Value,
    Name,
    Ref,
    Num,
    Na,
    Cycle,
    Error,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::DivByZero,
        ErrorKind::Value,
        ErrorKind::Name,
        ErrorKind::Ref,
        ErrorKind::Num,
        ErrorKind::Na,
        ErrorKind::Cycle,
        ErrorKind::Error,
    ];

    pub const fn literal(self) -> &'static str {
        match self {
            Self::DivByZero => "#DIV/0!",
            Self::Value => "#VALUE!",
            Self::Name => "#NAME?",
            Self::Ref => "#REF!",
            Self::Num => "#NUM!",
            Self::Na => "#N/A",
            Self::Cycle => "#CYCLE!",
            Self::Error => "#ERROR!",
        }
    }

    /// Map an error literal (`#REF!`, `#n/a`, …) back to its kind.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.literal().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

/// The error value stored in cells.
///
/// `message` is only informative; two errors of the same kind compare equal
/// regardless of message so that recomputation can detect "no change".
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Eq)]
pub struct CellError {
    pub kind: ErrorKind,
    pub message: Option<String>,
}

impl PartialEq for CellError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Hash for CellError {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl From<ErrorKind> for CellError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }
}

impl CellError {
    pub fn new(kind: ErrorKind) -> Self {
        kind.into()
    }

    /// Attach a human-readable explanation.
    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn div_by_zero() -> Self {
        Self::new(ErrorKind::DivByZero)
    }

    pub fn value() -> Self {
        Self::new(ErrorKind::Value)
    }

    pub fn reference() -> Self {
        Self::new(ErrorKind::Ref)
    }

    pub fn cycle() -> Self {
        Self::new(ErrorKind::Cycle)
    }

    /// A `#ERROR!` carrying the parser's raw message.
    pub fn parsing<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorKind::Error).with_message(msg)
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl Error for CellError {}

impl From<CellError> for CellValue {
    fn from(error: CellError) -> Self {
        CellValue::Error(error)
    }
}

impl From<ErrorKind> for CellValue {
    fn from(kind: ErrorKind) -> Self {
        CellValue::Error(kind.into())
    }
}

impl PartialEq<str> for ErrorKind {
    fn eq(&self, other: &str) -> bool {
        self.literal() == other
    }
}

impl PartialEq<&str> for CellError {
    fn eq(&self, other: &&str) -> bool {
        self.kind.literal() == *other
    }
}
