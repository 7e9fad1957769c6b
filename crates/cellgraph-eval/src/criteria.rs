//! Criteria for `SUMIF` / `COUNTIF`: `">5"`, `"<>x"`, `"=3"`, `"abc"`, `4`.

use std::cmp::Ordering;

use cellgraph_common::{CellError, CellValue};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CriterionOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CriterionOp {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            CriterionOp::Eq => ord == Ordering::Equal,
            CriterionOp::Ne => ord != Ordering::Equal,
            CriterionOp::Lt => ord == Ordering::Less,
            CriterionOp::Le => ord != Ordering::Greater,
            CriterionOp::Gt => ord == Ordering::Greater,
            CriterionOp::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Number(f64),
    Text(String),
    Boolean(bool),
    Blank,
}

/// A compiled criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    op: CriterionOp,
    operand: Operand,
}

impl Criterion {
    /// Compile a criterion argument. Error values propagate.
    pub fn compile(value: &CellValue) -> Result<Self, CellError> {
        let (op, operand) = match value {
            CellValue::Number(n) => (CriterionOp::Eq, Operand::Number(*n)),
            CellValue::Boolean(b) => (CriterionOp::Eq, Operand::Boolean(*b)),
            CellValue::Empty => (CriterionOp::Eq, Operand::Blank),
            CellValue::Error(e) => return Err(e.clone()),
            CellValue::Text(s) => {
                let (op, rest) = split_operator(s);
                let operand = if rest.is_empty() {
                    Operand::Blank
                } else if let Ok(n) = rest.trim().parse::<f64>() {
                    Operand::Number(n)
                } else if rest.eq_ignore_ascii_case("TRUE") {
                    Operand::Boolean(true)
                } else if rest.eq_ignore_ascii_case("FALSE") {
                    Operand::Boolean(false)
                } else {
                    Operand::Text(rest.to_lowercase())
                };
                (op, operand)
            }
        };
        Ok(Self { op, operand })
    }

    pub fn matches(&self, cell: &CellValue) -> bool {
        match (&self.operand, cell) {
            (Operand::Blank, CellValue::Empty) => self.op == CriterionOp::Eq,
            (Operand::Blank, CellValue::Text(s)) if s.is_empty() => self.op == CriterionOp::Eq,
            (Operand::Blank, _) => self.op == CriterionOp::Ne,
            (Operand::Number(want), CellValue::Number(n)) => {
                n.partial_cmp(want).is_some_and(|o| self.op.accepts(o))
            }
            (Operand::Boolean(want), CellValue::Boolean(b)) => self.op.accepts(b.cmp(want)),
            (Operand::Text(want), CellValue::Text(s)) => {
                self.op.accepts(s.to_lowercase().as_str().cmp(want.as_str()))
            }
            // Mismatched types only satisfy "not equal".
            _ => self.op == CriterionOp::Ne,
        }
    }
}

fn split_operator(s: &str) -> (CriterionOp, &str) {
    for (prefix, op) in [
        (">=", CriterionOp::Ge),
        ("<=", CriterionOp::Le),
        ("<>", CriterionOp::Ne),
        (">", CriterionOp::Gt),
        ("<", CriterionOp::Lt),
        ("=", CriterionOp::Eq),
    ] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return (op, rest);
        }
    }
    (CriterionOp::Eq, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(v: impl Into<CellValue>) -> Criterion {
        Criterion::compile(&v.into()).unwrap()
    }

    #[test]
    fn numeric_comparisons() {
        assert!(c(">5").matches(&CellValue::Number(6.0)));
        assert!(!c(">5").matches(&CellValue::Number(5.0)));
        assert!(c(">=5").matches(&CellValue::Number(5.0)));
        assert!(c("=3").matches(&CellValue::Number(3.0)));
        assert!(c(4.0).matches(&CellValue::Number(4.0)));
        assert!(!c(">5").matches(&CellValue::Text("9".into())));
    }

    #[test]
    fn text_and_blank() {
        assert!(c("abc").matches(&CellValue::Text("ABC".into())));
        assert!(c("<>x").matches(&CellValue::Text("y".into())));
        assert!(c("<>x").matches(&CellValue::Number(1.0)));
        assert!(!c("<>x").matches(&CellValue::Text("X".into())));
        assert!(c("=").matches(&CellValue::Empty));
        assert!(c("<>").matches(&CellValue::Number(0.0)));
    }

    #[test]
    fn error_criteria_propagate() {
        assert!(Criterion::compile(&CellValue::Error(CellError::value())).is_err());
    }
}
