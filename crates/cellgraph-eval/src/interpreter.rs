//! Evaluates one formula AST at a concrete address.
//!
//! The interpreter only reads the graph. Range memos live behind `RefCell`s
//! on range vertices, so cached reductions are filled in through `&self`.

use std::cell::RefCell;
use std::cmp::Ordering;

use cellgraph_common::{AbsoluteCellRange, CellError, CellValue, ErrorKind, SimpleCellAddress};
use cellgraph_parse::{ASTNode, ReferenceType};
use rand::Rng;
use rand::rngs::SmallRng;

use crate::criteria::Criterion;
use crate::engine::{DependencyGraph, RangeVertex, Vertex, VertexId};
use crate::function_registry::FunctionRegistry;

/// What an expression evaluates to before it is stored in a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpreterValue {
    Scalar(CellValue),
    /// An unevaluated reference to a rectangle; read lazily.
    Range(AbsoluteCellRange),
    /// Array result, row-major.
    Matrix(Vec<Vec<CellValue>>),
}

impl From<CellValue> for InterpreterValue {
    fn from(v: CellValue) -> Self {
        InterpreterValue::Scalar(v)
    }
}

impl From<CellError> for InterpreterValue {
    fn from(e: CellError) -> Self {
        InterpreterValue::Scalar(CellValue::Error(e))
    }
}

impl InterpreterValue {
    pub fn error(kind: ErrorKind) -> Self {
        InterpreterValue::Scalar(CellValue::error(kind))
    }
}

/// Largest addressable sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetLimits {
    pub max_rows: u32,
    pub max_columns: u32,
}

impl Default for SheetLimits {
    fn default() -> Self {
        Self {
            max_rows: 1_048_576,
            max_columns: 16_384,
        }
    }
}

impl SheetLimits {
    pub fn contains(&self, addr: &SimpleCellAddress) -> bool {
        addr.row < self.max_rows && addr.col < self.max_columns
    }
}

/// A reduction whose per-range result is memoised on the range vertex.
///
/// `map` turns one cell into a partial result and `combine` merges partials,
/// so a range grown by one row is `combine(cached, fold(last row))`.
#[derive(Debug)]
pub struct RangeReducer {
    pub name: &'static str,
    pub init: fn() -> CellValue,
    pub map: fn(&CellValue) -> CellValue,
    pub combine: fn(&CellValue, &CellValue) -> CellValue,
}

/// Which criterion aggregate to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionAggregate {
    Sum,
    Count,
}

impl CriterionAggregate {
    fn name(self) -> &'static str {
        match self {
            CriterionAggregate::Sum => "SUMIF",
            CriterionAggregate::Count => "COUNTIF",
        }
    }
}

#[derive(Clone, Copy)]
pub struct Interpreter<'a> {
    graph: &'a DependencyGraph,
    registry: &'a FunctionRegistry,
    rng: &'a RefCell<SmallRng>,
    now: f64,
    limits: SheetLimits,
    address: SimpleCellAddress,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        registry: &'a FunctionRegistry,
        rng: &'a RefCell<SmallRng>,
        now: f64,
        limits: SheetLimits,
    ) -> Self {
        Self {
            graph,
            registry,
            rng,
            now,
            limits,
            address: SimpleCellAddress::new(0, 0, 0),
        }
    }

    /// The same context for a formula living at `address`.
    pub fn at(&self, address: SimpleCellAddress) -> Self {
        Self { address, ..*self }
    }

    pub fn address(&self) -> SimpleCellAddress {
        self.address
    }

    pub fn graph(&self) -> &'a DependencyGraph {
        self.graph
    }

    pub fn limits(&self) -> SheetLimits {
        self.limits
    }

    /// Serial date-time fixed for the whole evaluation pass.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Uniform in `[0, 1)`.
    pub fn random(&self) -> f64 {
        self.rng.borrow_mut().r#gen::<f64>()
    }

    /* ─────────────────────── expressions ─────────────────────── */

    pub fn evaluate(&self, ast: &ASTNode) -> InterpreterValue {
        match ast {
            ASTNode::Literal(v) => InterpreterValue::Scalar(v.clone()),
            ASTNode::Invalid { error, .. } => error.clone().into(),
            ASTNode::Reference(r) => self.reference(r),
            ASTNode::UnaryOp { op, expr } => unary(op, self.evaluate_scalar(expr)).into(),
            ASTNode::BinaryOp { op, left, right } => {
                let l = self.evaluate_scalar(left);
                let r = self.evaluate_scalar(right);
                binary(op, &l, &r).into()
            }
            ASTNode::Function { name, args } => self.call(name, args),
        }
    }

    /// Evaluate and collapse to one value. Multi-cell results are `#VALUE!`.
    pub fn evaluate_scalar(&self, ast: &ASTNode) -> CellValue {
        self.to_scalar(self.evaluate(ast))
    }

    pub fn to_scalar(&self, value: InterpreterValue) -> CellValue {
        match value {
            InterpreterValue::Scalar(v) => v,
            InterpreterValue::Range(r) if r.is_finite() && r.size() == 1 => {
                self.graph.cell_value(r.start)
            }
            InterpreterValue::Matrix(rows) if rows.len() == 1 && rows[0].len() == 1 => {
                rows[0][0].clone()
            }
            _ => CellValue::Error(
                CellError::value().with_message("A range cannot be used as a single value"),
            ),
        }
    }

    fn reference(&self, r: &ReferenceType) -> InterpreterValue {
        match r {
            ReferenceType::Cell { .. } => match r.resolve_cell(self.address) {
                Some(addr) if self.limits.contains(&addr) => {
                    self.graph.cell_value(addr).into()
                }
                _ => InterpreterValue::error(ErrorKind::Ref),
            },
            _ => match r.to_range(self.address) {
                Some(range) => InterpreterValue::Range(range),
                None => InterpreterValue::error(ErrorKind::Ref),
            },
        }
    }

    fn call(&self, name: &str, args: &[ASTNode]) -> InterpreterValue {
        let Some(f) = self.registry.get(name) else {
            return CellError::new(ErrorKind::Name)
                .with_message(format!("Unknown function {name}"))
                .into();
        };
        if args.len() < f.min_args() || f.max_args().is_some_and(|max| args.len() > max) {
            return CellError::value()
                .with_message(format!("Wrong number of arguments to {name}"))
                .into();
        }
        f.eval(args, self).unwrap_or_else(InterpreterValue::from)
    }

    /* ─────────────────────── value access ─────────────────────── */

    /// Values of `range`, row-major. Infinite ranges stop at the sheet's
    /// populated extent.
    pub fn range_values(&self, range: &AbsoluteCellRange) -> Vec<CellValue> {
        self.graph.range_values(range)
    }

    /// Every value an argument stands for, flattened row-major.
    pub fn values_of(&self, value: InterpreterValue) -> Vec<CellValue> {
        match value {
            InterpreterValue::Scalar(v) => vec![v],
            InterpreterValue::Range(r) => self.range_values(&r),
            InterpreterValue::Matrix(rows) => rows.into_iter().flatten().collect(),
        }
    }

    /// An argument as rows of values.
    pub fn rows_of(&self, value: InterpreterValue) -> Result<Vec<Vec<CellValue>>, CellError> {
        match value {
            InterpreterValue::Scalar(CellValue::Error(e)) => Err(e),
            InterpreterValue::Scalar(v) => Ok(vec![vec![v]]),
            InterpreterValue::Matrix(rows) => Ok(rows),
            InterpreterValue::Range(r) => {
                let r = self.graph.clamp_range(&r).ok_or_else(CellError::value)?;
                Ok((r.start.row..=r.end.row)
                    .map(|row| {
                        (r.start.col..=r.end.col)
                            .map(|col| {
                                self.graph
                                    .cell_value(SimpleCellAddress::new(r.sheet(), col, row))
                            })
                            .collect()
                    })
                    .collect())
            }
        }
    }

    /// The range an argument refers to, or `#VALUE!` for anything else.
    pub fn range_argument(&self, arg: &ASTNode) -> Result<AbsoluteCellRange, CellError> {
        if let ASTNode::Reference(r) = arg {
            return r.to_range(self.address).ok_or_else(|| ErrorKind::Ref.into());
        }
        match self.evaluate(arg) {
            InterpreterValue::Range(r) => Ok(r),
            InterpreterValue::Scalar(CellValue::Error(e)) => Err(e),
            _ => Err(CellError::value().with_message("Expected a range")),
        }
    }

    fn range_vertex(&self, id: VertexId) -> Option<&'a RangeVertex> {
        self.graph.vertex(id).and_then(Vertex::as_range)
    }

    /* ─────────────────────── cached reductions ─────────────────────── */

    /// Reduce `range` with `reducer`, reusing and filling range memos.
    ///
    /// Walks down the chain of "same range minus last row" vertices to the
    /// first one with a memo (or the bottom of the chain), then folds only
    /// the missing rows on the way back up.
    pub fn reduce_range(&self, range: &AbsoluteCellRange, reducer: &RangeReducer) -> CellValue {
        let Some(top) = self.graph.ranges().get(range) else {
            return self.fold(range, reducer);
        };

        let mut pending: Vec<(VertexId, AbsoluteCellRange)> = Vec::new();
        let mut current = top;
        let mut acc = loop {
            let Some(rv) = self.range_vertex(current) else {
                return self.fold(range, reducer);
            };
            if let Some(v) = rv.cached(reducer.name) {
                break v;
            }
            match self.graph.smaller_range_of(current) {
                Some((smaller, rest)) => {
                    pending.push((current, rest));
                    current = smaller;
                }
                None => {
                    let v = self.fold(&rv.range, reducer);
                    rv.set_cached(reducer.name, v.clone());
                    break v;
                }
            }
        };

        for (id, rest) in pending.into_iter().rev() {
            acc = (reducer.combine)(&acc, &self.fold(&rest, reducer));
            if let Some(rv) = self.range_vertex(id) {
                rv.set_cached(reducer.name, acc.clone());
            }
        }
        acc
    }

    fn fold(&self, range: &AbsoluteCellRange, reducer: &RangeReducer) -> CellValue {
        self.range_values(range)
            .iter()
            .fold((reducer.init)(), |acc, v| (reducer.combine)(&acc, &(reducer.map)(v)))
    }

    /// `SUMIF` / `COUNTIF` over `condition`, summing `values` where the
    /// condition cell matches. Results are memoised per criterion on the
    /// values range.
    pub fn criterion_aggregate(
        &self,
        kind: CriterionAggregate,
        condition: &AbsoluteCellRange,
        criterion_value: &CellValue,
        values: &AbsoluteCellRange,
    ) -> CellValue {
        if condition.width() != values.width() || condition.height() != values.height() {
            return CellValue::Error(
                CellError::value().with_message("Criterion and value ranges differ in shape"),
            );
        }
        let criterion = match Criterion::compile(criterion_value) {
            Ok(c) => c,
            Err(e) => return CellValue::Error(e),
        };
        let criterion_text = criterion_value.to_string();
        let key = criterion_key(kind, condition);

        let values_id = self.graph.ranges().get(values);
        let condition_id = self.graph.ranges().get(condition);
        let values_vertex = values_id.and_then(|id| self.range_vertex(id));

        if let Some(cached) = values_vertex.and_then(|v| v.criterion_cached(&key, &criterion_text)) {
            return cached;
        }

        let reused = match (values_id, condition_id) {
            (Some(vid), Some(cid)) => self.extend_smaller_criterion(
                kind,
                vid,
                cid,
                &criterion,
                &criterion_text,
            ),
            _ => None,
        };
        let result =
            reused.unwrap_or_else(|| fold_criterion(kind, &criterion, condition, values, self));

        if let (Some(vid), Some(rv)) = (values_id, values_vertex) {
            rv.set_criterion_cached(key, criterion_text, result.clone(), criterion);
            if let Some(cond) = condition_id.filter(|c| *c != vid).and_then(|c| self.range_vertex(c)) {
                cond.add_dependent_cache_range(vid);
            }
        }
        result
    }

    /// Reuse the memo of the one-row-smaller pair of ranges, if present.
    fn extend_smaller_criterion(
        &self,
        kind: CriterionAggregate,
        values_id: VertexId,
        condition_id: VertexId,
        criterion: &Criterion,
        criterion_text: &str,
    ) -> Option<CellValue> {
        let (smaller_values, values_rest) = self.graph.smaller_range_of(values_id)?;
        let (smaller_condition, condition_rest) = self.graph.smaller_range_of(condition_id)?;
        let smaller_condition_range = self.range_vertex(smaller_condition)?.range;
        let cached = self
            .range_vertex(smaller_values)?
            .criterion_cached(&criterion_key(kind, &smaller_condition_range), criterion_text)?;
        let rest = fold_criterion(kind, criterion, &condition_rest, &values_rest, self);
        Some(add_numbers(&cached, &rest))
    }
}

fn criterion_key(kind: CriterionAggregate, condition: &AbsoluteCellRange) -> String {
    format!("{},{},{}", kind.name(), condition.sheet(), condition.key())
}

fn fold_criterion(
    kind: CriterionAggregate,
    criterion: &Criterion,
    condition: &AbsoluteCellRange,
    values: &AbsoluteCellRange,
    ctx: &Interpreter<'_>,
) -> CellValue {
    let conditions = ctx.range_values(condition);
    let values = match kind {
        CriterionAggregate::Sum => ctx.range_values(values),
        CriterionAggregate::Count => Vec::new(),
    };
    let mut total = 0.0;
    for (i, c) in conditions.iter().enumerate() {
        if !criterion.matches(c) {
            continue;
        }
        match kind {
            CriterionAggregate::Count => total += 1.0,
            CriterionAggregate::Sum => match values.get(i) {
                Some(CellValue::Number(n)) => total += n,
                Some(CellValue::Error(e)) => return CellValue::Error(e.clone()),
                _ => {}
            },
        }
    }
    CellValue::Number(total)
}

/// Numeric `+` with left-first error propagation.
pub fn add_numbers(a: &CellValue, b: &CellValue) -> CellValue {
    match (a, b) {
        (CellValue::Error(_), _) => a.clone(),
        (_, CellValue::Error(_)) => b.clone(),
        (CellValue::Number(x), CellValue::Number(y)) => CellValue::Number(x + y),
        _ => CellValue::error(ErrorKind::Value),
    }
}

/* ─────────────────────────── operators ─────────────────────────── */

fn finite(n: f64) -> CellValue {
    if n.is_finite() {
        CellValue::Number(n)
    } else {
        CellValue::error(ErrorKind::Num)
    }
}

fn unary(op: &str, v: CellValue) -> CellValue {
    if v.is_error() {
        return v;
    }
    match op {
        "+" => v,
        "-" => match v.coerce_to_number() {
            Ok(n) => finite(-n),
            Err(e) => CellValue::Error(e),
        },
        "%" => match v.coerce_to_number() {
            Ok(n) => finite(n / 100.0),
            Err(e) => CellValue::Error(e),
        },
        _ => CellValue::Error(CellError::new(ErrorKind::Error).with_message(format!("Unknown operator {op}"))),
    }
}

pub(crate) fn binary(op: &str, l: &CellValue, r: &CellValue) -> CellValue {
    if l.is_error() {
        return l.clone();
    }
    if r.is_error() {
        return r.clone();
    }
    match op {
        "+" | "-" | "*" | "/" | "^" => arithmetic(op, l, r),
        "&" => match (l.coerce_to_text(), r.coerce_to_text()) {
            (Ok(a), Ok(b)) => CellValue::Text(a + &b),
            (Err(e), _) | (_, Err(e)) => CellValue::Error(e),
        },
        "=" => CellValue::Boolean(compare(l, r) == Ordering::Equal),
        "<>" => CellValue::Boolean(compare(l, r) != Ordering::Equal),
        "<" => CellValue::Boolean(compare(l, r) == Ordering::Less),
        ">" => CellValue::Boolean(compare(l, r) == Ordering::Greater),
        "<=" => CellValue::Boolean(compare(l, r) != Ordering::Greater),
        ">=" => CellValue::Boolean(compare(l, r) != Ordering::Less),
        _ => CellValue::Error(CellError::new(ErrorKind::Error).with_message(format!("Unknown operator {op}"))),
    }
}

fn arithmetic(op: &str, l: &CellValue, r: &CellValue) -> CellValue {
    let (a, b) = match (l.coerce_to_number(), r.coerce_to_number()) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => return CellValue::Error(e),
    };
    match op {
        "+" => finite(a + b),
        "-" => finite(a - b),
        "*" => finite(a * b),
        "/" if b == 0.0 => CellValue::Error(CellError::div_by_zero()),
        "/" => finite(a / b),
        _ => finite(a.powf(b)),
    }
}

/// Numbers sort before text, text before booleans. Text ignores case.
/// An empty cell compares as the zero value of the other side's type.
pub(crate) fn compare(l: &CellValue, r: &CellValue) -> Ordering {
    fn blank_like(other: &CellValue) -> CellValue {
        match other {
            CellValue::Text(_) => CellValue::Text(String::new()),
            CellValue::Boolean(_) => CellValue::Boolean(false),
            _ => CellValue::Number(0.0),
        }
    }
    fn rank(v: &CellValue) -> u8 {
        match v {
            CellValue::Number(_) | CellValue::Empty => 0,
            CellValue::Text(_) => 1,
            CellValue::Boolean(_) => 2,
            CellValue::Error(_) => 3,
        }
    }

    let l = if l.is_empty() { blank_like(r) } else { l.clone() };
    let r = if r.is_empty() { blank_like(&l) } else { r.clone() };
    match (&l, &r) {
        (CellValue::Number(a), CellValue::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (CellValue::Text(a), CellValue::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (CellValue::Boolean(a), CellValue::Boolean(b)) => a.cmp(b),
        _ => rank(&l).cmp(&rank(&r)),
    }
}
