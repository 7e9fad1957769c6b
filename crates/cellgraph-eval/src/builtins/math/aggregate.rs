use std::sync::Arc;

use cellgraph_common::{CellError, CellValue, ErrorKind};
use cellgraph_parse::ASTNode;

use crate::function::Function;
use crate::function_registry::FunctionRegistry;
use crate::interpreter::{Interpreter, InterpreterValue, RangeReducer, add_numbers};

/* ─────────────────────────── reducers ──────────────────────────── */

fn zero() -> CellValue {
    CellValue::Number(0.0)
}

fn number_or_error(v: &CellValue) -> CellValue {
    match v {
        CellValue::Number(_) | CellValue::Error(_) => v.clone(),
        _ => zero(),
    }
}

fn count_number(v: &CellValue) -> CellValue {
    CellValue::Number(if matches!(v, CellValue::Number(_)) { 1.0 } else { 0.0 })
}

fn pick(a: &CellValue, b: &CellValue, better: fn(f64, f64) -> bool) -> CellValue {
    match (a, b) {
        (CellValue::Error(_), _) => a.clone(),
        (_, CellValue::Error(_)) => b.clone(),
        (CellValue::Number(x), CellValue::Number(y)) if better(*y, *x) => b.clone(),
        _ => a.clone(),
    }
}

pub static SUM_REDUCER: RangeReducer = RangeReducer {
    name: "SUM",
    init: zero,
    map: number_or_error,
    combine: add_numbers,
};

pub static COUNT_REDUCER: RangeReducer = RangeReducer {
    name: "COUNT",
    init: zero,
    map: count_number,
    combine: add_numbers,
};

pub static MAX_REDUCER: RangeReducer = RangeReducer {
    name: "MAX",
    init: || CellValue::Number(f64::NEG_INFINITY),
    map: |v| match v {
        CellValue::Number(_) | CellValue::Error(_) => v.clone(),
        _ => CellValue::Number(f64::NEG_INFINITY),
    },
    combine: |a, b| pick(a, b, |new, old| new > old),
};

pub static MIN_REDUCER: RangeReducer = RangeReducer {
    name: "MIN",
    init: || CellValue::Number(f64::INFINITY),
    map: |v| match v {
        CellValue::Number(_) | CellValue::Error(_) => v.clone(),
        _ => CellValue::Number(f64::INFINITY),
    },
    combine: |a, b| pick(a, b, |new, old| new < old),
};

/* ─────────────────────────── argument folding ──────────────────────────── */

/// One evaluated argument. `from_reference` marks single-cell references,
/// whose values are treated like range cells rather than typed literals.
struct Evaluated {
    value: InterpreterValue,
    from_reference: bool,
}

fn evaluate_args(args: &[ASTNode], ctx: &Interpreter<'_>) -> Vec<Evaluated> {
    args.iter()
        .map(|arg| Evaluated {
            value: ctx.evaluate(arg),
            from_reference: matches!(arg, ASTNode::Reference(_)),
        })
        .collect()
}

/// Direct numeric arguments: text must parse, empty counts as zero.
fn literal_number(v: &CellValue) -> CellValue {
    match v.coerce_to_number() {
        Ok(n) => CellValue::Number(n),
        Err(e) => CellValue::Error(e),
    }
}

fn literal_count(v: &CellValue) -> CellValue {
    let counts = !v.is_empty() && !v.is_error() && v.coerce_to_number().is_ok();
    CellValue::Number(if counts { 1.0 } else { 0.0 })
}

fn reduce_args(
    args: &[Evaluated],
    ctx: &Interpreter<'_>,
    reducer: &RangeReducer,
    literal: fn(&CellValue) -> CellValue,
) -> CellValue {
    let mut acc = (reducer.init)();
    for arg in args {
        let part = match &arg.value {
            InterpreterValue::Range(r) => ctx.reduce_range(r, reducer),
            InterpreterValue::Scalar(v) if arg.from_reference => (reducer.map)(v),
            InterpreterValue::Scalar(v) => literal(v),
            InterpreterValue::Matrix(rows) => rows
                .iter()
                .flatten()
                .fold((reducer.init)(), |a, v| (reducer.combine)(&a, &(reducer.map)(v))),
        };
        acc = (reducer.combine)(&acc, &part);
    }
    acc
}

fn finish_extremum(v: CellValue) -> CellValue {
    match v {
        CellValue::Number(n) if n.is_infinite() => CellValue::Number(0.0),
        other => other,
    }
}

/* ─────────────────────────── SUM() ──────────────────────────── */

/// Adds numbers across scalars and ranges.
///
/// Range cells that are not numbers are skipped. Direct text arguments
/// must parse as numbers. The first error met is returned.
///
/// Results over ranges are memoised per range vertex, and a range that
/// is one row taller than a known range only folds its last row.
#[derive(Debug)]
pub struct SumFn;

impl Function for SumFn {
    fn name(&self) -> &'static str {
        "SUM"
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let args = evaluate_args(args, ctx);
        Ok(reduce_args(&args, ctx, &SUM_REDUCER, literal_number).into())
    }
}

/* ─────────────────────────── COUNT() ──────────────────────────── */

/// Counts numeric cells. Errors in ranges are not counted and do not
/// propagate.
#[derive(Debug)]
pub struct CountFn;

impl Function for CountFn {
    fn name(&self) -> &'static str {
        "COUNT"
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let args = evaluate_args(args, ctx);
        Ok(reduce_args(&args, ctx, &COUNT_REDUCER, literal_count).into())
    }
}

/* ─────────────────────────── MAX() ──────────────────────────── */

/// Largest number; `0` when there are none.
#[derive(Debug)]
pub struct MaxFn;

impl Function for MaxFn {
    fn name(&self) -> &'static str {
        "MAX"
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let args = evaluate_args(args, ctx);
        Ok(finish_extremum(reduce_args(&args, ctx, &MAX_REDUCER, literal_number)).into())
    }
}

/* ─────────────────────────── MIN() ──────────────────────────── */

#[derive(Debug)]
pub struct MinFn;

impl Function for MinFn {
    fn name(&self) -> &'static str {
        "MIN"
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let args = evaluate_args(args, ctx);
        Ok(finish_extremum(reduce_args(&args, ctx, &MIN_REDUCER, literal_number)).into())
    }
}

/* ─────────────────────────── AVERAGE() ──────────────────────────── */

/// `SUM / COUNT` over the same arguments, sharing their range memos.
///
/// # Remarks
/// - No numbers at all yields `#DIV/0!`.
#[derive(Debug)]
pub struct AverageFn;

impl Function for AverageFn {
    fn name(&self) -> &'static str {
        "AVERAGE"
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let args = evaluate_args(args, ctx);
        let sum = reduce_args(&args, ctx, &SUM_REDUCER, literal_number);
        let count = reduce_args(&args, ctx, &COUNT_REDUCER, literal_count);
        match (sum, count) {
            (CellValue::Error(e), _) => Err(e),
            (_, CellValue::Number(c)) if c == 0.0 => Err(CellError::div_by_zero()),
            (CellValue::Number(s), CellValue::Number(c)) => Ok(CellValue::Number(s / c).into()),
            _ => Err(CellError::new(ErrorKind::Value)),
        }
    }
}

pub fn register_builtins(registry: &FunctionRegistry) {
    registry.register(Arc::new(SumFn));
    registry.register(Arc::new(CountFn));
    registry.register(Arc::new(MaxFn));
    registry.register(Arc::new(MinFn));
    registry.register(Arc::new(AverageFn));
}
