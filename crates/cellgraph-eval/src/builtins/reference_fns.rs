//! Functions that reason about references rather than values:
//! ROWS, COLUMNS, OFFSET.

use std::sync::Arc;

use cellgraph_common::{AbsoluteCellRange, CellError, CellValue, UNBOUNDED};
use cellgraph_parse::ASTNode;

use super::utils::{integer_arg, optional_arg};
use crate::function::{FnCaps, Function};
use crate::function_registry::FunctionRegistry;
use crate::interpreter::{Interpreter, InterpreterValue, SheetLimits};

/// `(width, height)` of an argument without reading cell values where
/// the argument is a reference.
fn shape_of(arg: &ASTNode, ctx: &Interpreter<'_>) -> Result<(u32, u32), CellError> {
    let value = match arg {
        ASTNode::Reference(_) => InterpreterValue::Range(ctx.range_argument(arg)?),
        _ => ctx.evaluate(arg),
    };
    match value {
        InterpreterValue::Range(r) => Ok(range_shape(&r, ctx.limits())),
        InterpreterValue::Matrix(rows) => {
            Ok((rows.first().map_or(0, |r| r.len() as u32), rows.len() as u32))
        }
        InterpreterValue::Scalar(CellValue::Error(e)) => Err(e),
        InterpreterValue::Scalar(_) => Ok((1, 1)),
    }
}

/// Unbounded column and row ranges extend to the sheet limits.
fn range_shape(r: &AbsoluteCellRange, limits: SheetLimits) -> (u32, u32) {
    let width = if r.end.col == UNBOUNDED {
        limits.max_columns.saturating_sub(r.start.col)
    } else {
        r.width()
    };
    let height = if r.end.row == UNBOUNDED {
        limits.max_rows.saturating_sub(r.start.row)
    } else {
        r.height()
    };
    (width, height)
}

/* ─────────────────────────── ROWS() ──────────────────────────── */

/// Number of rows in a reference or array.
///
/// Only the shape of a reference is read, so `ROWS(A1:A10)` has no edge to
/// the cells. It is flagged structure-sensitive so that an inserted row
/// inside the range recomputes it.
#[derive(Debug)]
pub struct RowsFn;

impl Function for RowsFn {
    fn name(&self) -> &'static str {
        "ROWS"
    }
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::NO_ARGUMENT_VALUES | FnCaps::STRUCTURE_SENSITIVE
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let (_, height) = shape_of(&args[0], ctx)?;
        Ok(CellValue::Number(height as f64).into())
    }
}

/* ─────────────────────────── COLUMNS() ──────────────────────────── */

#[derive(Debug)]
pub struct ColumnsFn;

impl Function for ColumnsFn {
    fn name(&self) -> &'static str {
        "COLUMNS"
    }
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::NO_ARGUMENT_VALUES | FnCaps::STRUCTURE_SENSITIVE
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let (width, _) = shape_of(&args[0], ctx)?;
        Ok(CellValue::Number(width as f64).into())
    }
}

/* ─────────────────────────── OFFSET() ──────────────────────────── */

/// `OFFSET(reference, rows, cols, [height], [width])`
///
/// Returns a reference shifted from `reference`. The target is only known
/// at evaluation time, so the function is volatile; it also re-runs after
/// structural edits since its base reference moves.
///
/// # Remarks
/// - A target that leaves the sheet, or a height/width below 1, is `#REF!`.
/// - `height` and `width` default to the size of `reference`.
#[derive(Debug)]
pub struct OffsetFn;

impl Function for OffsetFn {
    fn name(&self) -> &'static str {
        "OFFSET"
    }
    fn caps(&self) -> FnCaps {
        FnCaps::VOLATILE | FnCaps::STRUCTURE_SENSITIVE
    }
    fn min_args(&self) -> usize {
        3
    }
    fn max_args(&self) -> Option<usize> {
        Some(5)
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let base = ctx.range_argument(&args[0])?;
        if !base.is_finite() {
            return Err(CellError::reference().with_message("OFFSET needs a bounded reference"));
        }
        let rows = integer_arg(ctx, &args[1])?;
        let cols = integer_arg(ctx, &args[2])?;
        let height = match optional_arg(args, 3) {
            Some(arg) => integer_arg(ctx, arg)?,
            None => base.height() as i64,
        };
        let width = match optional_arg(args, 4) {
            Some(arg) => integer_arg(ctx, arg)?,
            None => base.width() as i64,
        };
        if height < 1 || width < 1 {
            return Err(CellError::reference().with_message("OFFSET size must be positive"));
        }

        let start = base.start.offset(cols, rows).ok_or_else(CellError::reference)?;
        let end = start
            .offset(width - 1, height - 1)
            .filter(|end| ctx.limits().contains(end))
            .ok_or_else(CellError::reference)?;
        Ok(InterpreterValue::Range(AbsoluteCellRange::new(start, end)))
    }
}

pub fn register_builtins(registry: &FunctionRegistry) {
    registry.register(Arc::new(RowsFn));
    registry.register(Arc::new(ColumnsFn));
    registry.register(Arc::new(OffsetFn));
}
