//! Array-producing functions usable as matrix formulas: TRANSPOSE, MMULT.
//!
//! `matrix_size` lets the engine reserve the output span before the first
//! evaluation; it is computed from the argument shapes alone.

use std::sync::Arc;

use cellgraph_common::{CellError, CellValue, SimpleCellAddress};
use cellgraph_parse::ASTNode;

use super::utils::numeric_rows;
use crate::function::{FnCaps, Function, argument_shape};
use crate::function_registry::FunctionRegistry;
use crate::interpreter::{Interpreter, InterpreterValue};

/* ─────────────────────────── TRANSPOSE() ──────────────────────────── */

#[derive(Debug)]
pub struct TransposeFn;

impl Function for TransposeFn {
    fn name(&self) -> &'static str {
        "TRANSPOSE"
    }
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::RETURNS_MATRIX
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn matrix_size(&self, args: &[ASTNode], address: SimpleCellAddress) -> Option<(u32, u32)> {
        let (w, h) = argument_shape(args.first()?, address)?;
        Some((h, w))
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let rows = ctx.rows_of(ctx.evaluate(&args[0]))?;
        let width = rows.first().map_or(0, Vec::len);
        let transposed: Vec<Vec<CellValue>> = (0..width)
            .map(|c| rows.iter().map(|row| row[c].clone()).collect())
            .collect();
        Ok(InterpreterValue::Matrix(transposed))
    }
}

/* ─────────────────────────── MMULT() ──────────────────────────── */

/// Matrix product of two numeric arrays.
///
/// # Remarks
/// - Any non-numeric cell, or an inner-dimension mismatch, is `#VALUE!`.
#[derive(Debug)]
pub struct MmultFn;

impl Function for MmultFn {
    fn name(&self) -> &'static str {
        "MMULT"
    }
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::RETURNS_MATRIX
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn matrix_size(&self, args: &[ASTNode], address: SimpleCellAddress) -> Option<(u32, u32)> {
        let (aw, ah) = argument_shape(args.first()?, address)?;
        let (bw, bh) = argument_shape(args.get(1)?, address)?;
        (aw == bh).then_some((bw, ah))
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let a = numeric_rows(&ctx.rows_of(ctx.evaluate(&args[0]))?)?;
        let b = numeric_rows(&ctx.rows_of(ctx.evaluate(&args[1]))?)?;
        let inner = a.first().map_or(0, Vec::len);
        if inner == 0 || inner != b.len() {
            return Err(CellError::value().with_message("MMULT dimensions do not agree"));
        }
        let width = b[0].len();
        let product = a
            .iter()
            .map(|row| {
                (0..width)
                    .map(|j| {
                        let dot: f64 = row.iter().zip(&b).map(|(x, brow)| x * brow[j]).sum();
                        CellValue::Number(dot)
                    })
                    .collect()
            })
            .collect();
        Ok(InterpreterValue::Matrix(product))
    }
}

pub fn register_builtins(registry: &FunctionRegistry) {
    registry.register(Arc::new(TransposeFn));
    registry.register(Arc::new(MmultFn));
}
