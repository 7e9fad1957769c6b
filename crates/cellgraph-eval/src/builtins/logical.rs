// Logical functions. Arguments arrive unevaluated, so IF only evaluates
// the branch it returns.

use std::sync::Arc;

use cellgraph_common::{CellError, CellValue};
use cellgraph_parse::ASTNode;

use super::utils::optional_arg;
use crate::function::Function;
use crate::function_registry::FunctionRegistry;
use crate::interpreter::{Interpreter, InterpreterValue};

/// Fold the boolean view of every argument. Range cells that are text or
/// blank are ignored; with nothing to fold the result is `#VALUE!`.
fn fold_bools(
    args: &[ASTNode],
    ctx: &Interpreter<'_>,
    init: bool,
    step: fn(bool, bool) -> bool,
) -> Result<InterpreterValue, CellError> {
    let mut acc = init;
    let mut seen = false;
    for arg in args {
        match ctx.evaluate(arg) {
            InterpreterValue::Scalar(v) if !matches!(arg, ASTNode::Reference(_)) => {
                acc = step(acc, v.coerce_to_bool()?);
                seen = true;
            }
            other => {
                for v in ctx.values_of(other) {
                    match v {
                        CellValue::Error(e) => return Err(e),
                        CellValue::Number(_) | CellValue::Boolean(_) => {
                            acc = step(acc, v.coerce_to_bool()?);
                            seen = true;
                        }
                        _ => {}
                    }
                }
            }
        }
    }
    if seen {
        Ok(CellValue::Boolean(acc).into())
    } else {
        Err(CellError::value().with_message("No logical values"))
    }
}

/* ─────────────────────────── IF() ─────────────────────────────── */

#[derive(Debug)]
pub struct IfFn;

impl Function for IfFn {
    fn name(&self) -> &'static str {
        "IF"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let condition = ctx.evaluate_scalar(&args[0]).coerce_to_bool()?;
        if condition {
            return Ok(ctx.evaluate(&args[1]));
        }
        Ok(match optional_arg(args, 2) {
            Some(otherwise) => ctx.evaluate(otherwise),
            None if args.len() == 3 => CellValue::Number(0.0).into(),
            None => CellValue::Boolean(false).into(),
        })
    }
}

/* ─────────────────────────── AND() ──────────────────────────────── */

#[derive(Debug)]
pub struct AndFn;

impl Function for AndFn {
    fn name(&self) -> &'static str {
        "AND"
    }
    fn min_args(&self) -> usize {
        1
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        fold_bools(args, ctx, true, |a, b| a && b)
    }
}

/* ─────────────────────────── OR() ───────────────────────────────── */

#[derive(Debug)]
pub struct OrFn;

impl Function for OrFn {
    fn name(&self) -> &'static str {
        "OR"
    }
    fn min_args(&self) -> usize {
        1
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        fold_bools(args, ctx, false, |a, b| a || b)
    }
}

/* ─────────────────────────── NOT() ──────────────────────────────── */

#[derive(Debug)]
pub struct NotFn;

impl Function for NotFn {
    fn name(&self) -> &'static str {
        "NOT"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let v = ctx.evaluate_scalar(&args[0]).coerce_to_bool()?;
        Ok(CellValue::Boolean(!v).into())
    }
}

pub fn register_builtins(registry: &FunctionRegistry) {
    registry.register(Arc::new(IfFn));
    registry.register(Arc::new(AndFn));
    registry.register(Arc::new(OrFn));
    registry.register(Arc::new(NotFn));
}
