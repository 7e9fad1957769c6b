use std::sync::Arc;

use cellgraph_common::CellError;
use cellgraph_parse::ASTNode;

use super::super::utils::optional_arg;
use crate::function::Function;
use crate::function_registry::FunctionRegistry;
use crate::interpreter::{CriterionAggregate, Interpreter, InterpreterValue};

/*
Criteria-driven aggregation functions:
  - SUMIF(range, criteria, [sum_range])
  - COUNTIF(range, criteria)

Results are memoised on the summed range, keyed by the condition range
and the criterion text, so repeated criteria over the same columns are
answered from cache until one of the cells changes.
*/

/* ─────────────────────────── SUMIF() ──────────────────────────── */
#[derive(Debug)]
pub struct SumIfFn;

impl Function for SumIfFn {
    fn name(&self) -> &'static str {
        "SUMIF"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let condition = ctx.range_argument(&args[0])?;
        let criterion = ctx.evaluate_scalar(&args[1]);
        if let Some(e) = criterion.as_error() {
            return Err(e.clone());
        }
        let values = match optional_arg(args, 2) {
            Some(arg) => ctx.range_argument(arg)?,
            None => condition,
        };
        Ok(ctx
            .criterion_aggregate(CriterionAggregate::Sum, &condition, &criterion, &values)
            .into())
    }
}

/* ─────────────────────────── COUNTIF() ──────────────────────────── */
#[derive(Debug)]
pub struct CountIfFn;

impl Function for CountIfFn {
    fn name(&self) -> &'static str {
        "COUNTIF"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let condition = ctx.range_argument(&args[0])?;
        let criterion = ctx.evaluate_scalar(&args[1]);
        if let Some(e) = criterion.as_error() {
            return Err(e.clone());
        }
        Ok(ctx
            .criterion_aggregate(CriterionAggregate::Count, &condition, &criterion, &condition)
            .into())
    }
}

pub fn register_builtins(registry: &FunctionRegistry) {
    registry.register(Arc::new(SumIfFn));
    registry.register(Arc::new(CountIfFn));
}
