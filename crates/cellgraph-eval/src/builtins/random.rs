//! Volatile random functions: RAND, RANDBETWEEN.
//!
//! Draws come from the engine's seeded generator, so a run with a fixed
//! seed is reproducible.
use std::sync::Arc;

use cellgraph_common::{CellError, CellValue, ErrorKind};
use cellgraph_parse::ASTNode;

use super::utils::number_arg;
use crate::function::{FnCaps, Function};
use crate::function_registry::FunctionRegistry;
use crate::interpreter::{Interpreter, InterpreterValue};

#[derive(Debug)]
pub struct RandFn;

impl Function for RandFn {
    fn name(&self) -> &'static str {
        "RAND"
    }

    fn caps(&self) -> FnCaps {
        FnCaps::VOLATILE
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn eval(&self, _args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        Ok(CellValue::Number(ctx.random()).into())
    }
}

#[derive(Debug)]
pub struct RandBetweenFn;

impl Function for RandBetweenFn {
    fn name(&self) -> &'static str {
        "RANDBETWEEN"
    }

    fn caps(&self) -> FnCaps {
        FnCaps::VOLATILE
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        let lo = number_arg(ctx, &args[0])?.ceil();
        let hi = number_arg(ctx, &args[1])?.floor();
        if hi < lo {
            return Err(CellError::new(ErrorKind::Num));
        }
        let n = lo + (ctx.random() * (hi - lo + 1.0)).floor();
        Ok(CellValue::Number(n.min(hi)).into())
    }
}

pub fn register_builtins(registry: &FunctionRegistry) {
    registry.register(Arc::new(RandFn));
    registry.register(Arc::new(RandBetweenFn));
}
