//! TODAY and NOW volatile functions

use std::sync::Arc;

use cellgraph_common::{CellError, CellValue};
use cellgraph_parse::ASTNode;

use crate::function::{FnCaps, Function};
use crate::function_registry::FunctionRegistry;
use crate::interpreter::{Interpreter, InterpreterValue};

/// Returns the current date as a volatile serial value.
///
/// # Remarks
/// - The result is the integer part of `NOW()`.
#[derive(Debug)]
pub struct TodayFn;

impl Function for TodayFn {
    fn name(&self) -> &'static str {
        "TODAY"
    }
    fn caps(&self) -> FnCaps {
        FnCaps::VOLATILE
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn eval(&self, _args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        Ok(CellValue::Number(ctx.now().floor()).into())
    }
}

/// Returns the current date and time as a volatile datetime serial.
///
/// # Remarks
/// - The integer part is the date serial; the fractional part is time of day.
/// - Without the `system-clock` feature the engine's clock is fixed at its
///   configured start instant.
#[derive(Debug)]
pub struct NowFn;

impl Function for NowFn {
    fn name(&self) -> &'static str {
        "NOW"
    }
    fn caps(&self) -> FnCaps {
        FnCaps::VOLATILE
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn eval(&self, _args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError> {
        Ok(CellValue::Number(ctx.now()).into())
    }
}

pub fn register_builtins(registry: &FunctionRegistry) {
    registry.register(Arc::new(TodayFn));
    registry.register(Arc::new(NowFn));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_workbook::TestWorkbook;

    #[test]
    fn now_and_today_read_the_pass_clock() {
        let wb = TestWorkbook::new().with_now(45_000.75);
        assert_eq!(wb.eval("=NOW()"), CellValue::Number(45_000.75));
        assert_eq!(wb.eval("=TODAY()"), CellValue::Number(45_000.0));
        assert_eq!(wb.eval("=NOW()-NOW()"), CellValue::Number(0.0));
    }
}
