use cellgraph_common::{CellError, CellValue};
use cellgraph_parse::ASTNode;

use crate::interpreter::Interpreter;

/// Evaluate `arg` to a number. Errors propagate, text must parse.
pub fn number_arg(ctx: &Interpreter<'_>, arg: &ASTNode) -> Result<f64, CellError> {
    ctx.evaluate_scalar(arg).coerce_to_number()
}

/// Like [`number_arg`] but truncated towards zero, as offsets and sizes are.
pub fn integer_arg(ctx: &Interpreter<'_>, arg: &ASTNode) -> Result<i64, CellError> {
    let n = number_arg(ctx, arg)?;
    if !n.is_finite() {
        return Err(CellError::value());
    }
    Ok(n.trunc() as i64)
}

/// Optional trailing argument; an omitted (`Literal(Empty)`) one is `None`.
pub fn optional_arg(args: &[ASTNode], index: usize) -> Option<&ASTNode> {
    match args.get(index) {
        None | Some(ASTNode::Literal(CellValue::Empty)) => None,
        Some(arg) => Some(arg),
    }
}

/// Rows of numbers, or `#VALUE!` if any cell is not a number.
pub fn numeric_rows(rows: &[Vec<CellValue>]) -> Result<Vec<Vec<f64>>, CellError> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|v| match v {
                    CellValue::Number(n) => Ok(*n),
                    CellValue::Error(e) => Err(e.clone()),
                    _ => Err(CellError::value().with_message("Array holds a non-number")),
                })
                .collect()
        })
        .collect()
}
