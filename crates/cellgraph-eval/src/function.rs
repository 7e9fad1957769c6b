//! The `Function` trait and its capability flags.

use cellgraph_common::{CellError, SimpleCellAddress};
use cellgraph_parse::ASTNode;

use crate::interpreter::{Interpreter, InterpreterValue};

bitflags::bitflags! {
    /// Static properties the parser and the evaluator read before calling
    /// a function.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct FnCaps: u8 {
        /// Same output for the same input, no side effects.
        const PURE                = 0b0000_0001;
        /// Recomputed on every pass (`RAND()`, `NOW()`).
        const VOLATILE            = 0b0000_0010;
        /// Recomputed after every row/column insertion or removal, even
        /// without an edge to the edited area (`OFFSET`).
        const STRUCTURE_SENSITIVE = 0b0000_0100;
        /// Reads only the shape of its reference arguments (`ROWS`).
        const NO_ARGUMENT_VALUES  = 0b0000_1000;
        /// Produces an array; usable as a matrix formula.
        const RETURNS_MATRIX      = 0b0001_0000;
    }
}

/// A spreadsheet function callable from formulas.
///
/// Arguments arrive unevaluated so that functions can short-circuit
/// (`IF`), inspect references (`ROWS`, `OFFSET`) or hit range caches
/// (`SUM`, `SUMIF`).
pub trait Function: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn caps(&self) -> FnCaps {
        FnCaps::PURE
    }

    fn min_args(&self) -> usize {
        0
    }

    /// `None` for variadic functions.
    fn max_args(&self) -> Option<usize> {
        None
    }

    fn volatile(&self) -> bool {
        self.caps().contains(FnCaps::VOLATILE)
    }

    /// `(width, height)` of the array produced for a formula at `address`.
    fn matrix_size(&self, _args: &[ASTNode], _address: SimpleCellAddress) -> Option<(u32, u32)> {
        None
    }

    fn eval(&self, args: &[ASTNode], ctx: &Interpreter<'_>) -> Result<InterpreterValue, CellError>;
}

/// `(width, height)` of a literal or reference argument.
pub fn argument_shape(arg: &ASTNode, address: SimpleCellAddress) -> Option<(u32, u32)> {
    match arg {
        ASTNode::Literal(_) => Some((1, 1)),
        ASTNode::Reference(r) => {
            let range = r.to_range(address)?;
            range.is_finite().then(|| (range.width(), range.height()))
        }
        _ => None,
    }
}
