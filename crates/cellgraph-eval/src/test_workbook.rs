//! Lightweight in-memory workbook for function unit tests.
//!
//! Holds one sheet of plain values and evaluates formulas against it
//! without going through the engine's scheduler.
use std::cell::RefCell;
use std::sync::Arc;

use cellgraph_common::{CellValue, SimpleCellAddress, column_index};
use cellgraph_parse::parse;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::engine::{DependencyGraph, SheetMapping, Vertex};
use crate::function::Function;
use crate::function_registry::FunctionRegistry;
use crate::interpreter::{Interpreter, InterpreterValue, SheetLimits};

pub struct TestWorkbook {
    graph: DependencyGraph,
    registry: FunctionRegistry,
    rng: RefCell<SmallRng>,
    now: f64,
    at: SimpleCellAddress,
}

impl Default for TestWorkbook {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkbook {
    /* ─────────────── constructors ─────────────── */
    pub fn new() -> Self {
        let mut sheets = SheetMapping::new();
        sheets.id_for("Sheet1");
        Self {
            graph: DependencyGraph::new(sheets),
            registry: FunctionRegistry::with_builtins(),
            rng: RefCell::new(SmallRng::seed_from_u64(0)),
            now: 0.0,
            at: SimpleCellAddress::new(0, 25, 999),
        }
    }

    /* ─────────────── cell helpers ─────────────── */
    pub fn with_cell_a1(mut self, a1: &str, v: impl Into<CellValue>) -> Self {
        let addr = parse_a1(a1).expect("bad A1 ref in with_cell_a1");
        self.graph
            .set_cell_vertex(addr, Vertex::Value(v.into()), &[])
            .expect("value cell");
        self
    }

    /// Numbers written downwards from `top`.
    pub fn with_column(mut self, top: &str, values: &[f64]) -> Self {
        let start = parse_a1(top).expect("bad A1 ref in with_column");
        for (i, v) in values.iter().enumerate() {
            let addr = SimpleCellAddress::new(0, start.col, start.row + i as u32);
            self.graph
                .set_cell_vertex(addr, Vertex::Value(CellValue::Number(*v)), &[])
                .expect("value cell");
        }
        self
    }

    pub fn with_function(self, f: Arc<dyn Function>) -> Self {
        self.registry.register(f);
        self
    }

    pub fn with_now(mut self, now: f64) -> Self {
        self.now = now;
        self
    }

    /// Formulas are evaluated as if written in this cell.
    pub fn at(mut self, a1: &str) -> Self {
        self.at = parse_a1(a1).expect("bad A1 ref in at");
        self
    }

    /* ─────────────── evaluation ─────────────── */
    pub fn graph_mut(&mut self) -> &mut DependencyGraph {
        &mut self.graph
    }

    pub fn interpreter(&self) -> Interpreter<'_> {
        Interpreter::new(
            &self.graph,
            &self.registry,
            &self.rng,
            self.now,
            SheetLimits::default(),
        )
        .at(self.at)
    }

    pub fn eval_raw(&self, formula: &str) -> InterpreterValue {
        let ast = parse(formula, self.at, self.graph.sheets()).expect("formula parses");
        self.interpreter().evaluate(&ast)
    }

    pub fn eval(&self, formula: &str) -> CellValue {
        let ast = parse(formula, self.at, self.graph.sheets()).expect("formula parses");
        self.interpreter().evaluate_scalar(&ast)
    }
}

/// `"B3"` -> column 1, row 2.
fn parse_a1(a1: &str) -> Option<SimpleCellAddress> {
    let split = a1.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = a1.split_at(split);
    let col = column_index(letters)?;
    let row: u32 = digits.parse().ok()?;
    Some(SimpleCellAddress::new(0, col, row.checked_sub(1)?))
}
