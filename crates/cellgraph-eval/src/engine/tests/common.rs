//! Common test helpers
use cellgraph_common::{CellValue, ErrorKind, SimpleCellAddress, column_index};

use crate::engine::{Engine, EvalConfig, Sheet};

pub fn sheet(rows: &[&[&str]]) -> Sheet {
    rows.iter()
        .map(|r| r.iter().map(|s| s.to_string()).collect())
        .collect()
}

/// `"B3"` on the first sheet.
pub fn addr(a1: &str) -> SimpleCellAddress {
    addr_on(0, a1)
}

pub fn addr_on(sheet: u32, a1: &str) -> SimpleCellAddress {
    let split = a1
        .find(|c: char| c.is_ascii_digit())
        .expect("A1 reference needs a row");
    let col = column_index(&a1[..split]).expect("bad column");
    let row: u32 = a1[split..].parse().expect("bad row");
    SimpleCellAddress::new(sheet, col, row - 1)
}

pub fn engine(rows: &[&[&str]]) -> Engine {
    engine_with(rows, EvalConfig::default())
}

pub fn engine_with(rows: &[&[&str]], config: EvalConfig) -> Engine {
    Engine::build_from_array(sheet(rows), config).expect("sheet builds")
}

pub fn value(engine: &Engine, a1: &str) -> CellValue {
    engine.get_cell_value(addr(a1))
}

pub fn num(n: f64) -> CellValue {
    CellValue::Number(n)
}

pub fn err(kind: ErrorKind) -> CellValue {
    CellValue::error(kind)
}

pub fn set(engine: &mut Engine, a1: &str, raw: &str) {
    engine
        .set_cell_contents(addr(a1), raw)
        .expect("edit accepted");
}
