use super::common::*;
use crate::engine::{EngineError, EvalConfig, MatrixValues};
use cellgraph_common::{CellValue, ErrorKind};

fn detecting() -> EvalConfig {
    EvalConfig::default().with_matrix_detection(true, 4)
}

#[test]
fn test_detected_matrix_edits_in_place() {
    let mut engine = engine_with(&[&["1", "2"], &["3", "4"], &["=SUM(A1:B2)"]], detecting());
    assert_eq!(engine.graph().matrices().len(), 1);
    assert_eq!(value(&engine, "A3"), num(10.0));

    set(&mut engine, "A1", "5");
    assert_eq!(engine.graph().matrices().len(), 1);
    assert_eq!(value(&engine, "A3"), num(14.0));
}

#[test]
fn test_non_numeric_write_dissolves_detected_matrix() {
    let mut engine = engine_with(&[&["1", "2"], &["3", "4"], &["=SUM(A1:B2)"]], detecting());
    set(&mut engine, "B1", "x");
    assert!(engine.graph().matrices().is_empty());
    assert_eq!(value(&engine, "B1"), CellValue::Text("x".into()));
    assert_eq!(value(&engine, "A3"), num(8.0));
    set(&mut engine, "B2", "10");
    assert_eq!(value(&engine, "A3"), num(14.0));
}

#[test]
fn test_matrix_formula_cells_are_read_only() {
    let mut engine = engine(&[&["1", "2"], &["{=TRANSPOSE(A1:B1)}"]]);
    assert_eq!(
        engine.set_cell_contents(addr("A3"), "9"),
        Err(EngineError::MatrixEdit(addr("A3")))
    );
    assert_eq!(
        engine.set_matrix_empty(addr("B1")),
        Err(EngineError::NotAMatrix(addr("B1")))
    );
}

#[test]
fn test_matrix_formula_follows_its_inputs() {
    let mut engine = engine(&[&["1", "2"], &["{=TRANSPOSE(A1:B1)}", "=SUM(A2:A3)"]]);
    assert_eq!(value(&engine, "B2"), num(3.0));
    set(&mut engine, "B1", "7");
    assert_eq!(value(&engine, "A3"), num(7.0));
    assert_eq!(value(&engine, "B2"), num(8.0));
}

#[test]
fn test_matrix_formula_entered_by_edit() {
    let mut engine = engine(&[&["1"], &["2"]]);
    set(&mut engine, "C1", "{=TRANSPOSE(A1:A2)}");
    assert_eq!(value(&engine, "C1"), num(1.0));
    assert_eq!(value(&engine, "D1"), num(2.0));
    assert_eq!(
        engine.get_cell_formula(addr("C1")).as_deref(),
        Some("{=TRANSPOSE(A1:A2)}")
    );
    assert_eq!(engine.get_cell_formula(addr("D1")), None);
}

#[test]
fn test_mmult_matrix() {
    let engine = engine(&[
        &["1", "2", "{=MMULT(A1:B2,A1:B2)}"],
        &["3", "4"],
    ]);
    assert_eq!(value(&engine, "C1"), num(7.0));
    assert_eq!(value(&engine, "D1"), num(10.0));
    assert_eq!(value(&engine, "C2"), num(15.0));
    assert_eq!(value(&engine, "D2"), num(22.0));
}

#[test]
fn test_non_numeric_matrix_result_is_value_error() {
    let engine = engine(&[&["1", "x"], &["{=TRANSPOSE(A1:B1)}"]]);
    assert_eq!(value(&engine, "A2"), err(ErrorKind::Value));
    assert_eq!(value(&engine, "A3"), err(ErrorKind::Value));
    let (_, id) = engine.graph().matrices().containing(&addr("A2")).unwrap();
    let matrix = engine.graph().vertex(id).unwrap().as_matrix().unwrap();
    assert!(matches!(matrix.values, MatrixValues::Error(_)));
}

#[test]
fn test_overlapping_matrix_formula_is_rejected() {
    let mut engine = engine(&[&["1", "2"], &["{=TRANSPOSE(A1:B1)}"]]);
    assert_eq!(
        engine.set_cell_contents(addr("A1"), "{=TRANSPOSE(A1:B1)}"),
        Err(EngineError::MatrixEdit(addr("A1")))
    );
    assert_eq!(value(&engine, "A1"), num(1.0));
}
