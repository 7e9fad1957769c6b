use super::common::*;
use crate::engine::{Engine, EngineError, EvalConfig};
use cellgraph_common::CellValue;

const GRID: &[&[&str]] = &[&["1", "=A1*2", "text"], &["", "=SUM(A1:B1)"]];

#[test]
fn test_serialized_sheet_keeps_raw_contents() {
    let engine = engine(GRID);
    let serialized = engine.get_sheet_serialized(0).unwrap();
    assert_eq!(
        serialized,
        vec![
            vec!["1".to_string(), "=A1*2".into(), "text".into()],
            vec!["".into(), "=SUM(A1:B1)".into(), "".into()],
        ]
    );
}

#[test]
fn test_sheet_values_are_a_dense_grid() {
    let engine = engine(GRID);
    let values = engine.get_sheet_values(0).unwrap();
    assert_eq!(
        values,
        vec![
            vec![num(1.0), num(2.0), CellValue::Text("text".into())],
            vec![CellValue::Empty, num(3.0), CellValue::Empty],
        ]
    );
}

#[test]
fn test_rebuilding_from_serialized_matches() {
    let mut original = engine(GRID);
    set(&mut original, "A1", "4");
    set(&mut original, "D3", "=B2+1");
    let rebuilt = Engine::build_from_array(
        original.get_sheet_serialized(0).unwrap(),
        EvalConfig::default(),
    )
    .unwrap();
    assert_eq!(
        rebuilt.get_sheet_values(0).unwrap(),
        original.get_sheet_values(0).unwrap()
    );
    assert_eq!(value(&rebuilt, "D3"), num(13.0));
}

#[test]
fn test_numeric_matrix_serializes_as_numbers() {
    let engine = engine_with(
        &[&["1", "2"], &["3", "4"]],
        EvalConfig::default().with_matrix_detection(true, 4),
    );
    assert_eq!(engine.graph().matrices().len(), 1);
    assert_eq!(
        engine.get_sheet_serialized(0).unwrap(),
        vec![vec!["1".to_string(), "2".into()], vec!["3".into(), "4".into()]]
    );
}

#[test]
fn test_empty_sheet_is_empty() {
    let mut engine = engine(&[]);
    assert!(engine.get_sheet_values(0).unwrap().is_empty());
    set(&mut engine, "B2", "x");
    set(&mut engine, "B2", "");
    assert!(engine.get_sheet_serialized(0).unwrap().is_empty());
}

#[test]
fn test_unknown_sheet() {
    let engine = engine(GRID);
    assert_eq!(
        engine.get_sheet_values(4),
        Err(EngineError::NoSuchSheet("4".into()))
    );
}
