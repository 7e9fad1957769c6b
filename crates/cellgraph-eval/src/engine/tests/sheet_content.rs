use super::common::*;
use crate::engine::{Engine, EngineError, EvalConfig, ExportedChange};
use cellgraph_common::CellValue;

fn with_reader(first: &[&[&str]]) -> Engine {
    Engine::build_from_sheets(
        vec![
            ("Sheet1".into(), sheet(first)),
            ("Data".into(), sheet(&[&["=Sheet1!A1*3", "=SUM(Sheet1!A1:B2)"]])),
        ],
        EvalConfig::default(),
    )
    .unwrap()
}

fn data(engine: &Engine, a1: &str) -> CellValue {
    engine.get_cell_value(addr_on(1, a1))
}

#[test]
fn test_sheet_content_replaces_every_cell() {
    let mut engine = with_reader(&[&["1", "2"], &["3", "=A1+B1"]]);
    assert_eq!(data(&engine, "B1"), num(9.0));

    engine
        .set_sheet_content(0, sheet(&[&["4", "=A1+1"]]))
        .unwrap();
    assert_eq!(
        engine.get_sheet_serialized(0).unwrap(),
        sheet(&[&["4", "=A1+1"]])
    );
    assert_eq!(value(&engine, "B1"), num(5.0));
    assert_eq!(value(&engine, "B2"), CellValue::Empty);
    assert_eq!(data(&engine, "A1"), num(12.0));
    assert_eq!(data(&engine, "B1"), num(9.0));
}

#[test]
fn test_sheet_content_reports_cleared_cells_and_recomputes_once() {
    let mut engine = with_reader(&[&["1", "2"], &["3", "4"]]);
    let changes = engine.set_sheet_content(0, sheet(&[&["5"]])).unwrap();
    assert!(changes.contains(&ExportedChange {
        address: addr("B2"),
        value: CellValue::Empty,
    }));
    assert!(changes.contains(&ExportedChange {
        address: addr_on(1, "B1"),
        value: num(5.0),
    }));
    assert_eq!(engine.last_eval_result().unwrap().computed_vertices, 2);
}

#[test]
fn test_clear_sheet_leaves_readers_on_empty_cells() {
    let mut engine = with_reader(&[&["2", "=A1*2"]]);
    assert_eq!(data(&engine, "A1"), num(6.0));

    engine.clear_sheet(0).unwrap();
    assert!(engine.get_sheet_values(0).unwrap().is_empty());
    assert_eq!(data(&engine, "A1"), num(0.0));
    assert_eq!(data(&engine, "B1"), num(0.0));
    assert_eq!(
        engine.get_cell_formula(addr_on(1, "A1")).as_deref(),
        Some("=Sheet1!A1*3")
    );

    set(&mut engine, "A1", "7");
    assert_eq!(data(&engine, "A1"), num(21.0));
}

#[test]
fn test_sheet_content_tears_down_matrices() {
    let mut engine = engine(&[&["1", "2"], &["{=TRANSPOSE(A1:B1)}"]]);
    assert_eq!(engine.graph().matrices().len(), 1);
    engine
        .set_sheet_content(0, sheet(&[&["8", "=A1"]]))
        .unwrap();
    assert!(engine.graph().matrices().is_empty());
    assert_eq!(value(&engine, "B1"), num(8.0));
    assert_eq!(value(&engine, "A2"), CellValue::Empty);
}

#[test]
fn test_sheet_content_detects_numeric_blocks_again() {
    let config = EvalConfig::default().with_matrix_detection(true, 4);
    let mut engine = engine_with(&[&["1", "2"], &["3", "4"], &["=SUM(A1:B2)"]], config);
    assert_eq!(engine.graph().matrices().len(), 1);

    engine
        .set_sheet_content(
            0,
            sheet(&[&["1", "1", "x"], &["1", "1", "y"], &["1", "1", "=SUM(A1:B3)"]]),
        )
        .unwrap();
    assert_eq!(engine.graph().matrices().len(), 1);
    assert_eq!(value(&engine, "C3"), num(6.0));
    assert_eq!(value(&engine, "C1"), CellValue::Text("x".into()));

    set(&mut engine, "A3", "10");
    assert_eq!(value(&engine, "C3"), num(15.0));
}

#[test]
fn test_failed_sheet_content_changes_nothing() {
    let mut engine = engine(&[&["1", "=A1+1"]]);
    let result = engine.set_sheet_content(
        0,
        sheet(&[&["1", "2"], &["{=TRANSPOSE(A1:B1)}"], &["{=TRANSPOSE(A1:B1)}"]]),
    );
    assert_eq!(result, Err(EngineError::MatrixEdit(addr("A3"))));
    assert_eq!(engine.get_sheet_serialized(0).unwrap(), sheet(&[&["1", "=A1+1"]]));
    assert_eq!(value(&engine, "B1"), num(2.0));

    let small = EvalConfig::default().with_limits(2, 2);
    let mut engine = engine_with(&[&["1"]], small);
    assert_eq!(
        engine.set_sheet_content(0, sheet(&[&["1", "2", "3"]])),
        Err(EngineError::SheetSizeLimit { rows: 2, columns: 2 })
    );
    assert_eq!(
        engine.clear_sheet(4),
        Err(EngineError::NoSuchSheet("4".into()))
    );
}

#[test]
fn test_block_write_lands_at_its_corner() {
    let mut engine = engine(&[&["1"]]);
    let block = sheet(&[&["2", "3"], &["=B2+C2", "=A1+B3"]]);
    engine.set_cells_contents(addr("B2"), &block).unwrap();
    assert_eq!(value(&engine, "B3"), num(5.0));
    assert_eq!(value(&engine, "C3"), num(6.0));
    assert_eq!(engine.last_eval_result().unwrap().computed_vertices, 2);
}

#[test]
fn test_block_write_past_the_limit_is_rejected_whole() {
    let small = EvalConfig::default().with_limits(4, 4);
    let mut engine = engine_with(&[&["1"]], small);
    let block = sheet(&[&["5", "6"]]);
    assert_eq!(
        engine.set_cells_contents(addr("D1"), &block),
        Err(EngineError::SheetSizeLimit { rows: 4, columns: 4 })
    );
    assert_eq!(value(&engine, "D1"), CellValue::Empty);
}
