use super::common::*;
use crate::engine::{Engine, EngineError, EvalConfig, ExportedChange};
use cellgraph_common::{AbsoluteCellRange, CellValue, ErrorKind, SimpleCellAddress, UNBOUNDED};

fn block(from: &str, to: &str) -> AbsoluteCellRange {
    AbsoluteCellRange::new(addr(from), addr(to))
}

fn formula(engine: &Engine, a1: &str) -> Option<String> {
    engine.get_cell_formula(addr(a1))
}

fn linked_sheets() -> Engine {
    Engine::build_from_sheets(
        vec![
            ("Sheet1".into(), sheet(&[&["2", "=Data!A1+1", "=SUM(Data!A1:A2)"]])),
            ("Data".into(), sheet(&[&["=Sheet1!A1*3"], &["4"]])),
        ],
        EvalConfig::default(),
    )
    .unwrap()
}

#[test]
fn test_moved_cells_take_their_readers_along() {
    let mut engine = engine(&[&["1", "=A1+1"], &["=A1*10"]]);
    let changes = engine.move_cells(block("A1", "B1"), addr("D5")).unwrap();
    assert!(changes.contains(&ExportedChange {
        address: addr("A1"),
        value: CellValue::Empty,
    }));

    assert_eq!(value(&engine, "D5"), num(1.0));
    assert_eq!(value(&engine, "E5"), num(2.0));
    assert_eq!(value(&engine, "A2"), num(10.0));
    assert_eq!(value(&engine, "B1"), CellValue::Empty);
    assert_eq!(formula(&engine, "E5").as_deref(), Some("=D5+1"));
    assert_eq!(formula(&engine, "A2").as_deref(), Some("=D5*10"));

    set(&mut engine, "D5", "4");
    assert_eq!(value(&engine, "E5"), num(5.0));
    assert_eq!(value(&engine, "A2"), num(40.0));
    set(&mut engine, "A1", "100");
    assert_eq!(value(&engine, "A2"), num(40.0));
}

#[test]
fn test_ranges_inside_the_block_travel_and_partial_ones_stay() {
    let mut engine = engine(&[&["1"], &["2"], &["=SUM(A1:A2)"], &["=SUM(A1:A3)"]]);
    assert_eq!(value(&engine, "A4"), num(6.0));

    engine.move_cells(block("A1", "A2"), addr("C1")).unwrap();
    assert_eq!(formula(&engine, "A3").as_deref(), Some("=SUM(C1:C2)"));
    assert_eq!(formula(&engine, "A4").as_deref(), Some("=SUM(A1:A3)"));
    assert_eq!(value(&engine, "A3"), num(3.0));
    assert_eq!(value(&engine, "A4"), num(3.0));

    set(&mut engine, "C1", "10");
    assert_eq!(value(&engine, "A3"), num(12.0));
    assert_eq!(value(&engine, "A4"), num(12.0));
    set(&mut engine, "A1", "5");
    assert_eq!(value(&engine, "A4"), num(17.0));
}

#[test]
fn test_readers_of_overwritten_cells_see_what_landed() {
    let mut engine = engine(&[&["1", "9", "=B1*2"]]);
    engine.move_cells(block("A1", "A1"), addr("B1")).unwrap();
    assert_eq!(value(&engine, "A1"), CellValue::Empty);
    assert_eq!(value(&engine, "B1"), num(1.0));
    assert_eq!(value(&engine, "C1"), num(2.0));
    assert_eq!(formula(&engine, "C1").as_deref(), Some("=B1*2"));

    set(&mut engine, "B1", "7");
    assert_eq!(value(&engine, "C1"), num(14.0));
}

#[test]
fn test_moved_formula_loses_the_cell_it_lands_on() {
    let mut engine = engine(&[&["=B1+1", "5"]]);
    engine.move_cells(block("A1", "A1"), addr("B1")).unwrap();
    assert_eq!(formula(&engine, "B1").as_deref(), Some("=#REF!+1"));
    assert_eq!(value(&engine, "B1"), err(ErrorKind::Ref));
}

#[test]
fn test_column_range_loses_cells_moved_out_of_it() {
    let mut engine = engine(&[&["1", "=SUM(A:A)"], &["2"]]);
    assert_eq!(value(&engine, "B1"), num(3.0));

    engine.move_cells(block("A1", "A2"), addr("C1")).unwrap();
    assert_eq!(value(&engine, "B1"), num(0.0));
    assert_eq!(formula(&engine, "B1").as_deref(), Some("=SUM(A:A)"));
    set(&mut engine, "A5", "4");
    assert_eq!(value(&engine, "B1"), num(4.0));
}

#[test]
fn test_move_to_another_sheet_qualifies_references() {
    let mut engine = Engine::build_from_sheets(
        vec![
            ("Sheet1".into(), sheet(&[&["2", "=A1+1"]])),
            ("Data".into(), sheet(&[&["=Sheet1!A1*3"]])),
        ],
        EvalConfig::default(),
    )
    .unwrap();
    engine
        .move_cells(block("A1", "B1"), addr_on(1, "B2"))
        .unwrap();

    assert_eq!(value(&engine, "A1"), CellValue::Empty);
    assert_eq!(engine.get_cell_value(addr_on(1, "C2")), num(3.0));
    assert_eq!(
        engine.get_cell_formula(addr_on(1, "C2")).as_deref(),
        Some("=B2+1")
    );
    assert_eq!(
        engine.get_cell_formula(addr_on(1, "A1")).as_deref(),
        Some("=Data!B2*3")
    );

    engine.set_cell_contents(addr_on(1, "B2"), "5").unwrap();
    assert_eq!(engine.get_cell_value(addr_on(1, "A1")), num(15.0));
    assert_eq!(engine.get_cell_value(addr_on(1, "C2")), num(6.0));
}

#[test]
fn test_moves_touching_formula_matrices_are_rejected() {
    let mut engine = engine(&[&["1", "2"], &["{=TRANSPOSE(A1:B1)}"]]);
    assert_eq!(
        engine.move_cells(block("A1", "A2"), addr("D1")),
        Err(EngineError::MatrixEdit(addr("A2")))
    );
    assert_eq!(
        engine.move_cells(block("B1", "B1"), addr("A3")),
        Err(EngineError::MatrixEdit(addr("A2")))
    );
    assert_eq!(value(&engine, "A3"), num(2.0));
    assert_eq!(value(&engine, "B1"), num(2.0));
}

#[test]
fn test_bad_moves_are_refused() {
    let small = EvalConfig::default().with_limits(4, 4);
    let mut engine = engine_with(&[&["1", "2"]], small);
    let unbounded = AbsoluteCellRange::new(addr("A1"), SimpleCellAddress::new(0, 0, UNBOUNDED));
    assert!(matches!(
        engine.move_cells(unbounded, addr("C1")),
        Err(EngineError::InvalidArguments(_))
    ));
    assert_eq!(
        engine.move_cells(block("A1", "B1"), addr("D4")),
        Err(EngineError::SheetSizeLimit { rows: 4, columns: 4 })
    );
    assert_eq!(
        engine.move_cells(block("A1", "A1"), addr_on(3, "A1")),
        Err(EngineError::NoSuchSheet("3".into()))
    );
    assert!(engine.move_cells(block("A1", "B1"), addr("A1")).is_ok());
    assert_eq!(value(&engine, "B1"), num(2.0));
}

#[test]
fn test_move_row_down_past_its_readers() {
    let mut engine = engine(&[&["1"], &["2"], &["3"], &["=A1*10"]]);
    engine.move_rows(0, 0, 1, 3).unwrap();
    assert_eq!(
        engine.get_sheet_values(0).unwrap(),
        vec![vec![num(2.0)], vec![num(3.0)], vec![num(1.0)], vec![num(10.0)]]
    );
    assert_eq!(formula(&engine, "A4").as_deref(), Some("=A3*10"));
}

#[test]
fn test_moved_rows_carry_ranges_over_them() {
    let mut engine = engine(&[&["1"], &["2"], &["=SUM(A1:A2)"], &["5"]]);
    engine.move_rows(0, 0, 2, 4).unwrap();
    assert_eq!(formula(&engine, "A1").as_deref(), Some("=SUM(A3:A4)"));
    assert_eq!(value(&engine, "A1"), num(3.0));
    assert_eq!(value(&engine, "A2"), num(5.0));
    assert_eq!(value(&engine, "A4"), num(2.0));

    set(&mut engine, "A3", "10");
    assert_eq!(value(&engine, "A1"), num(12.0));
}

#[test]
fn test_move_column_to_the_front() {
    let mut engine = engine(&[&["1", "2", "=A1+B1"]]);
    engine.move_columns(0, 2, 1, 0).unwrap();
    assert_eq!(formula(&engine, "A1").as_deref(), Some("=B1+C1"));
    assert_eq!(value(&engine, "A1"), num(3.0));
    assert_eq!(value(&engine, "D1"), CellValue::Empty);

    set(&mut engine, "B1", "5");
    assert_eq!(value(&engine, "A1"), num(7.0));
}

#[test]
fn test_line_moves_onto_themselves() {
    let mut engine = engine(&[&["1"], &["2"], &["3"]]);
    assert!(matches!(
        engine.move_rows(0, 0, 2, 1),
        Err(EngineError::InvalidArguments(_))
    ));
    engine.move_rows(0, 0, 2, 2).unwrap();
    engine.move_rows(0, 1, 1, 1).unwrap();
    assert_eq!(
        engine.get_sheet_values(0).unwrap(),
        vec![vec![num(1.0)], vec![num(2.0)], vec![num(3.0)]]
    );
}

#[test]
fn test_removed_sheet_leaves_ref_errors_behind() {
    let mut engine = linked_sheets();
    assert_eq!(value(&engine, "C1"), num(10.0));

    engine.remove_sheet(1).unwrap();
    assert_eq!(engine.sheet_names(), vec!["Sheet1"]);
    assert_eq!(engine.sheet_id("Data"), None);
    assert_eq!(formula(&engine, "B1").as_deref(), Some("=#REF!+1"));
    assert_eq!(value(&engine, "B1"), err(ErrorKind::Ref));
    assert_eq!(value(&engine, "C1"), err(ErrorKind::Ref));
    assert_eq!(
        engine.get_sheet_values(1),
        Err(EngineError::NoSuchSheet("1".into()))
    );
    assert_eq!(engine.remove_sheet(1), Err(EngineError::NoSuchSheet("1".into())));

    assert_eq!(engine.add_sheet("Data").unwrap(), 2);
    set(&mut engine, "A1", "7");
    assert_eq!(value(&engine, "A1"), num(7.0));
}

#[test]
fn test_rename_sheet_changes_formula_text_only() {
    let mut engine = linked_sheets();
    engine.rename_sheet(1, "Inputs").unwrap();
    assert_eq!(formula(&engine, "B1").as_deref(), Some("=Inputs!A1+1"));
    assert_eq!(value(&engine, "B1"), num(7.0));
    assert_eq!(engine.sheet_id("inputs"), Some(1));

    assert_eq!(
        engine.rename_sheet(1, "sheet1"),
        Err(EngineError::SheetNameTaken("sheet1".into()))
    );
    engine.rename_sheet(1, "INPUTS").unwrap();
    assert_eq!(engine.sheet_names(), vec!["Sheet1", "INPUTS"]);
    assert_eq!(
        engine.rename_sheet(5, "X"),
        Err(EngineError::NoSuchSheet("5".into()))
    );
}

#[test]
fn test_failed_batch_undoes_a_move() {
    let mut engine = engine(&[&["1", "=A1+1"]]);
    let result = engine.batch(|e| {
        e.move_cells(block("A1", "A1"), addr("C1"))?;
        e.set_cell_contents(addr_on(7, "A1"), "1")?;
        Ok(())
    });
    assert_eq!(result, Err(EngineError::NoSuchSheet("7".into())));
    assert_eq!(value(&engine, "A1"), num(1.0));
    assert_eq!(value(&engine, "C1"), CellValue::Empty);
    assert_eq!(formula(&engine, "B1").as_deref(), Some("=A1+1"));
}
