//! End-to-end walkthroughs of the engine's core behaviours.
use super::common::*;
use cellgraph_common::{AbsoluteCellRange, CellValue, ErrorKind};

#[test]
fn test_formula_reads_a_literal() {
    let engine = engine(&[&["1", "=A1"]]);
    assert_eq!(value(&engine, "B1"), num(1.0));
}

#[test]
fn test_three_cell_cycle_is_reported_everywhere() {
    let engine = engine(&[&["=B1", "=C1", "=A1"]]);
    for cell in ["A1", "B1", "C1"] {
        assert_eq!(value(&engine, cell), err(ErrorKind::Cycle), "{cell}");
    }
    assert_eq!(engine.last_eval_result().unwrap().cycle_errors, 3);
}

#[test]
fn test_editing_a_summed_cell_recomputes_the_sum() {
    let mut engine = engine(&[&["1", "0"], &["2", "0"], &["3", "=SUM(A1:A3)"]]);
    assert_eq!(value(&engine, "B3"), num(6.0));

    let changes = engine.set_cell_contents(addr("A1"), "3").unwrap();
    assert_eq!(value(&engine, "B3"), num(8.0));
    assert!(
        changes
            .iter()
            .any(|c| c.address == addr("B3") && c.value == num(8.0))
    );
    // only the sum itself was a formula to recompute
    assert_eq!(engine.last_eval_result().unwrap().computed_vertices, 1);
}

#[test]
fn test_collapsing_a_matrix_frees_its_cells() {
    let mut engine = engine(&[&["1", "2"], &["{=TRANSPOSE(A1:B1)}", "=A3+1"]]);
    assert_eq!(value(&engine, "A2"), num(1.0));
    assert_eq!(value(&engine, "A3"), num(2.0));
    assert_eq!(value(&engine, "B2"), num(3.0));

    engine.set_matrix_empty(addr("A3")).unwrap();
    assert_eq!(value(&engine, "A2"), CellValue::Empty);
    assert_eq!(value(&engine, "A3"), CellValue::Empty);
    assert_eq!(value(&engine, "B2"), num(1.0));
    assert!(engine.graph().matrices().is_empty());

    // B2 now reads the plain cell
    set(&mut engine, "A3", "5");
    assert_eq!(value(&engine, "B2"), num(6.0));
}

#[test]
fn test_inserting_a_row_grows_the_summed_range() {
    let mut engine = engine(&[&["1", "=SUM(A1:A3)"], &["2"], &["3"]]);
    let before = AbsoluteCellRange::from_coordinates(0, 0, 0, 0, 2);
    assert!(engine.graph().ranges().get(&before).is_some());

    engine.add_rows(0, 1, 1).unwrap();

    let after = AbsoluteCellRange::from_coordinates(0, 0, 0, 0, 3);
    assert!(engine.graph().ranges().get(&before).is_none());
    assert!(engine.graph().ranges().get(&after).is_some());
    assert_eq!(engine.get_cell_formula(addr("B1")).as_deref(), Some("=SUM(A1:A4)"));
    assert_eq!(value(&engine, "B1"), num(6.0));

    set(&mut engine, "A2", "4");
    assert_eq!(value(&engine, "B1"), num(10.0));
}

#[test]
fn test_full_runs_repeat_their_values() {
    let mut engine = engine(&[
        &["1", "=A1*2", "=SUM(A1:B1)"],
        &["=C1+B1", "=IF(A1>0,\"up\",\"down\")", "=B3"],
        &["{=TRANSPOSE(A1:B1)}", "=C2+1", "=B3"],
    ]);
    let first = engine.get_sheet_values(0).unwrap();
    let result = engine.evaluate_all().unwrap();
    assert_eq!(engine.get_sheet_values(0).unwrap(), first);
    engine.evaluate_all().unwrap();
    assert_eq!(engine.get_sheet_values(0).unwrap(), first);
    assert_eq!(engine.last_eval_result().unwrap().computed_vertices, result.computed_vertices);
    assert_eq!(value(&engine, "C2"), err(ErrorKind::Cycle));
}
