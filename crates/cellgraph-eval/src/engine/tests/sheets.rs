use super::common::*;
use crate::engine::{Engine, EngineError, EvalConfig};

fn two_sheets() -> Engine {
    Engine::build_from_sheets(
        vec![
            ("Sheet1".into(), sheet(&[&["2"]])),
            ("Data".into(), sheet(&[&["=Sheet1!A1*3"]])),
        ],
        EvalConfig::default(),
    )
    .unwrap()
}

#[test]
fn test_cross_sheet_reference() {
    let mut engine = two_sheets();
    assert_eq!(engine.get_cell_value(addr_on(1, "A1")), num(6.0));
    set(&mut engine, "A1", "5");
    assert_eq!(engine.get_cell_value(addr_on(1, "A1")), num(15.0));
    assert_eq!(
        engine.get_cell_formula(addr_on(1, "A1")).as_deref(),
        Some("=Sheet1!A1*3")
    );
}

#[test]
fn test_sheet_lookup_ignores_case() {
    let engine = two_sheets();
    assert_eq!(engine.sheet_id("data"), Some(1));
    assert_eq!(engine.sheet_id("SHEET1"), Some(0));
    assert_eq!(engine.sheet_id("Other"), None);
    assert_eq!(engine.sheet_names(), vec!["Sheet1", "Data"]);
}

#[test]
fn test_add_sheet() {
    let mut engine = two_sheets();
    assert_eq!(
        engine.add_sheet("sheet1"),
        Err(EngineError::SheetNameTaken("sheet1".into()))
    );
    let id = engine.add_sheet("New").unwrap();
    assert_eq!(id, 2);
    assert_eq!(engine.sheet_names(), vec!["Sheet1", "Data", "New"]);

    engine.set_cell_contents(addr_on(id, "C3"), "7").unwrap();
    set(&mut engine, "B1", "=New!C3+A1");
    assert_eq!(value(&engine, "B1"), num(9.0));
}

#[test]
fn test_unknown_sheet_reference_is_ref_error() {
    let engine = engine(&[&["=Missing!A1"]]);
    assert_eq!(value(&engine, "A1"), err(cellgraph_common::ErrorKind::Ref));
}

#[test]
fn test_edit_on_unknown_sheet() {
    let mut engine = two_sheets();
    assert_eq!(
        engine.set_cell_contents(addr_on(7, "A1"), "1"),
        Err(EngineError::NoSuchSheet("7".into()))
    );
}
