use super::common::*;

#[test]
fn test_relative_copies_share_an_ast() {
    let engine = engine(&[&["1", "=A1+1"], &["2", "=A2+1"], &["3", "=A3+1"]]);
    assert_eq!(engine.parser_cache_len(), 1);
    assert_eq!(engine.parser_cache_hits(), 2);
    assert_eq!(value(&engine, "B3"), num(4.0));
}

#[test]
fn test_absolute_references_break_sharing() {
    let engine = engine(&[&["1", "=$A$1+1"], &["2", "=$A$1+1"], &["3", "=A3+1"]]);
    assert_eq!(engine.parser_cache_len(), 2);
    assert_eq!(value(&engine, "B2"), num(2.0));
}

#[test]
fn test_edits_reuse_the_cache() {
    let mut engine = engine(&[&["1", "=A1*2"]]);
    set(&mut engine, "B2", "=A2*2");
    assert_eq!(engine.parser_cache_len(), 1);
    assert_eq!(engine.parser_cache_hits(), 1);
    assert_eq!(engine.get_cell_formula(addr("B2")).as_deref(), Some("=A2*2"));
}
