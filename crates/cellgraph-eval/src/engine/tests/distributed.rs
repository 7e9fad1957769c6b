//! Worker-pool evaluation must agree with the sequential evaluator.
use std::cell::RefCell;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::common::*;
use crate::engine::EvalConfig;
use crate::engine::distributed::evaluate_distributed;

fn parallel() -> EvalConfig {
    EvalConfig::default().with_parallel(true, 2)
}

const CHAINS: &[&[&str]] = &[
    &["1", "=A1+1", "=B1+1"],
    &["10", "=A2*2", "=B2*2"],
];

#[test]
fn test_independent_chains_match_sequential() {
    let sequential = engine(CHAINS);
    let distributed = engine_with(CHAINS, parallel());
    assert!(distributed.thread_pool().is_some());
    for cell in ["A1", "B1", "C1", "A2", "B2", "C2"] {
        assert_eq!(value(&distributed, cell), value(&sequential, cell), "{cell}");
    }
    assert_eq!(value(&distributed, "C2"), num(40.0));
    assert_eq!(
        distributed.last_eval_result().unwrap().computed_vertices,
        sequential.last_eval_result().unwrap().computed_vertices
    );
}

#[test]
fn test_clean_partition_runs_on_workers() {
    let mut engine = engine_with(CHAINS, parallel());
    let pool = engine.thread_pool().cloned().unwrap();
    let registry = engine.registry.clone();
    let config = engine.config.clone();
    let rng = RefCell::new(SmallRng::seed_from_u64(config.random_seed));
    let outcome = evaluate_distributed(&mut engine.graph, &registry, &config, &rng, &pool, 0.0).unwrap();
    assert_eq!(outcome, Some((4, 0)));
    assert_eq!(value(&engine, "C1"), num(3.0));
}

#[test]
fn test_joined_chains_fall_back() {
    let mut engine = engine_with(&[&["1", "2", "=A1+B1"]], parallel());
    assert_eq!(value(&engine, "C1"), num(3.0));

    let pool = engine.thread_pool().cloned().unwrap();
    let registry = engine.registry.clone();
    let config = engine.config.clone();
    let rng = RefCell::new(SmallRng::seed_from_u64(config.random_seed));
    let outcome = evaluate_distributed(&mut engine.graph, &registry, &config, &rng, &pool, 0.0).unwrap();
    assert_eq!(outcome, None);
}

#[test]
fn test_structure_sensitive_formulas_fall_back() {
    let mut engine = engine_with(&[&["1", "=OFFSET(A1,0,0)"]], parallel());
    assert_eq!(value(&engine, "B1"), num(1.0));
    let pool = engine.thread_pool().cloned().unwrap();
    let registry = engine.registry.clone();
    let config = engine.config.clone();
    let rng = RefCell::new(SmallRng::seed_from_u64(config.random_seed));
    let outcome = evaluate_distributed(&mut engine.graph, &registry, &config, &rng, &pool, 0.0).unwrap();
    assert_eq!(outcome, None);
}

#[test]
fn test_cycles_are_marked_by_the_host() {
    let engine = engine_with(&[&["=B1", "=A1"], &["5", "=A2+1"]], parallel());
    assert_eq!(
        value(&engine, "A1"),
        err(cellgraph_common::ErrorKind::Cycle)
    );
    assert_eq!(value(&engine, "B2"), num(6.0));
}

#[test]
fn test_edits_after_a_parallel_build_are_incremental() {
    let mut engine = engine_with(CHAINS, parallel());
    set(&mut engine, "A1", "5");
    assert_eq!(value(&engine, "C1"), num(7.0));
    assert_eq!(engine.last_eval_result().unwrap().computed_vertices, 2);
}

#[test]
fn test_worker_seeds_come_from_the_engine_generator() {
    let mut engine = engine_with(&[&["=RAND()"], &["=RAND()"]], parallel());
    let first = (value(&engine, "A1"), value(&engine, "A2"));
    assert_ne!(first.0, first.1);

    engine.evaluate_all().unwrap();
    let second = (value(&engine, "A1"), value(&engine, "A2"));
    assert_ne!(first, second, "each run draws fresh seeds");

    let pool = engine.thread_pool().cloned().unwrap();
    let registry = engine.registry.clone();
    let config = engine.config.clone();
    let rng = RefCell::new(SmallRng::seed_from_u64(config.random_seed));
    let outcome = evaluate_distributed(&mut engine.graph, &registry, &config, &rng, &pool, 0.0).unwrap();
    assert_eq!(outcome, Some((2, 0)));
    let untouched = SmallRng::seed_from_u64(config.random_seed).r#gen::<u64>();
    assert_ne!(rng.borrow_mut().r#gen::<u64>(), untouched);
}
