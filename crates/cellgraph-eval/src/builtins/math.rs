//! Numeric reductions: SUM, COUNT, MAX, MIN, AVERAGE, SUMIF, COUNTIF.

pub mod aggregate;
pub mod criteria_aggregates;

pub use aggregate::*;
pub use criteria_aggregates::*;

use crate::function_registry::FunctionRegistry;

pub fn register_builtins(registry: &FunctionRegistry) {
    aggregate::register_builtins(registry);
    criteria_aggregates::register_builtins(registry);
}
