pub mod datetime;
pub mod logical;
pub mod math;
pub mod matrix;
pub mod random;
pub mod reference_fns;
mod utils;

use crate::function_registry::FunctionRegistry;

pub fn load_builtins(registry: &FunctionRegistry) {
    datetime::register_builtins(registry);
    logical::register_builtins(registry);
    math::register_builtins(registry);
    matrix::register_builtins(registry);
    random::register_builtins(registry);
    reference_fns::register_builtins(registry);
}
