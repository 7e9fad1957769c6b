//! Date and time functions: TODAY, NOW.
//!
//! Both read the serial fixed by the engine at the start of a pass, so every
//! cell evaluated in one pass sees the same instant.

mod today_now;

pub use today_now::*;

use crate::function_registry::FunctionRegistry;

pub fn register_builtins(registry: &FunctionRegistry) {
    today_now::register_builtins(registry);
}
