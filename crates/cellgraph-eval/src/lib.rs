pub mod criteria;
pub mod function;
pub mod function_registry;
pub mod interpreter;

pub mod builtins;

pub use cellgraph_common::{CellValue, SheetId, SimpleCellAddress};

#[cfg(test)]
pub mod test_workbook;

pub mod engine;
pub mod telemetry;

pub use engine::{Engine, EngineError, EvalConfig, EvalResult, ExportedChange, Sheet};
pub use function_registry::FunctionRegistry;
