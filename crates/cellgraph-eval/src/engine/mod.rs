//! Dependency-graph engine
//!
//! Builds a graph of cells, ranges and matrices from sheet grids and keeps
//! it up to date under edits with incremental recalculation.

pub mod address_mapping;
pub mod builder;
pub mod contents;
pub mod dependency_graph;
pub mod distributed;
pub mod eval;
pub mod graph;
pub mod matrix_detection;
pub mod matrix_mapping;
pub mod range_mapping;
pub mod sheet_mapping;
pub mod structure;
pub mod vertex;

#[cfg(test)]
mod tests;

use std::fmt;

use cellgraph_common::{CellValue, SimpleCellAddress};

pub use address_mapping::{AddressMapping, AddressMappingPolicy, StrategyKind};
pub use dependency_graph::DependencyGraph;
pub use eval::{Engine, EvalResult, Sheet};
pub use graph::{Graph, GraphError, TopSort};
pub use matrix_mapping::MatrixMapping;
pub use range_mapping::RangeMapping;
pub use sheet_mapping::SheetMapping;
pub use vertex::{
    FormulaState, FormulaVertex, Matrix, MatrixValues, MatrixVertex, RangeVertex, Vertex,
    VertexId,
};

use crate::interpreter::SheetLimits;

/// Configuration for the evaluation engine
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Backend choice per sheet from its fill ratio.
    pub address_mapping_policy: AddressMappingPolicy,
    /// Collapse rectangular blocks of numbers into numeric matrices at build time.
    pub matrix_detection: bool,
    /// Smallest block (in cells) turned into a matrix. At least 1.
    pub matrix_detection_threshold: usize,
    /// Run full evaluations on a worker pool when the graph partitions cleanly.
    pub enable_parallel: bool,
    pub number_of_workers: usize,
    pub max_rows: u32,
    pub max_columns: u32,
    /// Seed for `RAND()` and friends.
    pub random_seed: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            address_mapping_policy: AddressMappingPolicy::default(),
            matrix_detection: false,
            matrix_detection_threshold: 100,
            enable_parallel: false,
            number_of_workers: 3,
            max_rows: 1_048_576,
            max_columns: 16_384,
            random_seed: 0,
        }
    }
}

impl EvalConfig {
    pub fn with_address_mapping_policy(mut self, policy: AddressMappingPolicy) -> Self {
        self.address_mapping_policy = policy;
        self
    }

    pub fn with_matrix_detection(mut self, enabled: bool, threshold: usize) -> Self {
        self.matrix_detection = enabled;
        self.matrix_detection_threshold = threshold.max(1);
        self
    }

    pub fn with_parallel(mut self, enabled: bool, workers: usize) -> Self {
        self.enable_parallel = enabled;
        self.number_of_workers = workers.max(1);
        self
    }

    pub fn with_limits(mut self, max_rows: u32, max_columns: u32) -> Self {
        self.max_rows = max_rows;
        self.max_columns = max_columns;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn limits(&self) -> SheetLimits {
        SheetLimits {
            max_rows: self.max_rows,
            max_columns: self.max_columns,
        }
    }
}

/// API misuse reported by the engine. Cell-level problems are values, not
/// errors, and never show up here.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    NoSuchSheet(String),
    SheetNameTaken(String),
    InvalidArguments(String),
    /// Writing into, or cutting through, part of a matrix.
    MatrixEdit(SimpleCellAddress),
    SheetSizeLimit { rows: u32, columns: u32 },
    NotAMatrix(SimpleCellAddress),
    Graph(GraphError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NoSuchSheet(s) => write!(f, "no sheet named or numbered {s}"),
            EngineError::SheetNameTaken(s) => write!(f, "sheet name {s} is already in use"),
            EngineError::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
            EngineError::MatrixEdit(addr) => write!(f, "{addr} is part of a matrix"),
            EngineError::SheetSizeLimit { rows, columns } => {
                write!(f, "sheet would exceed {rows} rows or {columns} columns")
            }
            EngineError::NotAMatrix(addr) => write!(f, "no matrix formula at {addr}"),
            EngineError::Graph(e) => write!(f, "graph invariant violated: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Graph(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        EngineError::Graph(e)
    }
}

/// One cell whose shown value changed during a recompute.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedChange {
    pub address: SimpleCellAddress,
    pub value: CellValue,
}
