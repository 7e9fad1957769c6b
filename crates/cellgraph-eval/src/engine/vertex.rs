use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use cellgraph_common::{AbsoluteCellRange, CellError, CellValue, SimpleCellAddress};
use cellgraph_parse::ASTNode;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::criteria::Criterion;

/// Engine-internal vertex identity: an index into the vertex arena.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct VertexId(pub(crate) u32);

impl VertexId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Evaluation state of a formula vertex within one pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FormulaState {
    Unevaluated,
    /// Transient; seeing it again in the same pass is a graph bug.
    Evaluating,
    Evaluated,
    Error,
    Cycle,
}

#[derive(Debug, Clone)]
pub struct FormulaVertex {
    pub address: SimpleCellAddress,
    pub ast: Arc<ASTNode>,
    pub value: Option<CellValue>,
    pub state: FormulaState,
    pub is_volatile: bool,
    pub is_dependent_on_structure_change: bool,
}

impl FormulaVertex {
    pub fn new(
        address: SimpleCellAddress,
        ast: Arc<ASTNode>,
        is_volatile: bool,
        is_dependent_on_structure_change: bool,
    ) -> Self {
        Self {
            address,
            ast,
            value: None,
            state: FormulaState::Unevaluated,
            is_volatile,
            is_dependent_on_structure_change,
        }
    }

    pub fn value(&self) -> CellValue {
        self.value.clone().unwrap_or_default()
    }

    pub fn set_value(&mut self, value: CellValue) {
        self.state = match &value {
            CellValue::Error(e) if e.kind == cellgraph_common::ErrorKind::Cycle => {
                FormulaState::Cycle
            }
            CellValue::Error(_) => FormulaState::Error,
            _ => FormulaState::Evaluated,
        };
        self.value = Some(value);
    }
}

/// Memoised aggregates over one range.
#[derive(Debug, Clone, Default)]
pub struct RangeCache {
    /// reducer name -> value
    pub function_cache: FxHashMap<&'static str, CellValue>,
    /// `"SUMIF,<condition range>"` -> criterion text -> (value, predicate)
    pub criterion_cache: FxHashMap<String, FxHashMap<String, (CellValue, Criterion)>>,
    /// Ranges whose criterion caches were computed from this range's cells.
    pub dependent_cache_ranges: FxHashSet<VertexId>,
}

#[derive(Debug, Clone)]
pub struct RangeVertex {
    pub range: AbsoluteCellRange,
    pub cache: RefCell<RangeCache>,
}

impl RangeVertex {
    pub fn new(range: AbsoluteCellRange) -> Self {
        Self {
            range,
            cache: RefCell::new(RangeCache::default()),
        }
    }

    pub fn cached(&self, name: &str) -> Option<CellValue> {
        self.cache.borrow().function_cache.get(name).cloned()
    }

    pub fn set_cached(&self, name: &'static str, value: CellValue) {
        self.cache.borrow_mut().function_cache.insert(name, value);
    }

    pub fn criterion_cached(&self, key: &str, criterion: &str) -> Option<CellValue> {
        self.cache
            .borrow()
            .criterion_cache
            .get(key)
            .and_then(|m| m.get(criterion))
            .map(|(v, _)| v.clone())
    }

    pub fn set_criterion_cached(
        &self,
        key: String,
        criterion_text: String,
        value: CellValue,
        criterion: Criterion,
    ) {
        self.cache
            .borrow_mut()
            .criterion_cache
            .entry(key)
            .or_default()
            .insert(criterion_text, (value, criterion));
    }

    pub fn add_dependent_cache_range(&self, id: VertexId) {
        self.cache.borrow_mut().dependent_cache_ranges.insert(id);
    }

    /// Clear every memo. Returns the ranges whose criterion caches depended
    /// on this range and must be cleared too.
    pub fn clear_cache(&self) -> Vec<VertexId> {
        let mut cache = self.cache.borrow_mut();
        cache.function_cache.clear();
        cache.criterion_cache.clear();
        cache.dependent_cache_ranges.drain().collect()
    }

    pub fn clear_criterion_cache(&self) {
        self.cache.borrow_mut().criterion_cache.clear();
    }
}

/// Dense row-major numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f64>,
}

impl Matrix {
    pub fn new(width: u32, height: u32, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn get(&self, col: u32, row: u32) -> Option<f64> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.data
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }

    pub fn set(&mut self, col: u32, row: u32, value: f64) -> bool {
        if col >= self.width || row >= self.height {
            return false;
        }
        let idx = row as usize * self.width as usize + col as usize;
        match self.data.get_mut(idx) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatrixValues {
    NotComputed,
    Computed(Matrix),
    Error(CellError),
}

/// A rectangular array result addressed as one unit.
#[derive(Debug, Clone)]
pub struct MatrixVertex {
    pub start: SimpleCellAddress,
    pub width: u32,
    pub height: u32,
    /// `None` for numeric matrices detected from plain values.
    pub formula: Option<Arc<ASTNode>>,
    pub values: MatrixValues,
}

impl MatrixVertex {
    pub fn numeric(start: SimpleCellAddress, matrix: Matrix) -> Self {
        Self {
            start,
            width: matrix.width,
            height: matrix.height,
            formula: None,
            values: MatrixValues::Computed(matrix),
        }
    }

    pub fn from_formula(
        start: SimpleCellAddress,
        width: u32,
        height: u32,
        formula: Arc<ASTNode>,
    ) -> Self {
        Self {
            start,
            width,
            height,
            formula: Some(formula),
            values: MatrixValues::NotComputed,
        }
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    pub fn span(&self) -> AbsoluteCellRange {
        AbsoluteCellRange::span_from(self.start, self.width, self.height)
    }

    /// Value of the cell at `address`, which must lie inside the span.
    pub fn value_at(&self, address: SimpleCellAddress) -> CellValue {
        let (col, row) = (
            address.col.wrapping_sub(self.start.col),
            address.row.wrapping_sub(self.start.row),
        );
        match &self.values {
            MatrixValues::NotComputed => CellValue::Empty,
            MatrixValues::Error(e) => CellValue::Error(e.clone()),
            MatrixValues::Computed(m) => m.get(col, row).map_or(CellValue::Empty, CellValue::Number),
        }
    }

    /// All cells of the span with their values, row-major.
    pub fn cells(&self) -> Vec<(SimpleCellAddress, CellValue)> {
        self.span()
            .addresses()
            .map(|a| (a, self.value_at(a)))
            .collect()
    }
}

/// Closed set of graph nodes. A vertex never changes variant; edits replace
/// the vertex instead.
#[derive(Debug, Clone)]
pub enum Vertex {
    Value(CellValue),
    /// Placeholder for an address something depends on but nothing is written at.
    Empty,
    Formula(FormulaVertex),
    Range(RangeVertex),
    Matrix(MatrixVertex),
}

impl Vertex {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Vertex::Value(_) => "value",
            Vertex::Empty => "empty",
            Vertex::Formula(_) => "formula",
            Vertex::Range(_) => "range",
            Vertex::Matrix(_) => "matrix",
        }
    }

    pub fn as_formula(&self) -> Option<&FormulaVertex> {
        match self {
            Vertex::Formula(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_formula_mut(&mut self) -> Option<&mut FormulaVertex> {
        match self {
            Vertex::Formula(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<&RangeVertex> {
        match self {
            Vertex::Range(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&MatrixVertex> {
        match self {
            Vertex::Matrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_matrix_mut(&mut self) -> Option<&mut MatrixVertex> {
        match self {
            Vertex::Matrix(m) => Some(m),
            _ => None,
        }
    }

    /// The value this vertex shows at `address`.
    pub fn value_at(&self, address: SimpleCellAddress) -> CellValue {
        match self {
            Vertex::Value(v) => v.clone(),
            Vertex::Empty | Vertex::Range(_) => CellValue::Empty,
            Vertex::Formula(f) => f.value(),
            Vertex::Matrix(m) => m.value_at(address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_state_follows_value() {
        let mut f = FormulaVertex::new(
            SimpleCellAddress::new(0, 0, 0),
            Arc::new(ASTNode::Literal(CellValue::Number(1.0))),
            false,
            false,
        );
        assert_eq!(f.state, FormulaState::Unevaluated);
        assert_eq!(f.value(), CellValue::Empty);
        f.set_value(CellValue::Number(1.0));
        assert_eq!(f.state, FormulaState::Evaluated);
        f.set_value(CellError::cycle().into());
        assert_eq!(f.state, FormulaState::Cycle);
        f.set_value(CellError::value().into());
        assert_eq!(f.state, FormulaState::Error);
    }

    #[test]
    fn matrix_values_by_address() {
        let m = MatrixVertex::numeric(
            SimpleCellAddress::new(0, 1, 1),
            Matrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]),
        );
        assert_eq!(m.value_at(SimpleCellAddress::new(0, 2, 2)), CellValue::Number(4.0));
        assert_eq!(m.value_at(SimpleCellAddress::new(0, 2, 1)), CellValue::Number(2.0));
        assert_eq!(m.cells().len(), 4);
    }

    #[test]
    fn clearing_range_cache_hands_back_dependents() {
        let r = RangeVertex::new(AbsoluteCellRange::from_coordinates(0, 0, 0, 0, 3));
        r.set_cached("SUM", CellValue::Number(3.0));
        r.add_dependent_cache_range(VertexId::new(9));
        assert_eq!(r.cached("SUM"), Some(CellValue::Number(3.0)));
        assert_eq!(r.clear_cache(), vec![VertexId::new(9)]);
        assert_eq!(r.cached("SUM"), None);
    }
}
