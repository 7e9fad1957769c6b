use std::cell::RefCell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cellgraph_common::{
    AbsoluteCellRange, CellError, CellValue, RawCellContent, SheetId, SimpleCellAddress,
};
use cellgraph_parse::{ParserWithCaching, absolutize, unparse};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rayon::ThreadPoolBuilder;
use rustc_hash::FxHashSet;

use super::address_mapping::{SheetStrategy, StrategyKind};
use super::builder::{GraphBuilder, matrix_size};
pub use super::builder::Sheet;
use super::distributed;
use super::vertex::{FormulaState, FormulaVertex, Matrix, MatrixValues, MatrixVertex};
use super::{DependencyGraph, EngineError, EvalConfig, ExportedChange, GraphError, Vertex, VertexId};
use crate::function::Function;
use crate::function_registry::FunctionRegistry;
use crate::interpreter::{Interpreter, InterpreterValue, SheetLimits};

/// Statistics of one recompute.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    pub computed_vertices: usize,
    pub cycle_errors: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct BatchState {
    structural: bool,
    writes: Vec<SimpleCellAddress>,
}

pub struct Engine {
    pub(super) graph: DependencyGraph,
    pub(super) parser: ParserWithCaching,
    pub(super) registry: Arc<FunctionRegistry>,
    pub(super) config: EvalConfig,
    rng: RefCell<SmallRng>,
    thread_pool: Option<Arc<rayon::ThreadPool>>,
    batch: Option<BatchState>,
    last_result: Option<EvalResult>,
}

impl Engine {
    /// An engine with no sheets.
    pub fn new(config: EvalConfig) -> Self {
        let registry = Arc::new(FunctionRegistry::with_builtins());
        let graph = DependencyGraph::default();
        Self::assemble(graph, registry, config)
    }

    fn assemble(graph: DependencyGraph, registry: Arc<FunctionRegistry>, config: EvalConfig) -> Self {
        let thread_pool = if config.enable_parallel {
            match ThreadPoolBuilder::new()
                .num_threads(config.number_of_workers.max(1))
                .build()
            {
                Ok(pool) => Some(Arc::new(pool)),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(error = %_e, "worker pool unavailable, evaluating sequentially");
                    None
                }
            }
        } else {
            None
        };
        Self {
            graph,
            parser: ParserWithCaching::new(registry.clone()),
            rng: RefCell::new(SmallRng::seed_from_u64(config.random_seed)),
            registry,
            config,
            thread_pool,
            batch: None,
            last_result: None,
        }
    }

    /// Build the graph for `sheets` and run a full evaluation.
    pub fn build_from_sheets(
        sheets: Vec<(String, Sheet)>,
        config: EvalConfig,
    ) -> Result<Self, EngineError> {
        Self::build_with_registry(sheets, config, Arc::new(FunctionRegistry::with_builtins()))
    }

    /// One sheet named `Sheet1`.
    pub fn build_from_array(sheet: Sheet, config: EvalConfig) -> Result<Self, EngineError> {
        Self::build_from_sheets(vec![("Sheet1".to_string(), sheet)], config)
    }

    /// Like [`Engine::build_from_sheets`] with a caller-provided registry.
    pub fn build_with_registry(
        sheets: Vec<(String, Sheet)>,
        config: EvalConfig,
        registry: Arc<FunctionRegistry>,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::assemble(DependencyGraph::default(), registry, config);
        engine.graph =
            GraphBuilder::new(&engine.config, &mut engine.parser, &engine.registry).build(sheets)?;
        engine.evaluate_all()?;
        Ok(engine)
    }

    /* ─────────────────────────── accessors ─────────────────────────── */

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Add or replace a function. Formulas already placed keep the flags
    /// they were parsed with.
    pub fn register_function(&self, f: Arc<dyn Function>) {
        self.registry.register(f);
    }

    pub fn parser_cache_hits(&self) -> usize {
        self.parser.cache_hits()
    }

    pub fn parser_cache_len(&self) -> usize {
        self.parser.cache_len()
    }

    pub fn last_eval_result(&self) -> Option<&EvalResult> {
        self.last_result.as_ref()
    }

    pub fn thread_pool(&self) -> Option<&Arc<rayon::ThreadPool>> {
        self.thread_pool.as_ref()
    }

    /* ─────────────────────────── sheets ─────────────────────────── */

    pub fn add_sheet(&mut self, name: &str) -> Result<SheetId, EngineError> {
        if self.graph.sheets().get_id(name).is_some() {
            return Err(EngineError::SheetNameTaken(name.to_string()));
        }
        let id = self.graph.sheets_mut().id_for(name);
        self.graph
            .addresses_mut()
            .add_sheet(id, SheetStrategy::new(StrategyKind::Sparse, 0, 0));
        Ok(id)
    }

    pub fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.graph.sheets().get_id(name)
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.graph.sheets().names().map(str::to_string).collect()
    }

    pub(super) fn ensure_sheet(&self, sheet: SheetId) -> Result<(), EngineError> {
        if self.graph.sheets().contains(sheet) {
            Ok(())
        } else {
            Err(EngineError::NoSuchSheet(sheet.to_string()))
        }
    }

    pub(super) fn size_limit(&self) -> EngineError {
        EngineError::SheetSizeLimit {
            rows: self.config.max_rows,
            columns: self.config.max_columns,
        }
    }

    /* ─────────────────────────── reading ─────────────────────────── */

    pub fn get_cell_value(&self, addr: SimpleCellAddress) -> CellValue {
        self.graph.cell_value(addr)
    }

    /// `=...` for formula cells, `{=...}` at the top-left cell of a matrix
    /// formula, `None` elsewhere.
    pub fn get_cell_formula(&self, addr: SimpleCellAddress) -> Option<String> {
        let id = self.graph.vertex_at(addr)?;
        match self.graph.vertex(id)? {
            Vertex::Formula(f) => Some(unparse(&f.ast, f.address, self.graph.sheets())),
            Vertex::Matrix(m) if m.start == addr => m
                .formula
                .as_ref()
                .map(|ast| format!("{{{}}}", unparse(ast, m.start, self.graph.sheets()))),
            _ => None,
        }
    }

    /// Computed values of `sheet`, up to its last non-empty cell.
    pub fn get_sheet_values(&self, sheet: SheetId) -> Result<Vec<Vec<CellValue>>, EngineError> {
        self.ensure_sheet(sheet)?;
        Ok(self.sheet_grid(sheet, |addr| self.graph.cell_value(addr)))
    }

    /// Raw contents of `sheet` that rebuild an equivalent sheet.
    pub fn get_sheet_serialized(&self, sheet: SheetId) -> Result<Sheet, EngineError> {
        self.ensure_sheet(sheet)?;
        Ok(self.sheet_grid(sheet, |addr| self.serialize_cell(addr)))
    }

    fn serialize_cell(&self, addr: SimpleCellAddress) -> String {
        if let Some(formula) = self.get_cell_formula(addr) {
            return formula;
        }
        let numeric_matrix = self
            .graph
            .vertex_at(addr)
            .and_then(|id| self.graph.vertex(id))
            .and_then(Vertex::as_matrix)
            .is_some_and(|m| !m.is_formula());
        match self.graph.vertex_at(addr).and_then(|id| self.graph.vertex(id)) {
            Some(Vertex::Value(v)) => v.to_string(),
            Some(Vertex::Matrix(m)) if numeric_matrix => m.value_at(addr).to_string(),
            _ => String::new(),
        }
    }

    fn sheet_grid<T: Default + Clone>(
        &self,
        sheet: SheetId,
        cell: impl Fn(SimpleCellAddress) -> T,
    ) -> Vec<Vec<T>> {
        let occupied: Vec<SimpleCellAddress> = self
            .graph
            .addresses()
            .entries(sheet)
            .into_iter()
            .filter(|(_, id)| !matches!(self.graph.vertex(*id), Some(Vertex::Empty) | None))
            .map(|(a, _)| a)
            .collect();
        let Some(width) = occupied.iter().map(|a| a.col + 1).max() else {
            return Vec::new();
        };
        let height = occupied.iter().map(|a| a.row + 1).max().unwrap_or(0);
        (0..height)
            .map(|row| {
                (0..width)
                    .map(|col| cell(SimpleCellAddress::new(sheet, col, row)))
                    .collect()
            })
            .collect()
    }

    /* ─────────────────────────── editing ─────────────────────────── */

    /// Write raw text into a cell and recompute what depends on it.
    pub fn set_cell_contents(
        &mut self,
        addr: SimpleCellAddress,
        raw: &str,
    ) -> Result<Vec<ExportedChange>, EngineError> {
        self.ensure_sheet(addr.sheet)?;
        if !self.config.limits().contains(&addr) {
            return Err(self.size_limit());
        }
        self.apply_contents(addr, RawCellContent::parse(raw))?;
        self.finish_edit(false, vec![addr])
    }

    pub(super) fn apply_contents(
        &mut self,
        addr: SimpleCellAddress,
        content: RawCellContent,
    ) -> Result<(), EngineError> {
        if let Some((span, id)) = self.graph.matrices().containing(&addr) {
            let Some(matrix) = self.graph.vertex_mut(id).and_then(Vertex::as_matrix_mut) else {
                return Err(GraphError::UnknownNode(id.to_string()).into());
            };
            if matrix.is_formula() {
                return Err(EngineError::MatrixEdit(addr));
            }
            if let (RawCellContent::Number(n), MatrixValues::Computed(m)) =
                (&content, &mut matrix.values)
            {
                m.set(addr.col - span.start.col, addr.row - span.start.row, *n);
                self.graph.mark_changed(id);
                return Ok(());
            }
            self.graph.dissolve_matrix(span)?;
        }

        match content {
            RawCellContent::Empty => self.graph.clear_cell(addr)?,
            RawCellContent::Formula(text) => {
                let entry = self.parser.parse(&text, addr, self.graph.sheets());
                let deps = absolutize(&entry.dependencies, addr);
                let vertex = FormulaVertex::new(
                    addr,
                    entry.ast,
                    entry.has_volatile_function,
                    entry.has_structural_change_function,
                );
                self.graph.set_cell_vertex(addr, Vertex::Formula(vertex), &deps)?;
            }
            RawCellContent::MatrixFormula(text) => self.place_matrix_formula(addr, &text)?,
            literal => {
                let value = literal.literal_value().unwrap_or_default();
                self.graph.set_cell_vertex(addr, Vertex::Value(value), &[])?;
            }
        }
        Ok(())
    }

    fn place_matrix_formula(&mut self, addr: SimpleCellAddress, text: &str) -> Result<(), EngineError> {
        let entry = self.parser.parse(text, addr, self.graph.sheets());
        let (width, height) = matrix_size(&self.registry, &entry.ast, addr);
        let span = AbsoluteCellRange::span_from(addr, width, height);
        if !self.config.limits().contains(&span.end) {
            return Err(self.size_limit());
        }
        let overlapping = self.graph.matrices().intersecting(&span);
        for (_, id) in &overlapping {
            if self
                .graph
                .vertex(*id)
                .and_then(Vertex::as_matrix)
                .is_some_and(MatrixVertex::is_formula)
            {
                return Err(EngineError::MatrixEdit(addr));
            }
        }
        for (other, _) in overlapping {
            self.graph.dissolve_matrix(other)?;
        }
        let deps = absolutize(&entry.dependencies, addr);
        let matrix = MatrixVertex::from_formula(addr, width, height, entry.ast);
        self.graph.add_matrix(matrix, &deps)?;
        Ok(())
    }

    /// Collapse the matrix formula covering `addr`. Its cells become empty
    /// and whatever read them now reads the plain cells.
    pub fn set_matrix_empty(
        &mut self,
        addr: SimpleCellAddress,
    ) -> Result<Vec<ExportedChange>, EngineError> {
        self.ensure_sheet(addr.sheet)?;
        let span = match self.graph.matrices().containing(&addr) {
            Some((span, id))
                if self
                    .graph
                    .vertex(id)
                    .and_then(Vertex::as_matrix)
                    .is_some_and(MatrixVertex::is_formula) =>
            {
                span
            }
            _ => return Err(EngineError::NotAMatrix(addr)),
        };
        self.graph.dissolve_matrix(span)?;
        self.finish_edit(false, span.addresses().collect())
    }

    /// Run `edits` as one unit: a single recompute at the end, and no
    /// change at all if any edit fails.
    ///
    /// A nested batch recomputes with the outer one. When it fails, only
    /// its own edits are undone and the outer batch may carry on.
    pub fn batch<F>(&mut self, edits: F) -> Result<Vec<ExportedChange>, EngineError>
    where
        F: FnOnce(&mut Engine) -> Result<(), EngineError>,
    {
        if let Some(state) = &self.batch {
            let (structural, written) = (state.structural, state.writes.len());
            let snapshot = self.graph.clone();
            if let Err(e) = edits(self) {
                self.graph = snapshot;
                if let Some(state) = &mut self.batch {
                    state.structural = structural;
                    state.writes.truncate(written);
                }
                return Err(e);
            }
            return Ok(Vec::new());
        }
        let snapshot = self.graph.clone();
        self.batch = Some(BatchState::default());
        let outcome = edits(self);
        let state = self.batch.take().unwrap_or_default();
        match outcome {
            Ok(()) => self.partial_run(state.structural, &state.writes),
            Err(e) => {
                self.graph = snapshot;
                Err(e)
            }
        }
    }

    pub fn is_batching(&self) -> bool {
        self.batch.is_some()
    }

    /// Recompute after an edit, or defer to the end of the open batch.
    pub(super) fn finish_edit(
        &mut self,
        structural: bool,
        writes: Vec<SimpleCellAddress>,
    ) -> Result<Vec<ExportedChange>, EngineError> {
        match &mut self.batch {
            Some(state) => {
                state.structural |= structural;
                state.writes.extend(writes);
                Ok(Vec::new())
            }
            None => self.partial_run(structural, &writes),
        }
    }

    /* ─────────────────────────── evaluation ─────────────────────────── */

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator {
            registry: &self.registry,
            rng: &self.rng,
            now: current_serial(),
            limits: self.config.limits(),
        }
    }

    /// Evaluate every vertex in dependency order.
    pub fn evaluate_all(&mut self) -> Result<EvalResult, EngineError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("evaluate_all", vertices = self.graph.vertex_count())
            .entered();
        let start = Instant::now();
        self.graph.take_changed();

        let now = current_serial();
        let distributed = match &self.thread_pool {
            Some(pool) => distributed::evaluate_distributed(
                &mut self.graph,
                &self.registry,
                &self.config,
                &self.rng,
                pool,
                now,
            )?,
            None => None,
        };
        let (computed_vertices, cycle_errors) = match distributed {
            Some(outcome) => outcome,
            None => {
                let order = self.graph.graph().topological_sort();
                let evaluator = Evaluator {
                    registry: &self.registry,
                    rng: &self.rng,
                    now,
                    limits: self.config.limits(),
                };
                let cycles = evaluator.mark_cycles(&mut self.graph, &order.cycled, None)?;
                let computed = evaluator.run(&mut self.graph, &order.sorted, None)?;
                (computed, cycles)
            }
        };

        let result = EvalResult {
            computed_vertices,
            cycle_errors,
            elapsed: start.elapsed(),
        };
        self.last_result = Some(result.clone());
        Ok(result)
    }

    /// Recompute everything downstream of the changed vertices, every
    /// volatile vertex and, after structural edits, every structure-sensitive
    /// vertex.
    pub(super) fn partial_run(
        &mut self,
        structural: bool,
        writes: &[SimpleCellAddress],
    ) -> Result<Vec<ExportedChange>, EngineError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("partial_run", structural).entered();
        let start = Instant::now();

        let mut seeds = self.graph.take_changed();
        seeds.extend(self.graph.volatile_vertices().iter().copied());
        if structural {
            seeds.extend(self.graph.structural_vertices().iter().copied());
        }
        let reach = self.graph.graph().reachable_from(seeds);
        let order = self.graph.graph().topological_sort_of(&reach);

        let mut changes = Vec::new();
        for &addr in writes {
            push_change(&mut changes, addr, self.graph.cell_value(addr));
        }
        let mut graph = std::mem::take(&mut self.graph);
        let evaluator = self.evaluator();
        let outcome = evaluator
            .mark_cycles(&mut graph, &order.cycled, Some(&mut changes))
            .and_then(|cycles| {
                evaluator
                    .run(&mut graph, &order.sorted, Some(&mut changes))
                    .map(|computed| (computed, cycles))
            });
        self.graph = graph;
        let (computed_vertices, cycle_errors) = outcome?;

        self.last_result = Some(EvalResult {
            computed_vertices,
            cycle_errors,
            elapsed: start.elapsed(),
        });
        Ok(changes)
    }
}

/// Serial date-time of this instant, fixed for one pass.
fn current_serial() -> f64 {
    #[cfg(feature = "system-clock")]
    {
        cellgraph_common::datetime_to_serial(&chrono::Local::now().naive_local())
    }
    #[cfg(not(feature = "system-clock"))]
    {
        0.0
    }
}

fn push_change(changes: &mut Vec<ExportedChange>, address: SimpleCellAddress, value: CellValue) {
    match changes.iter_mut().find(|c| c.address == address) {
        Some(existing) => existing.value = value,
        None => changes.push(ExportedChange { address, value }),
    }
}

/// What a vertex shows, cell by cell.
fn shown_cells(graph: &DependencyGraph, id: VertexId) -> Vec<(SimpleCellAddress, CellValue)> {
    match graph.vertex(id) {
        Some(Vertex::Formula(f)) => vec![(f.address, f.value())],
        Some(Vertex::Matrix(m)) => m.cells(),
        _ => Vec::new(),
    }
}

/// Evaluates vertices in a given order. Shared by the sequential runs and
/// the distributed workers.
pub(crate) struct Evaluator<'a> {
    pub(crate) registry: &'a FunctionRegistry,
    pub(crate) rng: &'a RefCell<SmallRng>,
    pub(crate) now: f64,
    pub(crate) limits: SheetLimits,
}

impl Evaluator<'_> {
    /// Evaluate `order` front to back. Returns how many formulas and
    /// matrix formulas were computed.
    pub(crate) fn run(
        &self,
        graph: &mut DependencyGraph,
        order: &[VertexId],
        mut changes: Option<&mut Vec<ExportedChange>>,
    ) -> Result<usize, GraphError> {
        let mut computed = 0;
        for &id in order {
            let before = changes.as_ref().map(|_| shown_cells(graph, id));
            if self.evaluate_vertex(graph, id)? {
                computed += 1;
            }
            if let (Some(changes), Some(before)) = (changes.as_deref_mut(), before) {
                record_changes(graph, id, before, changes);
            }
        }
        Ok(computed)
    }

    /// Give every cycled formula and matrix formula the cycle error.
    pub(crate) fn mark_cycles(
        &self,
        graph: &mut DependencyGraph,
        cycled: &[VertexId],
        mut changes: Option<&mut Vec<ExportedChange>>,
    ) -> Result<usize, GraphError> {
        let mut count = 0;
        for &id in cycled {
            let before = changes.as_ref().map(|_| shown_cells(graph, id));
            match graph.vertex_mut(id) {
                Some(Vertex::Formula(f)) => {
                    f.set_value(CellError::cycle().into());
                    count += 1;
                }
                Some(Vertex::Matrix(m)) if m.is_formula() => {
                    m.values = MatrixValues::Error(CellError::cycle());
                    count += 1;
                }
                Some(Vertex::Range(_)) => graph.clear_range_cache(id),
                Some(_) => {}
                None => return Err(GraphError::UnknownNode(id.to_string())),
            }
            if let (Some(changes), Some(before)) = (changes.as_deref_mut(), before) {
                record_changes(graph, id, before, changes);
            }
        }
        Ok(count)
    }

    /// Returns whether a formula was computed.
    pub(crate) fn evaluate_vertex(
        &self,
        graph: &mut DependencyGraph,
        id: VertexId,
    ) -> Result<bool, GraphError> {
        match graph.fetch(id)? {
            Vertex::Formula(f) => {
                if f.state == FormulaState::Evaluating {
                    return Err(GraphError::Reentrant(id.to_string()));
                }
                let (address, ast) = (f.address, Arc::clone(&f.ast));
                if let Some(f) = graph.vertex_mut(id).and_then(Vertex::as_formula_mut) {
                    f.state = FormulaState::Evaluating;
                }
                let value = self.interpreter(graph).at(address).evaluate_scalar(&ast);
                if let Some(f) = graph.vertex_mut(id).and_then(Vertex::as_formula_mut) {
                    f.set_value(value);
                }
                Ok(true)
            }
            Vertex::Matrix(m) => {
                let Some(ast) = m.formula.clone() else {
                    return Ok(false);
                };
                let (start, width, height) = (m.start, m.width, m.height);
                let values = {
                    let interp = self.interpreter(graph).at(start);
                    matrix_values(&interp, interp.evaluate(&ast), width, height)
                };
                if let Some(m) = graph.vertex_mut(id).and_then(Vertex::as_matrix_mut) {
                    m.values = values;
                }
                Ok(true)
            }
            Vertex::Range(_) => {
                graph.clear_range_cache(id);
                Ok(false)
            }
            Vertex::Value(_) | Vertex::Empty => Ok(false),
        }
    }

    fn interpreter<'g>(&'g self, graph: &'g DependencyGraph) -> Interpreter<'g> {
        Interpreter::new(graph, self.registry, self.rng, self.now, self.limits)
    }
}

fn record_changes(
    graph: &DependencyGraph,
    id: VertexId,
    before: Vec<(SimpleCellAddress, CellValue)>,
    changes: &mut Vec<ExportedChange>,
) {
    let after = shown_cells(graph, id);
    for (i, (addr, value)) in after.into_iter().enumerate() {
        if before.get(i).is_none_or(|(_, old)| *old != value) {
            push_change(changes, addr, value);
        }
    }
}

/// Fit an array result into a `width` x `height` numeric matrix.
fn matrix_values(
    interp: &Interpreter<'_>,
    value: InterpreterValue,
    width: u32,
    height: u32,
) -> MatrixValues {
    let rows = match interp.rows_of(value) {
        Ok(rows) => rows,
        Err(e) => return MatrixValues::Error(e),
    };
    let fits = rows.len() == height as usize && rows.iter().all(|r| r.len() == width as usize);
    if !fits {
        return MatrixValues::Error(
            CellError::value().with_message("Array result does not fit the matrix"),
        );
    }
    let mut data = Vec::with_capacity(width as usize * height as usize);
    for v in rows.iter().flatten() {
        match v {
            CellValue::Number(n) => data.push(*n),
            CellValue::Error(e) => return MatrixValues::Error(e.clone()),
            _ => {
                return MatrixValues::Error(
                    CellError::value().with_message("Matrix cells must be numbers"),
                );
            }
        }
    }
    MatrixValues::Computed(Matrix::new(width, height, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(rows: &[&[&str]]) -> Sheet {
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn a(col: u32, row: u32) -> SimpleCellAddress {
        SimpleCellAddress::new(0, col, row)
    }

    #[test]
    fn reentering_a_vertex_is_an_invariant_violation() {
        let mut engine = Engine::build_from_array(sheet(&[&["1", "=A1"]]), EvalConfig::default())
            .unwrap();
        let id = engine.graph.vertex_at(a(1, 0)).unwrap();
        if let Some(f) = engine.graph.vertex_mut(id).and_then(Vertex::as_formula_mut) {
            f.state = FormulaState::Evaluating;
        }
        let mut graph = std::mem::take(&mut engine.graph);
        let err = engine.evaluator().evaluate_vertex(&mut graph, id).unwrap_err();
        assert_eq!(err, GraphError::Reentrant(id.to_string()));
    }

    #[test]
    fn matrix_results_must_fit_and_be_numeric() {
        let engine = Engine::new(EvalConfig::default());
        let evaluator = engine.evaluator();
        let graph = DependencyGraph::default();
        let interp = evaluator.interpreter(&graph);
        let two = InterpreterValue::Matrix(vec![vec![1.0.into(), 2.0.into()]]);
        assert_eq!(
            matrix_values(&interp, two.clone(), 2, 1),
            MatrixValues::Computed(Matrix::new(2, 1, vec![1.0, 2.0]))
        );
        assert!(matches!(matrix_values(&interp, two, 1, 2), MatrixValues::Error(_)));
        let text = InterpreterValue::Matrix(vec![vec!["x".into()]]);
        assert!(matches!(matrix_values(&interp, text, 1, 1), MatrixValues::Error(_)));
        assert_eq!(
            matrix_values(&interp, CellValue::Number(4.0).into(), 1, 1),
            MatrixValues::Computed(Matrix::new(1, 1, vec![4.0]))
        );
    }

    #[test]
    fn changes_are_reported_once_per_address() {
        let mut changes = Vec::new();
        push_change(&mut changes, a(0, 0), 1.0.into());
        push_change(&mut changes, a(0, 0), 2.0.into());
        assert_eq!(
            changes,
            vec![ExportedChange {
                address: a(0, 0),
                value: 2.0.into()
            }]
        );
    }
}
