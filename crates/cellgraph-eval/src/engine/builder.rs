//! Builds a dependency graph from sheet grids.
//!
//! Cells are placed first without edges, range vertices are created
//! smallest-first so that taller ranges can be wired from shorter ones, and
//! only then are formula dependencies connected.

use std::sync::Arc;

use cellgraph_common::{AbsoluteCellRange, RawCellContent, SheetId, SimpleCellAddress};
use cellgraph_parse::{ASTNode, CellDependency, ParserWithCaching, absolutize};
use rustc_hash::{FxHashMap, FxHashSet};

use super::address_mapping::SheetStrategy;
use super::matrix_detection::detect_matrices;
use super::vertex::{FormulaVertex, MatrixVertex, Vertex, VertexId};
use super::{DependencyGraph, EngineError, EvalConfig, SheetMapping};
use crate::function_registry::FunctionRegistry;

/// Raw cell texts, row-major.
pub type Sheet = Vec<Vec<String>>;

/// `(width, height)` of the span a matrix formula occupies. Functions that
/// cannot tell ahead of evaluation get a single cell.
pub(crate) fn matrix_size(
    registry: &FunctionRegistry,
    ast: &ASTNode,
    address: SimpleCellAddress,
) -> (u32, u32) {
    match ast {
        ASTNode::Function { name, args } => registry
            .get(name)
            .and_then(|f| f.matrix_size(args, address))
            .filter(|&(w, h)| w > 0 && h > 0)
            .unwrap_or((1, 1)),
        _ => (1, 1),
    }
}

pub struct GraphBuilder<'a> {
    config: &'a EvalConfig,
    parser: &'a mut ParserWithCaching,
    registry: &'a FunctionRegistry,
    /// Formula and matrix vertices waiting for their edges.
    pending: Vec<(VertexId, Vec<CellDependency>)>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        config: &'a EvalConfig,
        parser: &'a mut ParserWithCaching,
        registry: &'a FunctionRegistry,
    ) -> Self {
        Self {
            config,
            parser,
            registry,
            pending: Vec::new(),
        }
    }

    pub fn build(mut self, sheets: Vec<(String, Sheet)>) -> Result<DependencyGraph, EngineError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("build_graph", sheets = sheets.len()).entered();

        let mut mapping = SheetMapping::new();
        for (name, _) in &sheets {
            if mapping.get_id(name).is_some() {
                return Err(EngineError::SheetNameTaken(name.clone()));
            }
            mapping.id_for(name);
        }
        let mut graph = DependencyGraph::new(mapping);

        let mut contents = Vec::with_capacity(sheets.len());
        for (sheet_id, (name, grid)) in sheets.into_iter().enumerate() {
            let sheet_id = sheet_id as SheetId;
            self.check_size(&grid)?;
            let strategy = self.strategy_for(&grid);
            #[cfg(feature = "tracing")]
            tracing::debug!(sheet = %name, kind = ?strategy.kind(), "address mapping strategy");
            graph.addresses_mut().add_sheet(sheet_id, strategy);
            contents.push(classify(sheet_id, &grid));
        }

        let mut matrix_formulas = Vec::new();
        for (sheet_id, cells) in contents.iter().enumerate() {
            matrix_formulas.extend(self.place_cells(&mut graph, sheet_id as SheetId, cells)?);
        }
        for (addr, text) in matrix_formulas {
            self.place_matrix_formula(&mut graph, addr, &text)?;
        }

        self.create_ranges(&mut graph)?;
        for (id, deps) in std::mem::take(&mut self.pending) {
            if graph.vertex(id).is_some() {
                graph.add_dependencies(id, &deps)?;
            }
        }
        graph.take_changed();
        Ok(graph)
    }

    fn check_size(&self, grid: &Sheet) -> Result<(), EngineError> {
        let too_tall = grid.len() > self.config.max_rows as usize;
        let too_wide = grid.iter().any(|row| row.len() > self.config.max_columns as usize);
        if too_tall || too_wide {
            return Err(EngineError::SheetSizeLimit {
                rows: self.config.max_rows,
                columns: self.config.max_columns,
            });
        }
        Ok(())
    }

    fn strategy_for(&self, grid: &Sheet) -> SheetStrategy {
        let height = grid.len() as u32;
        let width = grid.iter().map(Vec::len).max().unwrap_or(0) as u32;
        let filled = grid
            .iter()
            .flatten()
            .filter(|raw| !raw.trim().is_empty())
            .count();
        let area = width as usize * height as usize;
        let fill = if area == 0 { 0.0 } else { filled as f64 / area as f64 };
        let kind = self.config.address_mapping_policy.choose(fill);
        SheetStrategy::new(kind, width, height)
    }

    /// Place values, numeric matrices and plain formulas. Matrix formulas
    /// are handed back so they can be placed over the plain cells.
    fn place_cells(
        &mut self,
        graph: &mut DependencyGraph,
        sheet: SheetId,
        cells: &[(SimpleCellAddress, RawCellContent)],
    ) -> Result<Vec<(SimpleCellAddress, String)>, EngineError> {
        let mut covered: FxHashSet<SimpleCellAddress> = FxHashSet::default();
        if self.config.matrix_detection {
            let numbers: FxHashMap<(u32, u32), f64> = cells
                .iter()
                .filter_map(|(addr, content)| match content {
                    RawCellContent::Number(n) => Some(((addr.col, addr.row), *n)),
                    _ => None,
                })
                .collect();
            let found = detect_matrices(sheet, &numbers, self.config.matrix_detection_threshold);
            #[cfg(feature = "tracing")]
            tracing::debug!(sheet, matrices = found.len(), "numeric matrices detected");
            for m in found {
                covered.extend(m.cells());
                graph.add_matrix(MatrixVertex::numeric(m.start, m.matrix), &[])?;
            }
        }

        let mut matrix_formulas = Vec::new();
        for (addr, content) in cells {
            if covered.contains(addr) {
                continue;
            }
            match content {
                RawCellContent::Empty => {}
                RawCellContent::MatrixFormula(text) => matrix_formulas.push((*addr, text.clone())),
                RawCellContent::Formula(text) => {
                    let entry = self.parser.parse(text, *addr, graph.sheets());
                    let deps = absolutize(&entry.dependencies, *addr);
                    let vertex = FormulaVertex::new(
                        *addr,
                        entry.ast,
                        entry.has_volatile_function,
                        entry.has_structural_change_function,
                    );
                    let id = graph.set_cell_vertex(*addr, Vertex::Formula(vertex), &[])?;
                    self.pending.push((id, deps));
                }
                literal => {
                    if let Some(value) = literal.literal_value() {
                        graph.set_cell_vertex(*addr, Vertex::Value(value), &[])?;
                    }
                }
            }
        }
        Ok(matrix_formulas)
    }

    fn place_matrix_formula(
        &mut self,
        graph: &mut DependencyGraph,
        addr: SimpleCellAddress,
        text: &str,
    ) -> Result<(), EngineError> {
        let entry = self.parser.parse(text, addr, graph.sheets());
        let (width, height) = matrix_size(self.registry, &entry.ast, addr);
        let span = AbsoluteCellRange::span_from(addr, width, height);
        if !self.config.limits().contains(&span.end) {
            return Err(EngineError::SheetSizeLimit {
                rows: self.config.max_rows,
                columns: self.config.max_columns,
            });
        }
        for (other, id) in graph.matrices().intersecting(&span) {
            let is_formula = graph
                .vertex(id)
                .and_then(Vertex::as_matrix)
                .is_some_and(|m| m.is_formula());
            if is_formula {
                return Err(EngineError::InvalidArguments(format!(
                    "matrix formula at {addr} overlaps the matrix at {other}"
                )));
            }
            graph.dissolve_matrix(other)?;
        }
        let deps = absolutize(&entry.dependencies, addr);
        let matrix = MatrixVertex::from_formula(addr, width, height, Arc::clone(&entry.ast));
        let id = graph.add_matrix(matrix, &[])?;
        self.pending.push((id, deps));
        Ok(())
    }

    /// Range vertices, shortest first.
    fn create_ranges(&self, graph: &mut DependencyGraph) -> Result<(), EngineError> {
        let mut ranges: Vec<AbsoluteCellRange> = self
            .pending
            .iter()
            .flat_map(|(_, deps)| deps.iter())
            .filter_map(|dep| match dep {
                CellDependency::Range(r) => Some(*r),
                CellDependency::Cell(_) => None,
            })
            .collect();
        ranges.sort_by_key(|r| (r.height(), *r));
        ranges.dedup();
        for range in ranges {
            graph.range_vertex(range)?;
        }
        Ok(())
    }
}

pub(super) fn classify(sheet: SheetId, grid: &Sheet) -> Vec<(SimpleCellAddress, RawCellContent)> {
    grid.iter()
        .enumerate()
        .flat_map(|(row, cells)| {
            cells.iter().enumerate().filter_map(move |(col, raw)| {
                let content = RawCellContent::parse(raw);
                (content != RawCellContent::Empty)
                    .then(|| (SimpleCellAddress::new(sheet, col as u32, row as u32), content))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StrategyKind;
    use crate::engine::address_mapping::AddressMappingPolicy;
    use crate::function_registry::FunctionRegistry;

    fn grid(rows: &[&[&str]]) -> Sheet {
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn build(config: &EvalConfig, sheet: Sheet) -> Result<DependencyGraph, EngineError> {
        let registry = Arc::new(FunctionRegistry::with_builtins());
        let mut parser = ParserWithCaching::new(registry.clone());
        GraphBuilder::new(config, &mut parser, &registry).build(vec![("Sheet1".into(), sheet)])
    }

    #[test]
    fn ranges_are_wired_from_shorter_ones() {
        let config = EvalConfig::default();
        let g = build(
            &config,
            grid(&[&["1", "=SUM(A1:A3)"], &["2", "=SUM(A1:A2)"], &["3"]]),
        )
        .unwrap();
        let small = g
            .ranges()
            .get(&AbsoluteCellRange::from_coordinates(0, 0, 0, 0, 1))
            .unwrap();
        let big = g
            .ranges()
            .get(&AbsoluteCellRange::from_coordinates(0, 0, 0, 0, 2))
            .unwrap();
        assert!(g.graph().has_edge(small, big));
    }

    #[test]
    fn strategy_follows_fill_ratio() {
        let config = EvalConfig::default();
        let dense = build(&config, grid(&[&["1", "2"], &["3", "4"]])).unwrap();
        assert_eq!(dense.addresses().strategy_kind(0), Some(StrategyKind::Dense));
        let sparse = build(&config, grid(&[&["1", "", ""], &["", "", ""]])).unwrap();
        assert_eq!(sparse.addresses().strategy_kind(0), Some(StrategyKind::Sparse));

        let forced = config.with_address_mapping_policy(AddressMappingPolicy::AlwaysDense);
        let g = build(&forced, grid(&[&["1", "", ""]])).unwrap();
        assert_eq!(g.addresses().strategy_kind(0), Some(StrategyKind::Dense));
    }

    #[test]
    fn oversized_sheets_and_duplicate_names_are_rejected() {
        let config = EvalConfig::default().with_limits(2, 2);
        assert!(matches!(
            build(&config, grid(&[&["1"], &["2"], &["3"]])),
            Err(EngineError::SheetSizeLimit { .. })
        ));

        let registry = Arc::new(FunctionRegistry::with_builtins());
        let mut parser = ParserWithCaching::new(registry.clone());
        let err = GraphBuilder::new(&EvalConfig::default(), &mut parser, &registry)
            .build(vec![("A".into(), Sheet::new()), ("a".into(), Sheet::new())])
            .unwrap_err();
        assert_eq!(err, EngineError::SheetNameTaken("a".into()));
    }

    #[test]
    fn detected_matrices_replace_values() {
        let config = EvalConfig::default().with_matrix_detection(true, 4);
        let g = build(
            &config,
            grid(&[&["1", "2", "x"], &["3", "4", "=A1"], &["y"]]),
        )
        .unwrap();
        assert_eq!(g.matrices().len(), 1);
        let (span, _) = g
            .matrices()
            .containing(&SimpleCellAddress::new(0, 1, 1))
            .unwrap();
        assert_eq!(span, AbsoluteCellRange::from_coordinates(0, 0, 0, 1, 1));
    }

    #[test]
    fn overlapping_matrix_formulas_fail() {
        let config = EvalConfig::default();
        let side_by_side = build(
            &config,
            grid(&[
                &["1", "2"],
                &["{=TRANSPOSE(A1:B1)}", "{=TRANSPOSE(A1:B1)}"],
                &["", ""],
            ]),
        );
        assert!(side_by_side.is_ok());
        let err = build(
            &config,
            grid(&[
                &["1", "2"],
                &["{=TRANSPOSE(A1:B1)}", ""],
                &["{=TRANSPOSE(A1:B1)}", ""],
            ]),
        );
        assert!(matches!(err, Err(EngineError::InvalidArguments(_))));
    }
}
