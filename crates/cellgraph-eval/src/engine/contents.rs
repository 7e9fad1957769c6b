//! Whole-sheet and block writes.
//!
//! Every operation here runs inside a batch, so a failure leaves the graph
//! as it was and success costs one recompute.

use cellgraph_common::{RawCellContent, SheetId, SimpleCellAddress};
use rustc_hash::{FxHashMap, FxHashSet};

use super::builder::{Sheet, classify};
use super::eval::Engine;
use super::matrix_detection::detect_matrices;
use super::vertex::{MatrixVertex, Vertex};
use super::{EngineError, ExportedChange};

impl Engine {
    /// Replace everything on `sheet` with `content`, as if the sheet had
    /// been built from it. Matrices on the sheet are torn down first and
    /// numeric blocks are detected again when detection is enabled.
    pub fn set_sheet_content(
        &mut self,
        sheet: SheetId,
        content: Sheet,
    ) -> Result<Vec<ExportedChange>, EngineError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("set_sheet_content", sheet, rows = content.len()).entered();
        self.ensure_sheet(sheet)?;
        let too_tall = content.len() > self.config.max_rows as usize;
        let too_wide = content
            .iter()
            .any(|row| row.len() > self.config.max_columns as usize);
        if too_tall || too_wide {
            return Err(self.size_limit());
        }
        self.batch(|e| e.replace_sheet_cells(sheet, &content))
    }

    /// Empty every cell of `sheet`. Formulas elsewhere that read it keep
    /// their references and now see empty cells.
    pub fn clear_sheet(&mut self, sheet: SheetId) -> Result<Vec<ExportedChange>, EngineError> {
        self.set_sheet_content(sheet, Vec::new())
    }

    /// Write a block of raw texts with `top_left` as its first cell.
    pub fn set_cells_contents(
        &mut self,
        top_left: SimpleCellAddress,
        contents: &[Vec<String>],
    ) -> Result<Vec<ExportedChange>, EngineError> {
        self.ensure_sheet(top_left.sheet)?;
        self.batch(|e| {
            for (dy, row) in contents.iter().enumerate() {
                for (dx, raw) in row.iter().enumerate() {
                    let addr = top_left
                        .offset(dx as i64, dy as i64)
                        .ok_or_else(|| e.size_limit())?;
                    e.set_cell_contents(addr, raw)?;
                }
            }
            Ok(())
        })
    }

    fn replace_sheet_cells(&mut self, sheet: SheetId, content: &Sheet) -> Result<(), EngineError> {
        let mut writes: FxHashSet<SimpleCellAddress> = FxHashSet::default();

        let matrices = self.graph.matrices().entries(sheet);
        for (span, _) in matrices {
            writes.extend(span.addresses());
            self.graph.dissolve_matrix(span)?;
        }
        let occupied: Vec<SimpleCellAddress> = self
            .graph
            .addresses()
            .entries(sheet)
            .into_iter()
            .filter(|(_, id)| !matches!(self.graph.vertex(*id), Some(Vertex::Empty)))
            .map(|(addr, _)| addr)
            .collect();
        for addr in occupied {
            self.graph.clear_cell(addr)?;
            writes.insert(addr);
        }

        let cells = classify(sheet, content);
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
                self.graph
                    .add_matrix(MatrixVertex::numeric(m.start, m.matrix), &[])?;
            }
        }

        let mut matrix_formulas = Vec::new();
        for (addr, content) in cells {
            writes.insert(addr);
            if covered.contains(&addr) {
                continue;
            }
            match content {
                RawCellContent::MatrixFormula(_) => matrix_formulas.push((addr, content)),
                content => self.apply_contents(addr, content)?,
            }
        }
        for (addr, content) in matrix_formulas {
            self.apply_contents(addr, content)?;
        }

        let mut writes: Vec<SimpleCellAddress> = writes.into_iter().collect();
        writes.sort_unstable();
        // OFFSET reads cells it has no edge to
        self.finish_edit(true, writes)?;
        Ok(())
    }
}
