use cellgraph_common::{AbsoluteCellRange, SimpleCellAddress};
use rustc_hash::FxHashSet;

use crate::parser::ASTNode;
use crate::reference::ReferenceType;

/// Static facts about function names the parser needs before evaluation.
pub trait FunctionFlags {
    /// Recomputed on every pass (`RAND`, `NOW`).
    fn is_volatile(&self, name: &str) -> bool;
    /// Recomputed after every row/column insertion or removal (`OFFSET`).
    fn is_structure_sensitive(&self, name: &str) -> bool;
    /// Reads only the shape of its arguments (`ROWS`, `COLUMNS`); its
    /// references do not become graph edges.
    fn skips_argument_values(&self, name: &str) -> bool;
}

/// Plain name sets, upper-case.
#[derive(Debug, Clone, Default)]
pub struct StaticFunctionFlags {
    pub volatile: FxHashSet<String>,
    pub structure_sensitive: FxHashSet<String>,
    pub skip_argument_values: FxHashSet<String>,
}

impl StaticFunctionFlags {
    pub fn new<I, J, K>(volatile: I, structure_sensitive: J, skip_argument_values: K) -> Self
    where
        I: IntoIterator<Item = &'static str>,
        J: IntoIterator<Item = &'static str>,
        K: IntoIterator<Item = &'static str>,
    {
        Self {
            volatile: upper_set(volatile),
            structure_sensitive: upper_set(structure_sensitive),
            skip_argument_values: upper_set(skip_argument_values),
        }
    }
}

fn upper_set<I: IntoIterator<Item = &'static str>>(names: I) -> FxHashSet<String> {
    names.into_iter().map(str::to_ascii_uppercase).collect()
}

impl FunctionFlags for StaticFunctionFlags {
    fn is_volatile(&self, name: &str) -> bool {
        self.volatile.contains(name)
    }

    fn is_structure_sensitive(&self, name: &str) -> bool {
        self.structure_sensitive.contains(name)
    }

    fn skips_argument_values(&self, name: &str) -> bool {
        self.skip_argument_values.contains(name)
    }
}

/// A dependency resolved for a concrete formula address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellDependency {
    Cell(SimpleCellAddress),
    Range(AbsoluteCellRange),
}

/// Every reference the formula reads, in source order, without duplicates.
pub fn collect_dependencies(ast: &ASTNode, functions: &dyn FunctionFlags) -> Vec<ReferenceType> {
    fn go(node: &ASTNode, functions: &dyn FunctionFlags, out: &mut Vec<ReferenceType>) {
        match node {
            ASTNode::Reference(r) => {
                if !out.contains(r) {
                    out.push(r.clone());
                }
            }
            ASTNode::UnaryOp { expr, .. } => go(expr, functions, out),
            ASTNode::BinaryOp { left, right, .. } => {
                go(left, functions, out);
                go(right, functions, out);
            }
            ASTNode::Function { name, args } => {
                if !functions.skips_argument_values(name) {
                    for arg in args {
                        go(arg, functions, out);
                    }
                }
            }
            ASTNode::Literal(_) | ASTNode::Invalid { .. } => {}
        }
    }

    let mut out = Vec::new();
    go(ast, functions, &mut out);
    out
}

/// Resolve relative dependencies for a formula placed at `base`.
///
/// References that point outside the sheet are dropped; they evaluate to
/// `#REF!` and need no edge.
pub fn absolutize(deps: &[ReferenceType], base: SimpleCellAddress) -> Vec<CellDependency> {
    deps.iter()
        .filter_map(|dep| match dep {
            ReferenceType::Cell { .. } => dep.resolve_cell(base).map(CellDependency::Cell),
            _ => dep.to_range(base).map(CellDependency::Range),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use cellgraph_common::UNBOUNDED;

    fn flags() -> StaticFunctionFlags {
        StaticFunctionFlags::new(["RAND"], ["OFFSET", "ROWS"], ["ROWS"])
    }

    #[test]
    fn collects_and_resolves() {
        let base = SimpleCellAddress::new(0, 2, 2);
        let ast = parse("=A1+SUM(A1:B2)+A1+ROWS(D1:D9)+SUM(B:B)", base, &vec!["S"]).unwrap();
        let deps = collect_dependencies(&ast, &flags());
        assert_eq!(deps.len(), 3);

        let abs = absolutize(&deps, base);
        assert_eq!(
            abs,
            vec![
                CellDependency::Cell(SimpleCellAddress::new(0, 0, 0)),
                CellDependency::Range(AbsoluteCellRange::from_coordinates(0, 0, 0, 1, 1)),
                CellDependency::Range(AbsoluteCellRange::from_coordinates(
                    0, 1, 0, 1, UNBOUNDED
                )),
            ]
        );
    }

    #[test]
    fn out_of_sheet_references_are_dropped() {
        let ast = parse("=A1", SimpleCellAddress::new(0, 1, 1), &vec!["S"]).unwrap();
        let deps = collect_dependencies(&ast, &flags());
        assert!(absolutize(&deps, SimpleCellAddress::new(0, 0, 0)).is_empty());
    }
}
