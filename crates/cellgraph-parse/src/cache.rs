use std::sync::Arc;

use cellgraph_common::SimpleCellAddress;
use rustc_hash::FxHashMap;

use crate::dependencies::{FunctionFlags, collect_dependencies};
use crate::hasher::structural_hash;
use crate::parser::{ASTNode, Parser, ParserError};
use crate::reference::{ReferenceType, SheetLookup};
use crate::tokenizer::Tokenizer;

/// Everything derived from a formula that does not depend on where it lives.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub ast: Arc<ASTNode>,
    /// Relative dependencies; see [`absolutize`](crate::absolutize).
    pub dependencies: Arc<[ReferenceType]>,
    pub has_volatile_function: bool,
    pub has_structural_change_function: bool,
}

/// Formula parser that shares ASTs between formulas of the same shape.
///
/// Lookups are keyed by the structural hash, so `=A1+1` in B1 and `=A2+1`
/// in B2 resolve to one entry while `=A1+1` and `=A1+2` never do.
pub struct ParserWithCaching {
    cache: FxHashMap<String, CacheEntry>,
    functions: Arc<dyn FunctionFlags + Send + Sync>,
    hits: usize,
}

impl ParserWithCaching {
    pub fn new(functions: Arc<dyn FunctionFlags + Send + Sync>) -> Self {
        Self {
            cache: FxHashMap::default(),
            functions,
            hits: 0,
        }
    }

    /// Parse `text` (starting with `=`) for the cell at `address`.
    ///
    /// A syntax error yields an entry whose AST is [`ASTNode::Invalid`].
    pub fn parse(
        &mut self,
        text: &str,
        address: SimpleCellAddress,
        sheets: &dyn SheetLookup,
    ) -> CacheEntry {
        match self.try_parse(text, address, sheets) {
            Ok(entry) => entry,
            Err(err) => CacheEntry {
                ast: Arc::new(ASTNode::invalid(text, &err)),
                dependencies: Arc::from(Vec::new()),
                has_volatile_function: false,
                has_structural_change_function: false,
            },
        }
    }

    pub fn try_parse(
        &mut self,
        text: &str,
        address: SimpleCellAddress,
        sheets: &dyn SheetLookup,
    ) -> Result<CacheEntry, ParserError> {
        let tokenizer = Tokenizer::new(text)?;
        let hash = structural_hash(&tokenizer.items, address, sheets);

        if let Some(entry) = self.cache.get(&hash) {
            self.hits += 1;
            return Ok(entry.clone());
        }

        let ast = Parser::new(tokenizer.items, address, sheets).parse()?;
        let entry = self.analyze(Arc::new(ast));
        self.cache.insert(hash, entry.clone());
        Ok(entry)
    }

    /// Derive dependencies and flags for an AST built outside the cache,
    /// e.g. one rewritten by a structural edit.
    pub fn analyze(&self, ast: Arc<ASTNode>) -> CacheEntry {
        let mut has_volatile_function = false;
        let mut has_structural_change_function = false;
        ast.walk(&mut |node| {
            if let ASTNode::Function { name, .. } = node {
                has_volatile_function |= self.functions.is_volatile(name);
                has_structural_change_function |= self.functions.is_structure_sensitive(name);
            }
        });
        let dependencies = collect_dependencies(&ast, self.functions.as_ref());
        CacheEntry {
            ast,
            dependencies: Arc::from(dependencies),
            has_volatile_function,
            has_structural_change_function,
        }
    }

    pub fn functions(&self) -> &(dyn FunctionFlags + Send + Sync) {
        self.functions.as_ref()
    }

    pub fn cache_hits(&self) -> usize {
        self.hits
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop every entry. Only done when the whole engine is rebuilt.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
    }
}
