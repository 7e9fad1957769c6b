use std::sync::Arc;

use cellgraph_parse::FunctionFlags;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::function::{FnCaps, Function};

/// Built-ins are instantiated once per process and shared by every registry.
static BUILTINS: Lazy<FunctionRegistry> = Lazy::new(|| {
    let registry = FunctionRegistry::new();
    crate::builtins::load_builtins(&registry);
    registry
});

/// Name -> function, owned by one engine.
///
/// Names are stored upper-case; lookups are case-insensitive.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: DashMap<String, Arc<dyn Function>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.names();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in function.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for entry in BUILTINS.functions.iter() {
            registry
                .functions
                .insert(entry.key().clone(), Arc::clone(entry.value()));
        }
        registry
    }

    /// Add or replace a function.
    pub fn register(&self, f: Arc<dyn Function>) {
        self.functions.insert(f.name().to_ascii_uppercase(), f);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions
            .get(&name.to_ascii_uppercase())
            .map(|v| Arc::clone(v.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_ascii_uppercase())
    }

    pub fn names(&self) -> Vec<String> {
        self.functions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    fn has_cap(&self, name: &str, cap: FnCaps) -> bool {
        self.get(name).is_some_and(|f| f.caps().contains(cap))
    }
}

impl FunctionFlags for FunctionRegistry {
    fn is_volatile(&self, name: &str) -> bool {
        self.has_cap(name, FnCaps::VOLATILE)
    }

    fn is_structure_sensitive(&self, name: &str) -> bool {
        self.has_cap(name, FnCaps::STRUCTURE_SENSITIVE)
    }

    fn skips_argument_values(&self, name: &str) -> bool {
        self.has_cap(name, FnCaps::NO_ARGUMENT_VALUES)
    }
}
