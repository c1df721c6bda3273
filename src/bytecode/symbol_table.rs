use std::collections::HashMap;

/// Where a resolved name lives at runtime, which decides the load instruction
/// the compiler emits for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    /// Captured from an enclosing function.
    Free,
    /// The name of the function currently being compiled.
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One lexical scope: the top level or a single function literal.
#[derive(Debug, Default)]
struct Scope {
    store: HashMap<String, Symbol>,
    free_symbols: Vec<Symbol>,
    num_definitions: usize,
}

/// What a function scope hands back to the compiler when it is left.
#[derive(Debug, Default, PartialEq)]
pub struct ScopeSummary {
    /// Captured symbols as they resolve in the enclosing scope, in capture
    /// order.
    pub free_symbols: Vec<Symbol>,
    pub num_definitions: usize,
}

/// A plan for resolving a name, computed without touching the table.
#[derive(Debug, PartialEq)]
pub struct Resolution {
    /// The symbol as stored in the nearest scope that defines the name.
    pub symbol: Symbol,
    /// Depth of that scope (0 is the global scope).
    pub depth: usize,
    /// Depths of the scopes that must capture the symbol as a free variable,
    /// outermost first.
    pub captures: Vec<usize>,
}

/// The chain of scopes active during compilation.
///
/// Scopes form a stack: the last one is the current scope and every other
/// scope is the enclosing scope of the one above it. The global scope is
/// never popped, so a table handed back by the compiler can be reused for the
/// next REPL input.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Nesting depth of the current scope; the global scope is 0.
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    fn current(&self) -> &Scope {
        &self.scopes[self.depth()]
    }

    fn current_mut(&mut self) -> &mut Scope {
        let depth = self.depth();
        &mut self.scopes[depth]
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pops the current scope. Returns `None` at the global scope, which is
    /// never left.
    pub fn leave_scope(&mut self) -> Option<ScopeSummary> {
        if self.scopes.len() == 1 {
            return None;
        }

        let scope = self.scopes.pop()?;
        Some(ScopeSummary {
            free_symbols: scope.free_symbols,
            num_definitions: scope.num_definitions,
        })
    }

    /// Drops every function scope, leaving only the global one.
    pub fn reset_to_global(&mut self) {
        self.scopes.truncate(1);
    }

    /// Binds `name` to the next slot of the current scope: a global at the top
    /// level, a local anywhere else.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.depth() == 0 {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };

        let current = self.current_mut();
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: current.num_definitions,
        };
        current.num_definitions += 1;
        current.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Binds `name` to builtin `index`. Does not use up a slot.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.current_mut()
            .store
            .insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Binds the name of the function being compiled so its body can call
    /// itself. Does not use up a slot.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.current_mut()
            .store
            .insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free_at(&mut self, depth: usize, original: Symbol) -> Symbol {
        let scope = &mut self.scopes[depth];
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: scope.free_symbols.len(),
        };
        scope.free_symbols.push(original);
        scope.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Finds `name` and works out which scopes would have to capture it,
    /// without modifying anything.
    ///
    /// Locals, free variables and function names of an enclosing function are
    /// captured by every scope between their definition and the current one.
    /// Globals and builtins are reachable from anywhere and are never captured.
    pub fn plan(&self, name: &str) -> Option<Resolution> {
        let (depth, symbol) = self
            .scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, scope)| scope.store.get(name).map(|s| (depth, s.clone())))?;

        let captures = match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Vec::new(),
            SymbolScope::Local | SymbolScope::Free | SymbolScope::Function => {
                (depth + 1..=self.depth()).collect()
            }
        };

        Some(Resolution {
            symbol,
            depth,
            captures,
        })
    }

    /// Resolves `name` from the current scope, recording free-variable
    /// captures in every intermediate scope on the way.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        let Resolution {
            mut symbol,
            captures,
            ..
        } = self.plan(name)?;

        for depth in captures {
            log::trace!("capturing '{}' as free in scope {}", name, depth);
            symbol = self.define_free_at(depth, symbol);
        }

        Some(symbol)
    }

    /// Looks `name` up in the current scope only.
    pub fn resolve_current_scope(&self, name: &str) -> Option<&Symbol> {
        self.current().store.get(name)
    }

    pub fn free_symbols(&self) -> &[Symbol] {
        &self.current().free_symbols
    }

    pub fn num_definitions(&self) -> usize {
        self.current().num_definitions
    }
}
