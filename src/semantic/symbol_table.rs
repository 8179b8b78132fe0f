//! Symbol table for tracking variable bindings and lexical scopes.

use crate::ast::{DataType, Span};
use smol_str::SmolStr;
use std::collections::HashMap;

/// Unique identifier for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    /// Creates a new scope ID.
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Kind of scope boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The root scope of a program.
    Global,
    /// Query scope (SELECT, NAVIGATE, INSERT, UPDATE, DELETE).
    Query,
    /// Subquery scope (nested SELECT source).
    Subquery,
    /// FOR EACH loop body scope.
    ForLoop,
    /// IF branch scope.
    IfBranch,
    /// Common table expression scope.
    Cte,
}

/// Scope representing a visibility boundary for symbols.
#[derive(Debug, Clone)]
pub struct Scope {
    /// Unique scope identifier.
    pub id: ScopeId,
    /// Parent scope (None for the global scope).
    pub parent: Option<ScopeId>,
    /// Kind of scope.
    pub kind: ScopeKind,
    /// Symbols defined in this scope, by name.
    symbols: HashMap<SmolStr, Symbol>,
}

impl Scope {
    fn new(id: ScopeId, parent: Option<ScopeId>, kind: ScopeKind) -> Self {
        Self {
            id,
            parent,
            kind,
            symbols: HashMap::new(),
        }
    }

    /// Returns the symbol with the given name in this scope, if present.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Returns all symbols defined in this scope.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

/// Kind of symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A variable bound by SET or a loop iterator.
    Variable,
    /// A projected field name.
    Field,
    /// A function name.
    Function,
    /// A parameter.
    Parameter,
    /// A common table expression name.
    Cte,
}

/// Symbol representing a named binding.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// The bound name.
    pub name: SmolStr,
    /// Kind of symbol.
    pub kind: SymbolKind,
    /// Declared or inferred data type.
    pub data_type: DataType,
    /// Whether the symbol may hold NULL.
    pub nullable: bool,
    /// Span where the symbol was declared.
    pub declared_at: Span,
    /// Scope the symbol belongs to.
    pub scope: ScopeId,
}

/// Symbol table tracking bindings across a stack of lexical scopes.
///
/// Scopes are created on entry to SELECT/NAVIGATE/subquery/FOR/IF/CTE and
/// must be popped in reverse order; all scopes remain addressable by id
/// after analysis for inspection.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    /// All scopes ever created, indexed by ScopeId.
    scopes: Vec<Scope>,
    /// Stack of currently-open scope ids; the last is the innermost.
    stack: Vec<ScopeId>,
}

impl SymbolTable {
    /// Creates a new symbol table with an open global scope.
    pub fn new() -> Self {
        let root = Scope::new(ScopeId(0), None, ScopeKind::Global);
        Self {
            scopes: vec![root],
            stack: vec![ScopeId(0)],
        }
    }

    /// Pushes a new scope and makes it current.
    pub fn push_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        let parent = self.current_scope();
        self.scopes.push(Scope::new(id, Some(parent), kind));
        self.stack.push(id);
        id
    }

    /// Pops the current scope. The global scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Returns the id of the current (innermost) scope.
    pub fn current_scope(&self) -> ScopeId {
        *self.stack.last().expect("scope stack is never empty")
    }

    /// Returns the current scope nesting depth (global = 1).
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Defines a symbol in the current scope, replacing any previous
    /// definition of the same name in that scope (shadowing outer scopes).
    pub fn define(
        &mut self,
        name: impl Into<SmolStr>,
        kind: SymbolKind,
        data_type: DataType,
        nullable: bool,
        declared_at: Span,
    ) {
        let scope_id = self.current_scope();
        let name = name.into();
        let symbol = Symbol {
            name: name.clone(),
            kind,
            data_type,
            nullable,
            declared_at,
            scope: scope_id,
        };
        self.scopes[scope_id.as_usize()].symbols.insert(name, symbol);
    }

    /// Resolves a name by walking from the current scope to the root.
    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        let mut scope_id = Some(self.current_scope());
        while let Some(id) = scope_id {
            let scope = &self.scopes[id.as_usize()];
            if let Some(symbol) = scope.get(name) {
                return Some(symbol);
            }
            scope_id = scope.parent;
        }
        None
    }

    /// Returns the scope with the given id.
    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.as_usize())
    }

    /// Returns all scopes created during analysis.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores a symbol table to a recorded depth when dropped, popping exactly
/// the scopes pushed after the guard was created. This keeps push/pop
/// balanced on early-return error paths.
pub struct ScopeGuard {
    target_depth: usize,
}

impl ScopeGuard {
    /// Records the current depth of the table.
    pub fn new(table: &SymbolTable) -> Self {
        Self {
            target_depth: table.depth(),
        }
    }

    /// Pops scopes from the table until the recorded depth is restored.
    pub fn restore(&self, table: &mut SymbolTable) {
        while table.depth() > self.target_depth {
            table.pop_scope();
        }
    }
}
