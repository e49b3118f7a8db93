//! Symbol table with lexical scoping for Sindarin
//!
//! Scopes stack: depth 0 is the module scope, `open_scope` pushes a block
//! or function scope, and lookup walks innermost-first. Shadowing an outer
//! scope is legal; redeclaring a name at the same depth is an error.
//! Namespaces are named scopes that remain reachable by qualified lookup
//! after they close, and the namespace name itself occupies a symbol in
//! the parent scope.

use std::collections::HashMap;

use crate::arena::TypeId;
use crate::token::Token;

/// What a symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function,
    Struct,
    Namespace,
}

/// A resolved name binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol<'arena> {
    pub name: &'arena str,
    pub ty: TypeId,
    pub kind: SymbolKind,
    /// Depth of the scope that declared this symbol.
    pub scope_depth: usize,
    /// Slot index among the variables/parameters of the declaring scope
    /// chain; function scopes restart the sequence.
    pub offset: usize,
}

/// Kind of a pushed scope. Function scopes reset the offset sequence;
/// block scopes continue their parent's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Block,
    Function,
    Namespace,
}

#[derive(Debug)]
struct Scope<'arena> {
    kind: ScopeKind,
    /// Name of the namespace when `kind == Namespace`.
    name: Option<&'arena str>,
    symbols: Vec<Symbol<'arena>>,
    next_offset: usize,
}

/// Error returned when a name is redeclared at the same depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateError {
    pub name: String,
    pub scope_depth: usize,
}

impl std::fmt::Display for DuplicateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "duplicate declaration of '{}' in the same scope",
            self.name
        )
    }
}

pub struct SymbolTable<'arena> {
    scopes: Vec<Scope<'arena>>,
    /// Closed namespaces, reachable by qualified lookup.
    namespaces: HashMap<&'arena str, Vec<Symbol<'arena>>>,
}

impl<'arena> Default for SymbolTable<'arena> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'arena> SymbolTable<'arena> {
    /// Create a table with the module scope open at depth 0.
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                kind: ScopeKind::Module,
                name: None,
                symbols: Vec::new(),
                next_offset: 0,
            }],
            namespaces: HashMap::new(),
        }
    }

    /// Current scope depth; the module scope is depth 0.
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn open_scope(&mut self, kind: ScopeKind) {
        let next_offset = match kind {
            // Function scopes restart the parameter/local slot sequence.
            ScopeKind::Function | ScopeKind::Module | ScopeKind::Namespace => 0,
            ScopeKind::Block => self.scopes.last().map_or(0, |s| s.next_offset),
        };
        self.scopes.push(Scope {
            kind,
            name: None,
            symbols: Vec::new(),
            next_offset,
        });
    }

    /// Pop the innermost scope. The module scope is never popped.
    pub fn close_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Introduce a symbol in the innermost scope. Duplicates at the same
    /// depth are rejected; shadowing an outer scope is legal.
    pub fn declare(
        &mut self,
        name: &Token<'arena>,
        ty: TypeId,
        kind: SymbolKind,
    ) -> Result<Symbol<'arena>, DuplicateError> {
        let depth = self.depth();
        let scope = self.scopes.last_mut().expect("module scope always open");
        if scope.symbols.iter().any(|s| s.name == name.text) {
            return Err(DuplicateError {
                name: name.text.to_string(),
                scope_depth: depth,
            });
        }
        let offset = match kind {
            SymbolKind::Variable | SymbolKind::Parameter => {
                let off = scope.next_offset;
                scope.next_offset += 1;
                off
            }
            _ => 0,
        };
        let symbol = Symbol {
            name: name.text,
            ty,
            kind,
            scope_depth: depth,
            offset,
        };
        scope.symbols.push(symbol.clone());
        Ok(symbol)
    }

    /// Innermost-first lookup. Case-sensitive; the full identifier must
    /// match (no prefix matching).
    pub fn lookup(&self, name: &Token<'_>) -> Option<&Symbol<'arena>> {
        for scope in self.scopes.iter().rev() {
            if let Some(sym) = scope.symbols.iter().find(|s| s.name == name.text) {
                return Some(sym);
            }
        }
        None
    }

    /// Lookup restricted to the innermost scope.
    pub fn lookup_current(&self, name: &Token<'_>) -> Option<&Symbol<'arena>> {
        self.scopes
            .last()
            .and_then(|scope| scope.symbols.iter().find(|s| s.name == name.text))
    }

    /// Open a namespace: declares the namespace name in the current scope
    /// and pushes a named scope for its members.
    pub fn open_namespace(
        &mut self,
        name: &Token<'arena>,
        ty: TypeId,
    ) -> Result<(), DuplicateError> {
        self.declare(name, ty, SymbolKind::Namespace)?;
        self.open_scope(ScopeKind::Namespace);
        if let Some(scope) = self.scopes.last_mut() {
            scope.name = Some(name.text);
        }
        Ok(())
    }

    /// Close the current namespace scope, keeping its symbols reachable by
    /// qualified lookup.
    pub fn close_namespace(&mut self) {
        if self.scopes.len() <= 1 {
            return;
        }
        if let Some(scope) = self.scopes.pop() {
            if let Some(name) = scope.name {
                self.namespaces.insert(name, scope.symbols);
            }
        }
    }

    /// Qualified lookup of `member` inside a (possibly closed) namespace.
    pub fn lookup_qualified(&self, namespace: &str, member: &Token<'_>) -> Option<&Symbol<'arena>> {
        // An open namespace scope wins over a previously closed one.
        for scope in self.scopes.iter().rev() {
            if scope.kind == ScopeKind::Namespace && scope.name == Some(namespace) {
                return scope.symbols.iter().find(|s| s.name == member.text);
            }
        }
        self.namespaces
            .get(namespace)?
            .iter()
            .find(|s| s.name == member.text)
    }

    /// Number of symbols in the innermost scope.
    pub fn current_scope_len(&self) -> usize {
        self.scopes.last().map_or(0, |s| s.symbols.len())
    }
}
