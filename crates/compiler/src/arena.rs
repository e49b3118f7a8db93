//! Compilation arena
//!
//! One `AstArena` owns every token string, expression, statement and type
//! built during a compilation. String and token text is bump-allocated;
//! nodes live in arena-backed vectors addressed by typed ids, which keeps
//! in-place rewriting by later passes simple. Nothing is freed
//! individually: dropping the arena (and resetting the backing `Bump`)
//! releases the whole compilation at once.

use bumpalo::Bump;

use crate::ast::{Expr, Stmt};
use crate::token::Token;
use crate::types::{Primitive, Type};

/// Handle to an expression stored in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

/// Handle to a statement stored in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

/// Handle to a type stored in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl StmtId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub struct AstArena<'arena> {
    bump: &'arena Bump,
    exprs: Vec<Expr<'arena>>,
    stmts: Vec<Stmt<'arena>>,
    types: Vec<Type<'arena>>,
    /// Interned primitive types, indexed by `Primitive as usize`.
    primitives: [TypeId; Primitive::COUNT],
}

impl<'arena> AstArena<'arena> {
    /// Create an arena backed by the given bump allocator.
    ///
    /// The caller owns the `Bump`; resetting it after the arena is dropped
    /// releases all node and string storage in one step.
    pub fn new(bump: &'arena Bump) -> Self {
        let mut types = Vec::with_capacity(Primitive::COUNT + 16);
        let mut primitives = [TypeId(0); Primitive::COUNT];
        for (i, prim) in Primitive::ALL.iter().enumerate() {
            primitives[i] = TypeId(types.len() as u32);
            types.push(Type::Primitive(*prim));
        }
        AstArena {
            bump,
            exprs: Vec::new(),
            stmts: Vec::new(),
            types,
            primitives,
        }
    }

    /// Copy a string into arena-owned memory.
    pub fn dup_str(&self, s: &str) -> &'arena str {
        self.bump.alloc_str(s)
    }

    /// Duplicate a token, copying its backing text into this arena.
    pub fn dup_token(&self, token: &Token<'_>) -> Token<'arena> {
        Token {
            kind: token.kind,
            text: self.bump.alloc_str(token.text),
            filename: self.bump.alloc_str(token.filename),
            line: token.line,
            column: token.column,
        }
    }

    pub fn alloc_expr(&mut self, expr: Expr<'arena>) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt<'arena>) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    pub fn alloc_type(&mut self, ty: Type<'arena>) -> TypeId {
        // Primitives are interned at construction; reuse those slots.
        if let Type::Primitive(prim) = ty {
            return self.primitives[prim as usize];
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    /// The interned id for a primitive type.
    pub fn primitive(&self, prim: Primitive) -> TypeId {
        self.primitives[prim as usize]
    }

    pub fn expr(&self, id: ExprId) -> &Expr<'arena> {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr<'arena> {
        &mut self.exprs[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt<'arena> {
        &self.stmts[id.index()]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt<'arena> {
        &mut self.stmts[id.index()]
    }

    pub fn get_type(&self, id: TypeId) -> &Type<'arena> {
        &self.types[id.index()]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Bytes currently allocated by the backing bump allocator.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    /// Drop all nodes, keeping only the interned primitives.
    ///
    /// Bump-allocated string storage is reclaimed when the owner resets the
    /// `Bump` after this arena is dropped.
    pub fn reset(&mut self) {
        self.exprs.clear();
        self.stmts.clear();
        self.types.truncate(Primitive::COUNT);
    }
}
