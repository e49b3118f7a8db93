//! Abstract syntax tree for Sindarin
//!
//! Expressions and statements are tagged variants stored in the
//! compilation arena and addressed by `ExprId`/`StmtId`. The parser builds
//! nodes exclusively through the factory methods on `AstArena`, which
//! duplicate location tokens into the arena so no node borrows lexer
//! buffers.

use crate::arena::{AstArena, ExprId, StmtId, TypeId};
use crate::token::{Token, TokenKind};
use crate::types::{MemoryQualifier, Primitive, StructField, Type};

/// Literal payloads. String data is arena-owned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiteralValue<'arena> {
    Int(i64),
    Double(f64),
    Bool(bool),
    Char(u8),
    Str(&'arena str),
    Nil,
}

/// A function or lambda parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param<'arena> {
    pub name: Token<'arena>,
    pub ty: TypeId,
    pub qualifier: MemoryQualifier,
}

/// A function declaration (named function or namespace member).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl<'arena> {
    pub name: Token<'arena>,
    pub params: Vec<Param<'arena>>,
    pub return_type: TypeId,
    pub body: Vec<StmtId>,
    pub is_native: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind<'arena> {
    Literal {
        value: LiteralValue<'arena>,
        ty: TypeId,
    },
    Variable {
        name: Token<'arena>,
    },
    Binary {
        left: ExprId,
        op: TokenKind,
        right: ExprId,
    },
    Unary {
        op: TokenKind,
        operand: ExprId,
    },
    Assign {
        name: Token<'arena>,
        value: ExprId,
    },
    IndexAssign {
        array: ExprId,
        index: ExprId,
        value: ExprId,
    },
    Increment {
        operand: ExprId,
    },
    Decrement {
        operand: ExprId,
    },
    CompoundAssign {
        target: ExprId,
        op: TokenKind,
        value: ExprId,
    },
    Call {
        name: Token<'arena>,
        args: Vec<ExprId>,
        is_tail_call: bool,
    },
    MethodCall {
        object: ExprId,
        method: Token<'arena>,
        args: Vec<ExprId>,
    },
    FieldAccess {
        object: ExprId,
        field: Token<'arena>,
    },
    ArrayLiteral {
        elements: Vec<ExprId>,
    },
    ArrayAccess {
        array: ExprId,
        index: ExprId,
    },
    ArraySlice {
        array: ExprId,
        start: Option<ExprId>,
        end: Option<ExprId>,
    },
    Interpolated {
        parts: Vec<ExprId>,
    },
    Lambda {
        params: Vec<Param<'arena>>,
        return_type: TypeId,
        body: Vec<StmtId>,
    },
    /// `expr as val` — copy a native return value into managed storage.
    AsVal {
        inner: ExprId,
    },
}

/// An expression node. `expr_type` is unset until the type checker accepts
/// the expression; `token` locates diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr<'arena> {
    pub kind: ExprKind<'arena>,
    pub expr_type: Option<TypeId>,
    pub token: Token<'arena>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind<'arena> {
    VarDecl {
        name: Token<'arena>,
        declared_type: TypeId,
        initializer: Option<ExprId>,
    },
    Expression {
        expr: ExprId,
    },
    Return {
        keyword: Token<'arena>,
        value: Option<ExprId>,
    },
    If {
        condition: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
    Break,
    Continue,
    While {
        condition: ExprId,
        body: StmtId,
    },
    ForEach {
        variable: Token<'arena>,
        iterable: ExprId,
        body: StmtId,
    },
    Block {
        statements: Vec<StmtId>,
    },
    Function(FunctionDecl<'arena>),
    StructDecl {
        name: Token<'arena>,
        fields: Vec<StructField<'arena>>,
        is_native: bool,
    },
    Namespace {
        name: Token<'arena>,
        body: Vec<StmtId>,
    },
    /// A `private` region; affects memory-context tracking only.
    Private {
        body: Vec<StmtId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt<'arena> {
    pub kind: StmtKind<'arena>,
}

impl Stmt<'_> {
    /// Terminator statements end a block: nothing after them is reachable.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::Return { .. } | StmtKind::Break | StmtKind::Continue
        )
    }
}

/// A named translation unit: a source filename plus its ordered top-level
/// statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Module<'arena> {
    pub filename: &'arena str,
    pub statements: Vec<StmtId>,
}

impl<'arena> Module<'arena> {
    pub fn new(filename: &'arena str) -> Self {
        Module {
            filename,
            statements: Vec::new(),
        }
    }

    pub fn add_statement(&mut self, stmt: StmtId) {
        self.statements.push(stmt);
    }
}

// Factory methods. Every factory duplicates the location token into the
// arena and leaves `expr_type` unset for the type checker.
impl<'arena> AstArena<'arena> {
    fn make_expr(&mut self, kind: ExprKind<'arena>, loc: &Token<'_>) -> ExprId {
        let token = self.dup_token(loc);
        self.alloc_expr(Expr {
            kind,
            expr_type: None,
            token,
        })
    }

    pub fn literal_expr(
        &mut self,
        value: LiteralValue<'arena>,
        ty: TypeId,
        loc: &Token<'_>,
    ) -> ExprId {
        self.make_expr(ExprKind::Literal { value, ty }, loc)
    }

    pub fn int_literal(&mut self, value: i64, loc: &Token<'_>) -> ExprId {
        let ty = self.primitive(Primitive::Int);
        self.literal_expr(LiteralValue::Int(value), ty, loc)
    }

    pub fn long_literal(&mut self, value: i64, loc: &Token<'_>) -> ExprId {
        let ty = self.primitive(Primitive::Long);
        self.literal_expr(LiteralValue::Int(value), ty, loc)
    }

    pub fn double_literal(&mut self, value: f64, loc: &Token<'_>) -> ExprId {
        let ty = self.primitive(Primitive::Double);
        self.literal_expr(LiteralValue::Double(value), ty, loc)
    }

    pub fn bool_literal(&mut self, value: bool, loc: &Token<'_>) -> ExprId {
        let ty = self.primitive(Primitive::Bool);
        self.literal_expr(LiteralValue::Bool(value), ty, loc)
    }

    pub fn string_literal(&mut self, value: &str, loc: &Token<'_>) -> ExprId {
        let text = self.dup_str(value);
        let ty = self.primitive(Primitive::String);
        self.literal_expr(LiteralValue::Str(text), ty, loc)
    }

    pub fn nil_literal(&mut self, loc: &Token<'_>) -> ExprId {
        let ty = self.primitive(Primitive::Nil);
        self.literal_expr(LiteralValue::Nil, ty, loc)
    }

    pub fn variable_expr(&mut self, name: &Token<'_>, loc: &Token<'_>) -> ExprId {
        let name = self.dup_token(name);
        self.make_expr(ExprKind::Variable { name }, loc)
    }

    pub fn binary_expr(
        &mut self,
        left: ExprId,
        op: TokenKind,
        right: ExprId,
        loc: &Token<'_>,
    ) -> ExprId {
        self.make_expr(ExprKind::Binary { left, op, right }, loc)
    }

    /// Comparisons share the binary node shape.
    pub fn comparison_expr(
        &mut self,
        left: ExprId,
        right: ExprId,
        op: TokenKind,
        loc: &Token<'_>,
    ) -> ExprId {
        self.binary_expr(left, op, right, loc)
    }

    pub fn unary_expr(&mut self, op: TokenKind, operand: ExprId, loc: &Token<'_>) -> ExprId {
        self.make_expr(ExprKind::Unary { op, operand }, loc)
    }

    pub fn assign_expr(&mut self, name: &Token<'_>, value: ExprId, loc: &Token<'_>) -> ExprId {
        let name = self.dup_token(name);
        self.make_expr(ExprKind::Assign { name, value }, loc)
    }

    pub fn index_assign_expr(
        &mut self,
        array: ExprId,
        index: ExprId,
        value: ExprId,
        loc: &Token<'_>,
    ) -> ExprId {
        self.make_expr(ExprKind::IndexAssign { array, index, value }, loc)
    }

    pub fn increment_expr(&mut self, operand: ExprId, loc: &Token<'_>) -> ExprId {
        self.make_expr(ExprKind::Increment { operand }, loc)
    }

    pub fn decrement_expr(&mut self, operand: ExprId, loc: &Token<'_>) -> ExprId {
        self.make_expr(ExprKind::Decrement { operand }, loc)
    }

    pub fn compound_assign_expr(
        &mut self,
        target: ExprId,
        op: TokenKind,
        value: ExprId,
        loc: &Token<'_>,
    ) -> ExprId {
        self.make_expr(ExprKind::CompoundAssign { target, op, value }, loc)
    }

    pub fn call_expr(&mut self, name: &Token<'_>, args: Vec<ExprId>, loc: &Token<'_>) -> ExprId {
        let name = self.dup_token(name);
        self.make_expr(
            ExprKind::Call {
                name,
                args,
                is_tail_call: false,
            },
            loc,
        )
    }

    pub fn method_call_expr(
        &mut self,
        object: ExprId,
        method: &Token<'_>,
        args: Vec<ExprId>,
        loc: &Token<'_>,
    ) -> ExprId {
        let method = self.dup_token(method);
        self.make_expr(
            ExprKind::MethodCall {
                object,
                method,
                args,
            },
            loc,
        )
    }

    pub fn field_access_expr(
        &mut self,
        object: ExprId,
        field: &Token<'_>,
        loc: &Token<'_>,
    ) -> ExprId {
        let field = self.dup_token(field);
        self.make_expr(ExprKind::FieldAccess { object, field }, loc)
    }

    pub fn array_literal_expr(&mut self, elements: Vec<ExprId>, loc: &Token<'_>) -> ExprId {
        self.make_expr(ExprKind::ArrayLiteral { elements }, loc)
    }

    pub fn array_access_expr(&mut self, array: ExprId, index: ExprId, loc: &Token<'_>) -> ExprId {
        self.make_expr(ExprKind::ArrayAccess { array, index }, loc)
    }

    /// Either bound may be omitted; `a[..]` copies the whole array.
    pub fn array_slice_expr(
        &mut self,
        array: ExprId,
        start: Option<ExprId>,
        end: Option<ExprId>,
        loc: &Token<'_>,
    ) -> ExprId {
        self.make_expr(ExprKind::ArraySlice { array, start, end }, loc)
    }

    pub fn interpolated_expr(&mut self, parts: Vec<ExprId>, loc: &Token<'_>) -> ExprId {
        self.make_expr(ExprKind::Interpolated { parts }, loc)
    }

    pub fn lambda_expr(
        &mut self,
        params: Vec<Param<'arena>>,
        return_type: TypeId,
        body: Vec<StmtId>,
        loc: &Token<'_>,
    ) -> ExprId {
        self.make_expr(
            ExprKind::Lambda {
                params,
                return_type,
                body,
            },
            loc,
        )
    }

    pub fn as_val_expr(&mut self, inner: ExprId, loc: &Token<'_>) -> ExprId {
        self.make_expr(ExprKind::AsVal { inner }, loc)
    }

    pub fn var_decl_stmt(
        &mut self,
        name: &Token<'_>,
        declared_type: TypeId,
        initializer: Option<ExprId>,
    ) -> StmtId {
        let name = self.dup_token(name);
        self.alloc_stmt(Stmt {
            kind: StmtKind::VarDecl {
                name,
                declared_type,
                initializer,
            },
        })
    }

    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        self.alloc_stmt(Stmt {
            kind: StmtKind::Expression { expr },
        })
    }

    pub fn return_stmt(&mut self, keyword: &Token<'_>, value: Option<ExprId>) -> StmtId {
        let keyword = self.dup_token(keyword);
        self.alloc_stmt(Stmt {
            kind: StmtKind::Return { keyword, value },
        })
    }

    pub fn if_stmt(
        &mut self,
        condition: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    ) -> StmtId {
        self.alloc_stmt(Stmt {
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    pub fn break_stmt(&mut self) -> StmtId {
        self.alloc_stmt(Stmt {
            kind: StmtKind::Break,
        })
    }

    pub fn continue_stmt(&mut self) -> StmtId {
        self.alloc_stmt(Stmt {
            kind: StmtKind::Continue,
        })
    }

    pub fn while_stmt(&mut self, condition: ExprId, body: StmtId) -> StmtId {
        self.alloc_stmt(Stmt {
            kind: StmtKind::While { condition, body },
        })
    }

    pub fn for_each_stmt(
        &mut self,
        variable: &Token<'_>,
        iterable: ExprId,
        body: StmtId,
    ) -> StmtId {
        let variable = self.dup_token(variable);
        self.alloc_stmt(Stmt {
            kind: StmtKind::ForEach {
                variable,
                iterable,
                body,
            },
        })
    }

    pub fn block_stmt(&mut self, statements: Vec<StmtId>) -> StmtId {
        self.alloc_stmt(Stmt {
            kind: StmtKind::Block { statements },
        })
    }

    pub fn function_stmt(
        &mut self,
        name: &Token<'_>,
        params: Vec<Param<'arena>>,
        return_type: TypeId,
        body: Vec<StmtId>,
        is_native: bool,
    ) -> StmtId {
        let name = self.dup_token(name);
        self.alloc_stmt(Stmt {
            kind: StmtKind::Function(FunctionDecl {
                name,
                params,
                return_type,
                body,
                is_native,
            }),
        })
    }

    pub fn struct_decl_stmt(
        &mut self,
        name: &Token<'_>,
        fields: Vec<StructField<'arena>>,
        is_native: bool,
    ) -> StmtId {
        let name = self.dup_token(name);
        self.alloc_stmt(Stmt {
            kind: StmtKind::StructDecl {
                name,
                fields,
                is_native,
            },
        })
    }

    pub fn namespace_stmt(&mut self, name: &Token<'_>, body: Vec<StmtId>) -> StmtId {
        let name = self.dup_token(name);
        self.alloc_stmt(Stmt {
            kind: StmtKind::Namespace { name, body },
        })
    }

    pub fn private_stmt(&mut self, body: Vec<StmtId>) -> StmtId {
        self.alloc_stmt(Stmt {
            kind: StmtKind::Private { body },
        })
    }

    /// The declared struct type for a struct declaration statement.
    pub fn struct_type(
        &mut self,
        name: &'arena str,
        fields: Vec<StructField<'arena>>,
        is_native: bool,
    ) -> TypeId {
        self.alloc_type(Type::Struct {
            name,
            fields,
            is_native,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    fn ident<'a>(text: &'a str) -> Token<'a> {
        Token::new(TokenKind::Identifier, text, "test.sn", 1, 1)
    }

    #[test]
    fn test_literal_factory_sets_type() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);

        let tok = ident("5");
        let id = arena.int_literal(5, &tok);
        let expr = arena.expr(id);

        assert!(expr.expr_type.is_none());
        match &expr.kind {
            ExprKind::Literal { value, ty } => {
                assert_eq!(*value, LiteralValue::Int(5));
                assert!(arena.is_primitive(*ty, Primitive::Int));
            }
            other => panic!("expected literal, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_factory_links_children() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);

        let tok = ident("+");
        let lhs = arena.int_literal(2, &tok);
        let rhs = arena.int_literal(3, &tok);
        let bin = arena.binary_expr(lhs, TokenKind::Plus, rhs, &tok);

        match &arena.expr(bin).kind {
            ExprKind::Binary { left, op, right } => {
                assert_eq!(*left, lhs);
                assert_eq!(*right, rhs);
                assert_eq!(*op, TokenKind::Plus);
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_terminator_statements() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);

        let tok = ident("return");
        let ret = arena.return_stmt(&tok, None);
        let brk = arena.break_stmt();
        let cont = arena.continue_stmt();
        let lit = arena.int_literal(1, &tok);
        let expr = arena.expr_stmt(lit);

        assert!(arena.stmt(ret).is_terminator());
        assert!(arena.stmt(brk).is_terminator());
        assert!(arena.stmt(cont).is_terminator());
        assert!(!arena.stmt(expr).is_terminator());
    }

    #[test]
    fn test_module_ordering() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);

        let mut module = Module::new("demo.sn");
        let tok = ident("x");
        let a = arena.int_literal(1, &tok);
        let b = arena.int_literal(2, &tok);
        let s1 = arena.expr_stmt(a);
        let s2 = arena.expr_stmt(b);
        module.add_statement(s1);
        module.add_statement(s2);

        assert_eq!(module.statements, vec![s1, s2]);
        assert_eq!(module.filename, "demo.sn");
    }
}
