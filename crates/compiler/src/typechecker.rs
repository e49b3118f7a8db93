//! Type checker for Sindarin
//!
//! Walks a module top-down, annotates every accepted expression with its
//! resolved type, and enforces the language rules, including the
//! native-boundary rules for raw pointers and memory qualifiers. Failures
//! record a diagnostic and a falsy module verdict; checking continues with
//! siblings so one compile surfaces multiple errors, but the failing node
//! itself is left unannotated.

use std::collections::HashSet;

use crate::arena::{AstArena, ExprId, StmtId, TypeId};
use crate::ast::{ExprKind, FunctionDecl, Module, Param, StmtKind};
use crate::error::ErrorReporter;
use crate::symbol_table::{ScopeKind, SymbolKind, SymbolTable};
use crate::token::{Token, TokenKind};
use crate::types::{MemoryQualifier, Primitive, StructField, Type};

/// Per-function memory-region tracking.
///
/// `scope_depth` counts block nesting; `private_depth` counts `private`
/// region nesting. The counters are independent and both saturate at zero
/// on underflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryContext {
    scope_depth: usize,
    private_depth: usize,
}

impl MemoryContext {
    pub fn new() -> Self {
        MemoryContext::default()
    }

    pub fn scope_depth(&self) -> usize {
        self.scope_depth
    }

    pub fn private_depth(&self) -> usize {
        self.private_depth
    }

    pub fn is_private(&self) -> bool {
        self.private_depth > 0
    }

    pub fn enter_scope(&mut self) {
        self.scope_depth += 1;
    }

    pub fn exit_scope(&mut self) {
        self.scope_depth = self.scope_depth.saturating_sub(1);
    }

    pub fn enter_private(&mut self) {
        self.private_depth += 1;
    }

    pub fn exit_private(&mut self) {
        self.private_depth = self.private_depth.saturating_sub(1);
    }
}

pub struct TypeChecker<'a, 'arena> {
    arena: &'a mut AstArena<'arena>,
    symbols: SymbolTable<'arena>,
    reporter: ErrorReporter,
    /// Names of functions declared `native`.
    natives: HashSet<String>,
    mem: MemoryContext,
    current_return: Option<TypeId>,
    in_native: bool,
    had_error: bool,
}

impl<'a, 'arena> TypeChecker<'a, 'arena> {
    pub fn new(arena: &'a mut AstArena<'arena>) -> Self {
        TypeChecker {
            arena,
            symbols: SymbolTable::new(),
            reporter: ErrorReporter::new(),
            natives: HashSet::new(),
            mem: MemoryContext::new(),
            current_return: None,
            in_native: false,
            had_error: false,
        }
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    pub fn memory_context(&self) -> &MemoryContext {
        &self.mem
    }

    /// Check a module. Returns true when no error was reported.
    pub fn check_module(&mut self, module: &Module<'arena>) -> bool {
        self.predeclare(&module.statements);
        for &stmt in &module.statements {
            self.check_stmt(stmt);
        }
        !self.had_error
    }

    fn error(&mut self, token: &Token<'_>, message: &str) {
        self.reporter.error(token.location(), message);
        self.had_error = true;
    }

    /// Declare top-level functions and structs before checking bodies so
    /// forward references resolve.
    fn predeclare(&mut self, stmts: &[StmtId]) {
        for &id in stmts {
            match self.arena.stmt(id).kind.clone() {
                StmtKind::Function(decl) => {
                    self.declare_function_symbol(&decl);
                }
                StmtKind::StructDecl {
                    name,
                    fields,
                    is_native,
                } => {
                    self.declare_struct_symbol(&name, fields, is_native);
                }
                _ => {}
            }
        }
    }

    fn declare_function_symbol(&mut self, decl: &FunctionDecl<'arena>) {
        let params: Vec<TypeId> = decl.params.iter().map(|p| p.ty).collect();
        let quals: Vec<MemoryQualifier> = decl.params.iter().map(|p| p.qualifier).collect();
        let fn_ty = self.arena.function_type(decl.return_type, params, quals);
        if decl.is_native {
            self.natives.insert(decl.name.text.to_string());
        }
        if self.symbols.lookup_current(&decl.name).is_none() {
            if let Err(e) = self.symbols.declare(&decl.name, fn_ty, SymbolKind::Function) {
                self.error(&decl.name, &e.to_string());
            }
        }
    }

    fn declare_struct_symbol(
        &mut self,
        name: &Token<'arena>,
        fields: Vec<StructField<'arena>>,
        is_native: bool,
    ) {
        let struct_ty = self.arena.struct_type(name.text, fields, is_native);
        if self.symbols.lookup_current(name).is_none() {
            if let Err(e) = self.symbols.declare(name, struct_ty, SymbolKind::Struct) {
                self.error(name, &e.to_string());
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn check_stmt(&mut self, id: StmtId) {
        let kind = self.arena.stmt(id).kind.clone();
        match kind {
            StmtKind::VarDecl {
                name,
                declared_type,
                initializer,
            } => self.check_var_decl(&name, declared_type, initializer),
            StmtKind::Expression { expr } => {
                self.check_expr(expr);
            }
            StmtKind::Return { keyword, value } => self.check_return(&keyword, value),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if let Some(ty) = self.check_expr(condition) {
                    if !self.arena.is_primitive(ty, Primitive::Bool) {
                        let tok = self.arena.expr(condition).token;
                        self.error(&tok, "if condition must be 'bool'");
                    }
                }
                self.check_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch);
                }
            }
            StmtKind::Break | StmtKind::Continue => {
                // Loop nesting is validated by the parser; nothing to type.
            }
            StmtKind::While { condition, body } => {
                if let Some(ty) = self.check_expr(condition) {
                    if !self.arena.is_primitive(ty, Primitive::Bool) {
                        let tok = self.arena.expr(condition).token;
                        self.error(&tok, "while condition must be 'bool'");
                    }
                }
                self.check_stmt(body);
            }
            StmtKind::ForEach {
                variable,
                iterable,
                body,
            } => self.check_for_each(&variable, iterable, body),
            StmtKind::Block { statements } => {
                self.symbols.open_scope(ScopeKind::Block);
                self.mem.enter_scope();
                for &stmt in &statements {
                    self.check_stmt(stmt);
                }
                self.mem.exit_scope();
                self.symbols.close_scope();
            }
            StmtKind::Function(decl) => self.check_function(&decl),
            StmtKind::StructDecl {
                name,
                fields,
                is_native,
            } => self.check_struct_decl(&name, &fields, is_native),
            StmtKind::Namespace { name, body } => self.check_namespace(&name, &body),
            StmtKind::Private { body } => {
                self.mem.enter_private();
                for &stmt in &body {
                    self.check_stmt(stmt);
                }
                self.mem.exit_private();
            }
        }
    }

    fn check_var_decl(
        &mut self,
        name: &Token<'arena>,
        declared_type: TypeId,
        initializer: Option<ExprId>,
    ) {
        if self.arena.is_pointer_type(declared_type) && !self.in_native {
            self.error(
                name,
                "pointer variables are only permitted in native functions",
            );
        }
        if let Some(init) = initializer {
            if let Some(init_ty) = self.check_expr(init) {
                if self.is_unwrapped_native_pointer(init, init_ty) {
                    let tok = self.arena.expr(init).token;
                    self.error(
                        &tok,
                        "native pointer return value requires 'as val' outside native code",
                    );
                } else if !self.can_initialize(init, init_ty, declared_type) {
                    let msg = format!(
                        "cannot initialize '{}' of type '{}' with value of type '{}'",
                        name.text,
                        self.arena.type_name(declared_type),
                        self.arena.type_name(init_ty)
                    );
                    self.error(name, &msg);
                }
            }
        }
        if let Err(e) = self
            .symbols
            .declare(name, declared_type, SymbolKind::Variable)
        {
            self.error(name, &e.to_string());
        }
    }

    /// Initialization admits the usual coercions plus array-literal
    /// element promotion toward the declared element type.
    fn can_initialize(&self, init: ExprId, init_ty: TypeId, declared: TypeId) -> bool {
        if self.arena.can_coerce(init_ty, declared) {
            return true;
        }
        // A double[] target accepts an int/double mixed literal that was
        // inferred as double[]; anything else must match exactly, so the
        // only remaining case is an array literal against the same shape.
        if let (Some(from_elem), Some(to_elem)) = (
            self.arena.array_element(init_ty),
            self.arena.array_element(declared),
        ) {
            if matches!(self.arena.expr(init).kind, ExprKind::ArrayLiteral { .. }) {
                return self.arena.can_coerce(from_elem, to_elem);
            }
        }
        false
    }

    fn check_return(&mut self, keyword: &Token<'arena>, value: Option<ExprId>) {
        let Some(expected) = self.current_return else {
            self.error(keyword, "'return' outside of a function");
            return;
        };
        match value {
            None => {
                if !self.arena.is_primitive(expected, Primitive::Void) {
                    let msg = format!(
                        "function returning '{}' must return a value",
                        self.arena.type_name(expected)
                    );
                    self.error(keyword, &msg);
                }
            }
            Some(value) => {
                if let Some(value_ty) = self.check_expr(value) {
                    if !self.arena.can_coerce(value_ty, expected) {
                        let msg = format!(
                            "return type '{}' does not match function return type '{}'",
                            self.arena.type_name(value_ty),
                            self.arena.type_name(expected)
                        );
                        self.error(keyword, &msg);
                    }
                }
            }
        }
    }

    fn check_for_each(&mut self, variable: &Token<'arena>, iterable: ExprId, body: StmtId) {
        let elem = match self.check_expr(iterable) {
            Some(ty) => match self.arena.array_element(ty) {
                Some(elem) => Some(elem),
                None => {
                    let tok = self.arena.expr(iterable).token;
                    let msg = format!(
                        "for-each iterable must be an array, found '{}'",
                        self.arena.type_name(ty)
                    );
                    self.error(&tok, &msg);
                    None
                }
            },
            None => None,
        };
        self.symbols.open_scope(ScopeKind::Block);
        self.mem.enter_scope();
        if let Some(elem) = elem {
            if let Err(e) = self.symbols.declare(variable, elem, SymbolKind::Variable) {
                self.error(variable, &e.to_string());
            }
        }
        self.check_stmt(body);
        self.mem.exit_scope();
        self.symbols.close_scope();
    }

    fn check_function(&mut self, decl: &FunctionDecl<'arena>) {
        // Nested declarations are not covered by the module predeclare;
        // declare_function_symbol skips names already in the current scope.
        self.declare_function_symbol(decl);
        self.check_params(&decl.params, decl.is_native);

        let saved_return = self.current_return;
        let saved_native = self.in_native;
        let saved_mem = self.mem;
        self.current_return = Some(decl.return_type);
        self.in_native = decl.is_native;
        self.mem = MemoryContext::new();

        self.symbols.open_scope(ScopeKind::Function);
        for param in &decl.params {
            if let Err(e) = self
                .symbols
                .declare(&param.name, param.ty, SymbolKind::Parameter)
            {
                self.error(&param.name, &e.to_string());
            }
        }
        for &stmt in &decl.body {
            self.check_stmt(stmt);
        }
        self.symbols.close_scope();

        self.current_return = saved_return;
        self.in_native = saved_native;
        self.mem = saved_mem;
    }

    fn check_params(&mut self, params: &[Param<'arena>], is_native: bool) {
        for param in params {
            match param.qualifier {
                MemoryQualifier::AsRef => {
                    let scalar = matches!(
                        self.arena.get_type(param.ty),
                        Type::Primitive(p) if p.is_scalar()
                    );
                    if !scalar {
                        let msg = format!(
                            "'as ref' is only valid on primitive parameters, not '{}'",
                            self.arena.type_name(param.ty)
                        );
                        self.error(&param.name, &msg);
                    }
                }
                MemoryQualifier::AsVal | MemoryQualifier::Default => {}
            }
            if self.arena.is_pointer_type(param.ty) && !is_native {
                self.error(
                    &param.name,
                    "pointer parameters are only permitted in native functions",
                );
            }
        }
    }

    fn check_struct_decl(
        &mut self,
        name: &Token<'arena>,
        fields: &[StructField<'arena>],
        is_native: bool,
    ) {
        for field in fields {
            if self.arena.is_pointer_type(field.ty) && !is_native {
                let msg = format!(
                    "field '{}' has pointer type; only native structs may hold pointers",
                    field.name
                );
                self.error(name, &msg);
            }
        }
        if self.symbols.lookup_current(name).is_none() {
            self.declare_struct_symbol(name, fields.to_vec(), is_native);
        }
    }

    fn check_namespace(&mut self, name: &Token<'arena>, body: &[StmtId]) {
        let void = self.arena.primitive(Primitive::Void);
        if let Err(e) = self.symbols.open_namespace(name, void) {
            self.error(name, &e.to_string());
            return;
        }
        self.predeclare(body);
        for &stmt in body {
            self.check_stmt(stmt);
        }
        self.symbols.close_namespace();
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn check_expr(&mut self, id: ExprId) -> Option<TypeId> {
        let kind = self.arena.expr(id).kind.clone();
        let token = self.arena.expr(id).token;
        let ty = match kind {
            ExprKind::Literal { ty, .. } => Some(ty),
            ExprKind::Variable { name } => self.check_variable(&name),
            ExprKind::Binary { left, op, right } => self.check_binary(&token, left, op, right),
            ExprKind::Unary { op, operand } => self.check_unary(&token, op, operand),
            ExprKind::Assign { name, value } => self.check_assign(&name, value),
            ExprKind::IndexAssign {
                array,
                index,
                value,
            } => self.check_index_assign(&token, array, index, value),
            ExprKind::Increment { operand } => self.check_step(&token, operand, "'++'"),
            ExprKind::Decrement { operand } => self.check_step(&token, operand, "'--'"),
            ExprKind::CompoundAssign { target, op, value } => {
                self.check_compound_assign(&token, target, op, value)
            }
            ExprKind::Call { name, args, .. } => self.check_call(&name, &args),
            ExprKind::MethodCall {
                object,
                method,
                args,
            } => self.check_method_call(object, &method, &args),
            ExprKind::FieldAccess { object, field } => self.check_field_access(object, &field),
            ExprKind::ArrayLiteral { elements } => self.check_array_literal(&elements),
            ExprKind::ArrayAccess { array, index } => self.check_array_access(&token, array, index),
            ExprKind::ArraySlice { array, start, end } => {
                self.check_array_slice(&token, array, start, end)
            }
            ExprKind::Interpolated { parts } => self.check_interpolated(&parts),
            ExprKind::Lambda {
                params,
                return_type,
                body,
            } => self.check_lambda(&params, return_type, &body),
            ExprKind::AsVal { inner } => {
                let inner_ty = self.check_expr(inner)?;
                match self.arena.get_type(inner_ty) {
                    Type::Pointer { pointee } => Some(*pointee),
                    _ => Some(inner_ty),
                }
            }
        }?;
        self.arena.expr_mut(id).expr_type = Some(ty);
        Some(ty)
    }

    fn check_variable(&mut self, name: &Token<'arena>) -> Option<TypeId> {
        match self.symbols.lookup(name) {
            Some(sym) => Some(sym.ty),
            None => {
                let msg = format!("unknown identifier '{}'", name.text);
                self.error(name, &msg);
                None
            }
        }
    }

    fn check_binary(
        &mut self,
        token: &Token<'arena>,
        left: ExprId,
        op: TokenKind,
        right: ExprId,
    ) -> Option<TypeId> {
        let lt = self.check_expr(left)?;
        let rt = self.check_expr(right)?;
        let left_ptr = self.arena.is_pointer_type(lt);
        let right_ptr = self.arena.is_pointer_type(rt);

        if op.is_arithmetic() {
            if left_ptr || right_ptr {
                self.error(token, "pointer arithmetic is not permitted");
                return None;
            }
            // `+` doubles as string concatenation.
            if op == TokenKind::Plus
                && self.arena.is_primitive(lt, Primitive::String)
                && self.arena.is_primitive(rt, Primitive::String)
            {
                return Some(self.arena.primitive(Primitive::String));
            }
            if !self.arena.is_numeric_type(lt) || !self.arena.is_numeric_type(rt) {
                let msg = format!(
                    "operator '{}' requires numeric operands, found '{}' and '{}'",
                    op.operator_str(),
                    self.arena.type_name(lt),
                    self.arena.type_name(rt)
                );
                self.error(token, &msg);
                return None;
            }
            let result = self.arena.binary_numeric_result(lt, rt);
            return Some(self.arena.primitive(result));
        }

        if op.is_comparison() {
            let bool_ty = self.arena.primitive(Primitive::Bool);
            let equality = matches!(op, TokenKind::EqualEqual | TokenKind::BangEqual);
            if left_ptr || right_ptr {
                // Pointers compare with pointers or nil, equality only.
                let left_ok = left_ptr || self.arena.is_primitive(lt, Primitive::Nil);
                let right_ok = right_ptr || self.arena.is_primitive(rt, Primitive::Nil);
                if !equality {
                    let msg = format!(
                        "operator '{}' is not defined for pointers",
                        op.operator_str()
                    );
                    self.error(token, &msg);
                    return None;
                }
                if !(left_ok && right_ok) {
                    self.error(token, "pointers only compare with pointers or 'nil'");
                    return None;
                }
                return Some(bool_ty);
            }
            if self.arena.is_numeric_type(lt) && self.arena.is_numeric_type(rt) {
                return Some(bool_ty);
            }
            if self.arena.type_equals(lt, rt) {
                return Some(bool_ty);
            }
            let msg = format!(
                "cannot compare '{}' with '{}'",
                self.arena.type_name(lt),
                self.arena.type_name(rt)
            );
            self.error(token, &msg);
            return None;
        }

        if matches!(op, TokenKind::AmpAmp | TokenKind::PipePipe) {
            let bool_ty = self.arena.primitive(Primitive::Bool);
            if !self.arena.is_primitive(lt, Primitive::Bool)
                || !self.arena.is_primitive(rt, Primitive::Bool)
            {
                let msg = format!(
                    "operator '{}' requires 'bool' operands",
                    op.operator_str()
                );
                self.error(token, &msg);
                return None;
            }
            return Some(bool_ty);
        }

        self.error(token, "unsupported binary operator");
        None
    }

    fn check_unary(
        &mut self,
        token: &Token<'arena>,
        op: TokenKind,
        operand: ExprId,
    ) -> Option<TypeId> {
        let ot = self.check_expr(operand)?;
        match op {
            TokenKind::Bang => {
                if !self.arena.is_primitive(ot, Primitive::Bool) {
                    self.error(token, "operator '!' requires a 'bool' operand");
                    return None;
                }
                Some(self.arena.primitive(Primitive::Bool))
            }
            TokenKind::Minus => {
                if !self.arena.is_numeric_type(ot) {
                    let msg = format!(
                        "unary '-' requires a numeric operand, found '{}'",
                        self.arena.type_name(ot)
                    );
                    self.error(token, &msg);
                    return None;
                }
                Some(ot)
            }
            _ => {
                self.error(token, "unsupported unary operator");
                None
            }
        }
    }

    fn check_assign(&mut self, name: &Token<'arena>, value: ExprId) -> Option<TypeId> {
        let target_ty = match self.symbols.lookup(name) {
            Some(sym) => sym.ty,
            None => {
                let msg = format!("unknown identifier '{}'", name.text);
                self.error(name, &msg);
                return None;
            }
        };
        let value_ty = self.check_expr(value)?;
        if self.is_unwrapped_native_pointer(value, value_ty) {
            let tok = self.arena.expr(value).token;
            self.error(
                &tok,
                "native pointer return value requires 'as val' outside native code",
            );
            return None;
        }
        if !self.arena.can_coerce(value_ty, target_ty) {
            let msg = format!(
                "cannot assign '{}' to '{}' of type '{}'",
                self.arena.type_name(value_ty),
                name.text,
                self.arena.type_name(target_ty)
            );
            self.error(name, &msg);
            return None;
        }
        Some(target_ty)
    }

    fn check_index_assign(
        &mut self,
        token: &Token<'arena>,
        array: ExprId,
        index: ExprId,
        value: ExprId,
    ) -> Option<TypeId> {
        let array_ty = self.check_expr(array)?;
        let Some(elem) = self.arena.array_element(array_ty) else {
            let msg = format!(
                "indexed assignment requires an array, found '{}'",
                self.arena.type_name(array_ty)
            );
            self.error(token, &msg);
            return None;
        };
        let index_ty = self.check_expr(index)?;
        if !self.arena.is_integer_type(index_ty) {
            self.error(token, "array index must be an integer");
            return None;
        }
        let value_ty = self.check_expr(value)?;
        if !self.arena.can_coerce(value_ty, elem) {
            let msg = format!(
                "cannot store '{}' into array of '{}'",
                self.arena.type_name(value_ty),
                self.arena.type_name(elem)
            );
            self.error(token, &msg);
            return None;
        }
        Some(elem)
    }

    fn check_step(
        &mut self,
        token: &Token<'arena>,
        operand: ExprId,
        op_name: &str,
    ) -> Option<TypeId> {
        if !self.is_addressable(operand) {
            let msg = format!("{} requires an assignable storage location", op_name);
            self.error(token, &msg);
            return None;
        }
        let ot = self.check_expr(operand)?;
        if !self.arena.is_numeric_type(ot) {
            let msg = format!("{} requires a numeric operand", op_name);
            self.error(token, &msg);
            return None;
        }
        Some(ot)
    }

    fn check_compound_assign(
        &mut self,
        token: &Token<'arena>,
        target: ExprId,
        op: TokenKind,
        value: ExprId,
    ) -> Option<TypeId> {
        if !self.is_addressable(target) {
            self.error(token, "compound assignment requires an assignable target");
            return None;
        }
        let tt = self.check_expr(target)?;
        let vt = self.check_expr(value)?;
        if self.arena.is_pointer_type(tt) || self.arena.is_pointer_type(vt) {
            self.error(token, "pointer arithmetic is not permitted");
            return None;
        }
        if !self.arena.is_numeric_type(tt) || !self.arena.is_numeric_type(vt) {
            let msg = format!(
                "operator '{}=' requires numeric operands",
                op.operator_str()
            );
            self.error(token, &msg);
            return None;
        }
        let result = self.arena.binary_numeric_result(tt, vt);
        let result_ty = self.arena.primitive(result);
        if !self.arena.can_coerce(result_ty, tt) {
            let msg = format!(
                "result of '{}' does not fit back into '{}'",
                op.operator_str(),
                self.arena.type_name(tt)
            );
            self.error(token, &msg);
            return None;
        }
        Some(tt)
    }

    fn check_call(&mut self, name: &Token<'arena>, args: &[ExprId]) -> Option<TypeId> {
        let (return_type, params, quals) = match self.symbols.lookup(name) {
            Some(sym) => match self.arena.get_type(sym.ty) {
                Type::Function {
                    return_type,
                    params,
                    param_quals,
                } => (*return_type, params.clone(), param_quals.clone()),
                _ => {
                    let msg = format!("'{}' is not a function", name.text);
                    self.error(name, &msg);
                    return None;
                }
            },
            None => {
                let msg = format!("unknown function '{}'", name.text);
                self.error(name, &msg);
                return None;
            }
        };
        if args.len() != params.len() {
            let msg = format!(
                "'{}' expects {} argument(s), found {}",
                name.text,
                params.len(),
                args.len()
            );
            self.error(name, &msg);
            return None;
        }
        let mut ok = true;
        for (i, (&arg, &param_ty)) in args.iter().zip(params.iter()).enumerate() {
            let qual = quals.get(i).copied().unwrap_or_default();
            let Some(arg_ty) = self.check_expr(arg) else {
                ok = false;
                continue;
            };
            match qual {
                MemoryQualifier::AsRef => {
                    if !self.is_addressable(arg) {
                        let tok = self.arena.expr(arg).token;
                        let msg = format!(
                            "argument {} of '{}' is passed 'as ref' and must be an addressable location",
                            i + 1,
                            name.text
                        );
                        self.error(&tok, &msg);
                        ok = false;
                    } else if !self.arena.type_equals(arg_ty, param_ty) {
                        let tok = self.arena.expr(arg).token;
                        let msg = format!(
                            "'as ref' argument must have type '{}' exactly, found '{}'",
                            self.arena.type_name(param_ty),
                            self.arena.type_name(arg_ty)
                        );
                        self.error(&tok, &msg);
                        ok = false;
                    }
                }
                _ => {
                    if !self.arena.can_coerce(arg_ty, param_ty) {
                        let tok = self.arena.expr(arg).token;
                        let msg = format!(
                            "argument {} of '{}': expected '{}', found '{}'",
                            i + 1,
                            name.text,
                            self.arena.type_name(param_ty),
                            self.arena.type_name(arg_ty)
                        );
                        self.error(&tok, &msg);
                        ok = false;
                    }
                }
            }
        }
        if !ok {
            return None;
        }
        Some(return_type)
    }

    fn check_method_call(
        &mut self,
        object: ExprId,
        method: &Token<'arena>,
        args: &[ExprId],
    ) -> Option<TypeId> {
        let object_ty = self.check_expr(object)?;
        let Some(elem) = self.arena.array_element(object_ty) else {
            let msg = format!(
                "type '{}' has no method '{}'",
                self.arena.type_name(object_ty),
                method.text
            );
            self.error(method, &msg);
            return None;
        };
        let mut arg_types = Vec::with_capacity(args.len());
        for &arg in args {
            arg_types.push(self.check_expr(arg)?);
        }
        let int_ty = self.arena.primitive(Primitive::Int);
        let bool_ty = self.arena.primitive(Primitive::Bool);
        let void_ty = self.arena.primitive(Primitive::Void);
        let string_ty = self.arena.primitive(Primitive::String);
        let is_byte_array = self.arena.is_primitive(elem, Primitive::Byte);

        let result = match (method.text, args.len()) {
            ("push", 1) => self.require_coercible(method, arg_types[0], elem).map(|_| void_ty),
            ("pop", 0) => Some(elem),
            ("clear", 0) => Some(void_ty),
            ("concat", 1) => {
                if self.arena.type_equals(arg_types[0], object_ty) {
                    Some(object_ty)
                } else {
                    self.error(method, "'concat' requires an array of the same element type");
                    None
                }
            }
            ("indexOf", 1) => self.require_coercible(method, arg_types[0], elem).map(|_| int_ty),
            ("contains", 1) => self.require_coercible(method, arg_types[0], elem).map(|_| bool_ty),
            ("clone", 0) => Some(object_ty),
            ("join", 1) => {
                if self.arena.is_primitive(arg_types[0], Primitive::String) {
                    Some(string_ty)
                } else {
                    self.error(method, "'join' separator must be a string");
                    None
                }
            }
            ("reverse", 0) => Some(void_ty),
            ("insert", 2) => {
                let elem_ok = self.require_coercible(method, arg_types[0], elem).is_some();
                let index_ok = self.arena.is_integer_type(arg_types[1]);
                if !index_ok {
                    self.error(method, "'insert' index must be an integer");
                }
                if elem_ok && index_ok { Some(void_ty) } else { None }
            }
            ("remove", 1) => {
                if self.arena.is_integer_type(arg_types[0]) {
                    Some(elem)
                } else {
                    self.error(method, "'remove' index must be an integer");
                    None
                }
            }
            ("toString", 0) | ("toStringLatin1", 0) | ("toHex", 0) | ("toBase64", 0)
                if is_byte_array =>
            {
                Some(string_ty)
            }
            _ => {
                let msg = format!(
                    "unknown method '{}' with {} argument(s) on '{}'",
                    method.text,
                    args.len(),
                    self.arena.type_name(object_ty)
                );
                self.error(method, &msg);
                None
            }
        };
        result
    }

    fn require_coercible(
        &mut self,
        method: &Token<'arena>,
        from: TypeId,
        to: TypeId,
    ) -> Option<()> {
        if self.arena.can_coerce(from, to) {
            Some(())
        } else {
            let msg = format!(
                "method '{}' expects '{}', found '{}'",
                method.text,
                self.arena.type_name(to),
                self.arena.type_name(from)
            );
            self.error(method, &msg);
            None
        }
    }

    fn check_field_access(&mut self, object: ExprId, field: &Token<'arena>) -> Option<TypeId> {
        let object_ty = self.check_expr(object)?;
        match self.arena.get_type(object_ty) {
            Type::Struct { fields, name, .. } => {
                match fields.iter().find(|f| f.name == field.text) {
                    Some(f) => Some(f.ty),
                    None => {
                        let msg = format!("struct '{}' has no field '{}'", name, field.text);
                        self.error(field, &msg);
                        None
                    }
                }
            }
            _ => {
                let msg = format!(
                    "type '{}' has no fields",
                    self.arena.type_name(object_ty)
                );
                self.error(field, &msg);
                None
            }
        }
    }

    /// Infer an array literal's type: uniform elements give `T[]`, mixed
    /// int/double promotes to `double[]`, anything else joins to `any[]`.
    fn check_array_literal(&mut self, elements: &[ExprId]) -> Option<TypeId> {
        let mut elem_types = Vec::with_capacity(elements.len());
        for &elem in elements {
            elem_types.push(self.check_expr(elem)?);
        }
        let any_ty = self.arena.primitive(Primitive::Any);
        if elem_types.is_empty() {
            return Some(self.arena.array_type(any_ty));
        }
        let first = elem_types[0];
        if elem_types.iter().all(|&t| self.arena.type_equals(t, first)) {
            return Some(self.arena.array_type(first));
        }
        let all_numeric = elem_types.iter().all(|&t| self.arena.is_numeric_type(t));
        if all_numeric {
            let double_ty = self.arena.primitive(Primitive::Double);
            return Some(self.arena.array_type(double_ty));
        }
        Some(self.arena.array_type(any_ty))
    }

    fn check_array_access(
        &mut self,
        token: &Token<'arena>,
        array: ExprId,
        index: ExprId,
    ) -> Option<TypeId> {
        let array_ty = self.check_expr(array)?;
        let Some(elem) = self.arena.array_element(array_ty) else {
            let msg = format!(
                "cannot index into '{}'",
                self.arena.type_name(array_ty)
            );
            self.error(token, &msg);
            return None;
        };
        let index_ty = self.check_expr(index)?;
        if !self.arena.is_integer_type(index_ty) {
            self.error(token, "array index must be an integer");
            return None;
        }
        Some(elem)
    }

    fn check_array_slice(
        &mut self,
        token: &Token<'arena>,
        array: ExprId,
        start: Option<ExprId>,
        end: Option<ExprId>,
    ) -> Option<TypeId> {
        let array_ty = self.check_expr(array)?;
        if !self.arena.is_array_type(array_ty) {
            let msg = format!("cannot slice '{}'", self.arena.type_name(array_ty));
            self.error(token, &msg);
            return None;
        }
        for bound in [start, end].into_iter().flatten() {
            let bound_ty = self.check_expr(bound)?;
            if !self.arena.is_integer_type(bound_ty) {
                self.error(token, "slice bounds must be integers");
                return None;
            }
        }
        Some(array_ty)
    }

    fn check_interpolated(&mut self, parts: &[ExprId]) -> Option<TypeId> {
        let mut ok = true;
        for &part in parts {
            if self.check_expr(part).is_none() {
                ok = false;
            }
        }
        if !ok {
            return None;
        }
        Some(self.arena.primitive(Primitive::String))
    }

    fn check_lambda(
        &mut self,
        params: &[Param<'arena>],
        return_type: TypeId,
        body: &[StmtId],
    ) -> Option<TypeId> {
        self.check_params(params, self.in_native);

        let saved_return = self.current_return;
        self.current_return = Some(return_type);
        self.symbols.open_scope(ScopeKind::Function);
        for param in params {
            if let Err(e) = self
                .symbols
                .declare(&param.name, param.ty, SymbolKind::Parameter)
            {
                self.error(&param.name, &e.to_string());
            }
        }
        for &stmt in body {
            self.check_stmt(stmt);
        }
        self.symbols.close_scope();
        self.current_return = saved_return;

        let param_types: Vec<TypeId> = params.iter().map(|p| p.ty).collect();
        let quals: Vec<MemoryQualifier> = params.iter().map(|p| p.qualifier).collect();
        Some(self.arena.function_type(return_type, param_types, quals))
    }

    // ------------------------------------------------------------------
    // Native-boundary helpers
    // ------------------------------------------------------------------

    /// True when `value` is a call to a native function returning a raw
    /// pointer, used outside native code without an `as val` wrapper.
    fn is_unwrapped_native_pointer(&self, value: ExprId, value_ty: TypeId) -> bool {
        if self.in_native || !self.arena.is_pointer_type(value_ty) {
            return false;
        }
        matches!(
            &self.arena.expr(value).kind,
            ExprKind::Call { name, .. } if self.natives.contains(name.text)
        )
    }

    /// Addressable storage locations: variables, field accesses and index
    /// accesses. General expressions are not addressable.
    fn is_addressable(&self, expr: ExprId) -> bool {
        matches!(
            self.arena.expr(expr).kind,
            ExprKind::Variable { .. } | ExprKind::FieldAccess { .. } | ExprKind::ArrayAccess { .. }
        )
    }
}
