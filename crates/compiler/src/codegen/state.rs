//! CodeGen state and shared helpers
//!
//! Holds the generator struct plus the small mechanisms the emitters
//! share: arena temp-handle tracking, the loop-counter stack, native
//! operator selection, C type mapping and name mangling.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::arena::{AstArena, ExprId, TypeId};
use crate::ast::{ExprKind, FunctionDecl, StmtKind};
use crate::arena::StmtId;
use crate::config::{ArithmeticMode, CompilerConfig};
use crate::token::TokenKind;
use crate::types::{Primitive, Type};

pub struct CodeGen<'a, 'arena> {
    pub(super) arena: &'a AstArena<'arena>,
    pub(super) config: &'a CompilerConfig,
    pub(super) out: String,
    pub(super) indent: usize,
    /// Mangled name of the function currently being emitted.
    pub(super) current_function: Option<String>,
    /// Name of the arena handle parameter in the current function, when it
    /// has one.
    pub(super) current_arena_var: Option<String>,
    /// Whether expressions should emit runtime handles (`RtHandleV2 *`)
    /// instead of raw pinned pointers. Saved and restored around each
    /// subexpression so siblings see a consistent mode.
    pub(super) expr_as_handle: bool,
    /// Temp handle names appended during the current statement.
    pub(super) arena_temps: Vec<String>,
    pub(super) arena_temp_serial: usize,
    /// Generated loop counter names, innermost last.
    pub(super) loop_counters: Vec<String>,
    pub(super) loop_counter_serial: usize,
    /// Hoisted lambda function definitions.
    pub(super) lambda_defs: String,
    pub(super) lambda_serial: usize,
    pub(super) literal_serial: usize,
    pub(super) cond_serial: usize,
    /// Whether each known function takes an arena parameter, by source name.
    pub(super) fn_needs_arena: HashMap<String, bool>,
    /// Parameters of the current function, for tail-call rewriting.
    pub(super) current_params: Vec<(String, TypeId)>,
    /// Label emitted at function entry when a self tail call exists.
    pub(super) tail_label_used: bool,
    /// Return type of the function being emitted.
    pub(super) current_return_type: Option<TypeId>,
}

impl<'a, 'arena> CodeGen<'a, 'arena> {
    pub fn new(arena: &'a AstArena<'arena>, config: &'a CompilerConfig) -> Self {
        CodeGen {
            arena,
            config,
            out: String::new(),
            indent: 0,
            current_function: None,
            current_arena_var: None,
            expr_as_handle: false,
            arena_temps: Vec::new(),
            arena_temp_serial: 0,
            loop_counters: Vec::new(),
            loop_counter_serial: 0,
            lambda_defs: String::new(),
            lambda_serial: 0,
            literal_serial: 0,
            cond_serial: 0,
            fn_needs_arena: HashMap::new(),
            current_params: Vec::new(),
            tail_label_used: false,
            current_return_type: None,
        }
    }

    pub(super) fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub(super) fn arena_var(&self) -> String {
        self.current_arena_var
            .clone()
            .unwrap_or_else(|| "NULL".to_string())
    }

    // ------------------------------------------------------------------
    // Arena temp handles
    // ------------------------------------------------------------------

    /// Hoist a handle-producing expression into a named temp at the
    /// current indent and track it for the enclosing statement. At file
    /// scope there is nowhere to pre-declare, so the expression is
    /// returned inline.
    pub(super) fn emit_arena_temp(&mut self, expr_str: &str) -> String {
        if self.current_function.is_none() {
            return expr_str.to_string();
        }
        let name = format!("__htmp_{}__", self.arena_temp_serial);
        self.arena_temp_serial += 1;
        let decl = format!("RtHandleV2 *{} = {};", name, expr_str);
        self.line(&decl);
        self.arena_temps.push(name.clone());
        name
    }

    /// Number of temps currently tracked; statements save this on entry.
    pub(super) fn temp_save(&self) -> usize {
        self.arena_temps.len()
    }

    /// Free the temps appended since `saved`. Called after a statement
    /// completes when no consumer adopted its temps; temps belonging to
    /// an enclosing statement stay tracked so they are released on every
    /// path, not just the one taken.
    pub(super) fn flush_arena_temps_from(&mut self, saved: usize) {
        if self.current_arena_var.is_none() {
            self.arena_temps.truncate(saved);
            return;
        }
        let temps = self.arena_temps.split_off(saved);
        for temp in &temps {
            let free = format!("rt_arena_v2_free({});", temp);
            self.line(&free);
        }
    }

    /// Drop tracking for temps appended since `saved`; a consumer (var
    /// decl, return value, assignment) owns them now and they must not be
    /// freed here.
    pub(super) fn adopt_arena_temps_from(&mut self, saved: usize) {
        self.arena_temps.truncate(saved);
    }

    // ------------------------------------------------------------------
    // Loop counter stack
    // ------------------------------------------------------------------

    pub(super) fn next_loop_counter(&mut self) -> String {
        let name = format!("__idx_{}__", self.loop_counter_serial);
        self.loop_counter_serial += 1;
        name
    }

    pub(super) fn push_loop_counter(&mut self, name: &str) {
        self.loop_counters.push(name.to_string());
    }

    pub(super) fn pop_loop_counter(&mut self) {
        self.loop_counters.pop();
    }

    pub(super) fn is_tracked_loop_counter(&self, name: Option<&str>) -> bool {
        match name {
            Some(name) => self.loop_counters.iter().any(|c| c == name),
            None => false,
        }
    }

    pub(super) fn loop_counter_count(&self) -> usize {
        self.loop_counters.len()
    }

    // ------------------------------------------------------------------
    // Native arithmetic
    // ------------------------------------------------------------------

    /// Operators with a usable native C form. Division and modulo always
    /// go through the runtime, which performs the zero check and error
    /// report.
    pub(super) fn can_use_native_operator(op: TokenKind) -> bool {
        matches!(
            op,
            TokenKind::Plus | TokenKind::Minus | TokenKind::Star
        ) || op.is_comparison()
    }

    pub(super) fn native_c_operator(op: TokenKind) -> Option<&'static str> {
        match op {
            TokenKind::Plus => Some("+"),
            TokenKind::Minus => Some("-"),
            TokenKind::Star => Some("*"),
            TokenKind::Slash => Some("/"),
            TokenKind::Modulo => Some("%"),
            TokenKind::EqualEqual => Some("=="),
            TokenKind::BangEqual => Some("!="),
            TokenKind::Less => Some("<"),
            TokenKind::LessEqual => Some("<="),
            TokenKind::Greater => Some(">"),
            TokenKind::GreaterEqual => Some(">="),
            _ => None,
        }
    }

    /// Inline arithmetic, only in unchecked mode and only for operators
    /// with a native form. Returns None when the runtime must be called.
    pub(super) fn gen_native_arithmetic(
        &self,
        lhs: &str,
        rhs: &str,
        op: TokenKind,
        _ty: TypeId,
    ) -> Option<String> {
        if self.config.arithmetic_mode == ArithmeticMode::Checked {
            return None;
        }
        if !Self::can_use_native_operator(op) {
            return None;
        }
        let c_op = Self::native_c_operator(op)?;
        Some(format!("({} {} {})", lhs, c_op, rhs))
    }

    // ------------------------------------------------------------------
    // Arena requirement analysis
    // ------------------------------------------------------------------

    /// Types whose values live in runtime-managed storage.
    pub(super) fn type_allocates(&self, ty: TypeId) -> bool {
        matches!(
            self.arena.get_type(ty),
            Type::Primitive(Primitive::String)
                | Type::Array { .. }
                | Type::Struct { .. }
                | Type::Function { .. }
        )
    }

    /// Whether evaluating this expression allocates runtime objects.
    pub(super) fn expr_needs_arena(&self, id: ExprId) -> bool {
        match &self.arena.expr(id).kind {
            ExprKind::ArrayLiteral { .. }
            | ExprKind::Interpolated { .. }
            | ExprKind::ArraySlice { .. }
            | ExprKind::Lambda { .. } => true,
            ExprKind::MethodCall { .. } => true,
            ExprKind::Binary { left, op, right } => {
                // String `+` allocates the concatenated result.
                let concat = *op == TokenKind::Plus
                    && self
                        .arena
                        .expr(*left)
                        .expr_type
                        .is_some_and(|t| self.is_string_type(t));
                concat || self.expr_needs_arena(*left) || self.expr_needs_arena(*right)
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::Increment { operand }
            | ExprKind::Decrement { operand } => self.expr_needs_arena(*operand),
            ExprKind::Assign { value, .. } => self.expr_needs_arena(*value),
            ExprKind::IndexAssign {
                array,
                index,
                value,
            } => {
                self.expr_needs_arena(*array)
                    || self.expr_needs_arena(*index)
                    || self.expr_needs_arena(*value)
            }
            ExprKind::CompoundAssign { target, value, .. } => {
                self.expr_needs_arena(*target) || self.expr_needs_arena(*value)
            }
            ExprKind::Call { args, .. } => args.iter().any(|&a| self.expr_needs_arena(a)),
            ExprKind::FieldAccess { object, .. } => self.expr_needs_arena(*object),
            ExprKind::ArrayAccess { array, index } => {
                self.expr_needs_arena(*array) || self.expr_needs_arena(*index)
            }
            ExprKind::AsVal { inner } => self.expr_needs_arena(*inner),
            ExprKind::Literal { .. } | ExprKind::Variable { .. } => false,
        }
    }

    fn stmt_needs_arena(&self, id: StmtId) -> bool {
        match &self.arena.stmt(id).kind {
            StmtKind::VarDecl {
                declared_type,
                initializer,
                ..
            } => {
                self.type_allocates(*declared_type)
                    || initializer.is_some_and(|init| self.expr_needs_arena(init))
            }
            StmtKind::Expression { expr } => self.expr_needs_arena(*expr),
            StmtKind::Return { value, .. } => value.is_some_and(|v| self.expr_needs_arena(v)),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expr_needs_arena(*condition)
                    || self.stmt_needs_arena(*then_branch)
                    || else_branch.is_some_and(|e| self.stmt_needs_arena(e))
            }
            StmtKind::While { condition, body } => {
                self.expr_needs_arena(*condition) || self.stmt_needs_arena(*body)
            }
            StmtKind::ForEach { iterable, body, .. } => {
                self.expr_needs_arena(*iterable) || self.stmt_needs_arena(*body)
            }
            StmtKind::Block { statements }
            | StmtKind::Namespace {
                body: statements, ..
            }
            | StmtKind::Private { body: statements } => {
                statements.iter().any(|&s| self.stmt_needs_arena(s))
            }
            StmtKind::Function(decl) => self.function_needs_arena(decl),
            StmtKind::Break | StmtKind::Continue | StmtKind::StructDecl { .. } => false,
        }
    }

    /// A function needs an arena handle when its return type, a parameter
    /// type, or anything in its body allocates runtime objects.
    pub(super) fn function_needs_arena(&self, decl: &FunctionDecl<'arena>) -> bool {
        if self.type_allocates(decl.return_type) {
            return true;
        }
        if decl.params.iter().any(|p| self.type_allocates(p.ty)) {
            return true;
        }
        decl.body.iter().any(|&s| self.stmt_needs_arena(s))
    }

    // ------------------------------------------------------------------
    // C type mapping and names
    // ------------------------------------------------------------------

    pub(super) fn c_type(&self, ty: TypeId) -> String {
        match self.arena.get_type(ty) {
            Type::Primitive(p) => match p {
                Primitive::Int | Primitive::Long => "int64_t".to_string(),
                Primitive::Int32 => "int32_t".to_string(),
                Primitive::Uint => "uint64_t".to_string(),
                Primitive::Uint32 => "uint32_t".to_string(),
                Primitive::Double => "double".to_string(),
                Primitive::Float => "float".to_string(),
                Primitive::Bool => "bool".to_string(),
                Primitive::Char => "char".to_string(),
                Primitive::Byte => "uint8_t".to_string(),
                Primitive::String => "RtHandleV2 *".to_string(),
                Primitive::Void => "void".to_string(),
                Primitive::Nil | Primitive::Any => "void *".to_string(),
            },
            Type::Array { .. } => "RtArray *".to_string(),
            Type::Pointer { pointee } => format!("{} *", self.c_type(*pointee).trim_end()),
            Type::Function { .. } => "void *".to_string(),
            Type::Struct { name, .. } => format!("{} *", mangle(name)),
        }
    }

    pub(super) fn is_double_type(&self, ty: TypeId) -> bool {
        matches!(
            self.arena.get_type(ty),
            Type::Primitive(Primitive::Double) | Type::Primitive(Primitive::Float)
        )
    }

    pub(super) fn is_string_type(&self, ty: TypeId) -> bool {
        matches!(
            self.arena.get_type(ty),
            Type::Primitive(Primitive::String)
        )
    }

    pub(super) fn push_lambda_def(&mut self, def: &str) {
        let _ = writeln!(self.lambda_defs, "{}", def);
    }
}

/// Mangle a Sindarin identifier into a C identifier. User symbols get the
/// `sn_` prefix so they can never collide with the runtime's reserved
/// `rt_` names.
pub(super) fn mangle(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 3);
    result.push_str("sn_");
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            result.push(c);
        } else {
            result.push('_');
        }
    }
    result
}

/// Escape a string for a C string literal.
pub(super) fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}
