//! Expression-level optimizer for Sindarin
//!
//! Rewrites the AST in place after type checking: constant folding (with
//! two's-complement wrap on integer overflow), unary folding, algebraic
//! no-op removal, unreachable-statement removal, unused-variable
//! elimination, string-literal merging and tail-call marking. Division and
//! modulo by a literal zero are never folded; they must survive to runtime
//! for diagnosis. Per-pass counters are kept for testing.

use std::collections::HashSet;

use crate::arena::{AstArena, ExprId, StmtId};
use crate::ast::{ExprKind, LiteralValue, Module, StmtKind};
use crate::token::TokenKind;
use crate::types::Primitive;

/// Counters reported by one optimizer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizerStats {
    pub statements_removed: usize,
    pub variables_removed: usize,
    pub noops_simplified: usize,
    pub strings_merged: usize,
    pub tail_calls_marked: usize,
}

pub struct Optimizer<'a, 'arena> {
    arena: &'a mut AstArena<'arena>,
    stats: OptimizerStats,
}

impl<'a, 'arena> Optimizer<'a, 'arena> {
    pub fn new(arena: &'a mut AstArena<'arena>) -> Self {
        Optimizer {
            arena,
            stats: OptimizerStats::default(),
        }
    }

    pub fn stats(&self) -> &OptimizerStats {
        &self.stats
    }

    /// Run all passes over every function in the module.
    pub fn optimize_module(&mut self, module: &Module<'arena>) {
        for &stmt in &module.statements {
            self.optimize_top_level(stmt);
        }
    }

    fn optimize_top_level(&mut self, id: StmtId) {
        match self.arena.stmt(id).kind.clone() {
            StmtKind::Function(_) => self.optimize_function_stmt(id),
            StmtKind::Namespace { body, .. } | StmtKind::Private { body } => {
                for &stmt in &body {
                    self.optimize_top_level(stmt);
                }
            }
            _ => self.fold_stmt(id),
        }
    }

    /// Optimize one function declaration statement.
    pub fn optimize_function_stmt(&mut self, id: StmtId) {
        let (name, mut body) = match &mut self.arena.stmt_mut(id).kind {
            StmtKind::Function(decl) => (decl.name, std::mem::take(&mut decl.body)),
            _ => return,
        };

        for &stmt in &body {
            self.fold_stmt(stmt);
        }
        self.stats.statements_removed += self.remove_unreachable_in(&mut body);
        self.eliminate_unused_variables(&mut body);
        self.stats.tail_calls_marked += self.mark_tail_calls(name.text, &body);

        if let StmtKind::Function(decl) = &mut self.arena.stmt_mut(id).kind {
            decl.body = body;
        }
    }

    // ------------------------------------------------------------------
    // Expression folding
    // ------------------------------------------------------------------

    fn fold_stmt(&mut self, id: StmtId) {
        match self.arena.stmt(id).kind.clone() {
            StmtKind::VarDecl {
                initializer: Some(init),
                ..
            } => self.fold_expr(init),
            StmtKind::VarDecl { .. } | StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Expression { expr } => self.fold_expr(expr),
            StmtKind::Return { value, .. } => {
                if let Some(value) = value {
                    self.fold_expr(value);
                }
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.fold_expr(condition);
                self.fold_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.fold_stmt(else_branch);
                }
            }
            StmtKind::While { condition, body } => {
                self.fold_expr(condition);
                self.fold_stmt(body);
            }
            StmtKind::ForEach { iterable, body, .. } => {
                self.fold_expr(iterable);
                self.fold_stmt(body);
            }
            StmtKind::Block { statements }
            | StmtKind::Namespace {
                body: statements, ..
            }
            | StmtKind::Private { body: statements } => {
                for &stmt in &statements {
                    self.fold_stmt(stmt);
                }
            }
            StmtKind::Function(_) => self.optimize_function_stmt(id),
            StmtKind::StructDecl { .. } => {}
        }
    }

    fn fold_expr(&mut self, id: ExprId) {
        match self.arena.expr(id).kind.clone() {
            ExprKind::Binary { left, op, right } => {
                self.fold_expr(left);
                self.fold_expr(right);
                self.fold_binary(id, left, op, right);
            }
            ExprKind::Unary { op, operand } => {
                self.fold_expr(operand);
                self.fold_unary(id, op, operand);
            }
            ExprKind::Assign { value, .. } => self.fold_expr(value),
            ExprKind::IndexAssign {
                array,
                index,
                value,
            } => {
                self.fold_expr(array);
                self.fold_expr(index);
                self.fold_expr(value);
            }
            ExprKind::Increment { operand } | ExprKind::Decrement { operand } => {
                self.fold_expr(operand)
            }
            ExprKind::CompoundAssign { target, value, .. } => {
                self.fold_expr(target);
                self.fold_expr(value);
            }
            ExprKind::Call { args, .. } => {
                for &arg in &args {
                    self.fold_expr(arg);
                }
            }
            ExprKind::MethodCall { object, args, .. } => {
                self.fold_expr(object);
                for &arg in &args {
                    self.fold_expr(arg);
                }
            }
            ExprKind::FieldAccess { object, .. } => self.fold_expr(object),
            ExprKind::ArrayLiteral { elements } => {
                for &elem in &elements {
                    self.fold_expr(elem);
                }
            }
            ExprKind::ArrayAccess { array, index } => {
                self.fold_expr(array);
                self.fold_expr(index);
            }
            ExprKind::ArraySlice { array, start, end } => {
                self.fold_expr(array);
                if let Some(start) = start {
                    self.fold_expr(start);
                }
                if let Some(end) = end {
                    self.fold_expr(end);
                }
            }
            ExprKind::Interpolated { parts } => {
                for &part in &parts {
                    self.fold_expr(part);
                }
                self.merge_interpolated_parts(id, parts);
            }
            ExprKind::Lambda { body, .. } => {
                for &stmt in &body {
                    self.fold_stmt(stmt);
                }
            }
            ExprKind::AsVal { inner } => self.fold_expr(inner),
            ExprKind::Literal { .. } | ExprKind::Variable { .. } => {}
        }
    }

    fn fold_binary(&mut self, id: ExprId, left: ExprId, op: TokenKind, right: ExprId) {
        // Pure string concatenation over two literals collapses first.
        if op == TokenKind::Plus {
            if let (Some(l), Some(r)) = (self.string_literal_text(left), self.string_literal_text(right)) {
                let merged = self.arena.dup_str(&format!("{}{}", l, r));
                let string_ty = self.arena.primitive(Primitive::String);
                let expr = self.arena.expr_mut(id);
                expr.kind = ExprKind::Literal {
                    value: LiteralValue::Str(merged),
                    ty: string_ty,
                };
                expr.expr_type = Some(string_ty);
                self.stats.strings_merged += 1;
                return;
            }
        }

        if op.is_arithmetic() {
            if let Some((value, is_long)) = self.try_fold_constant(left, op, right) {
                let ty = match value {
                    FoldedValue::Int(_) if is_long => self.arena.primitive(Primitive::Long),
                    FoldedValue::Int(_) => self.arena.primitive(Primitive::Int),
                    FoldedValue::Double(_) => self.arena.primitive(Primitive::Double),
                };
                let literal = match value {
                    FoldedValue::Int(v) => LiteralValue::Int(v),
                    FoldedValue::Double(v) => LiteralValue::Double(v),
                };
                let expr = self.arena.expr_mut(id);
                expr.kind = ExprKind::Literal { value: literal, ty };
                expr.expr_type = Some(ty);
                return;
            }
        }

        // Algebraic no-ops: x+0, 0+x, x-0, x*1, 1*x, x/1.
        // x*0 is left alone; x may have side effects.
        let simplified = match op {
            TokenKind::Plus if self.is_literal_zero(right) => Some(left),
            TokenKind::Plus if self.is_literal_zero(left) => Some(right),
            TokenKind::Minus if self.is_literal_zero(right) => Some(left),
            TokenKind::Star if self.is_literal_one(right) => Some(left),
            TokenKind::Star if self.is_literal_one(left) => Some(right),
            TokenKind::Slash if self.is_literal_one(right) => Some(left),
            _ => None,
        };
        if let Some(keep) = simplified {
            self.replace_with(id, keep);
            self.stats.noops_simplified += 1;
        }
    }

    fn fold_unary(&mut self, id: ExprId, op: TokenKind, operand: ExprId) {
        // Double negation: !(!x) and -(-x) reduce to x.
        if let ExprKind::Unary {
            op: inner_op,
            operand: inner,
        } = self.arena.expr(operand).kind
        {
            if inner_op == op && matches!(op, TokenKind::Bang | TokenKind::Minus) {
                self.replace_with(id, inner);
                self.stats.noops_simplified += 1;
                return;
            }
        }

        if let ExprKind::Literal { value, ty } = self.arena.expr(operand).kind {
            let folded = match (op, value) {
                (TokenKind::Minus, LiteralValue::Int(v)) => Some(LiteralValue::Int(v.wrapping_neg())),
                (TokenKind::Minus, LiteralValue::Double(v)) => Some(LiteralValue::Double(-v)),
                (TokenKind::Bang, LiteralValue::Bool(v)) => Some(LiteralValue::Bool(!v)),
                _ => None,
            };
            if let Some(folded) = folded {
                let expr = self.arena.expr_mut(id);
                expr.kind = ExprKind::Literal { value: folded, ty };
                expr.expr_type = Some(ty);
            }
        }
    }

    /// Replace the node at `id` with a copy of the node at `source`.
    fn replace_with(&mut self, id: ExprId, source: ExprId) {
        let replacement = self.arena.expr(source).clone();
        *self.arena.expr_mut(id) = replacement;
    }

    // ------------------------------------------------------------------
    // Literal helpers
    // ------------------------------------------------------------------

    fn numeric_literal(&self, id: ExprId) -> Option<(LiteralValue<'arena>, bool)> {
        match self.arena.expr(id).kind {
            ExprKind::Literal { value, ty } => {
                let is_long = self.arena.is_primitive(ty, Primitive::Long);
                match value {
                    LiteralValue::Int(_) | LiteralValue::Double(_) => Some((value, is_long)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn is_literal_zero(&self, id: ExprId) -> bool {
        match self.numeric_literal(id) {
            Some((LiteralValue::Int(0), _)) => true,
            Some((LiteralValue::Double(v), _)) => v == 0.0,
            _ => false,
        }
    }

    fn is_literal_one(&self, id: ExprId) -> bool {
        match self.numeric_literal(id) {
            Some((LiteralValue::Int(1), _)) => true,
            Some((LiteralValue::Double(v), _)) => v == 1.0,
            _ => false,
        }
    }

    fn string_literal_text(&self, id: ExprId) -> Option<&'arena str> {
        match self.arena.expr(id).kind {
            ExprKind::Literal {
                value: LiteralValue::Str(text),
                ..
            } => Some(text),
            _ => None,
        }
    }

    /// Fold a binary over two numeric literals. Integer overflow wraps
    /// two's-complement; division and modulo by a literal zero are never
    /// folded (for doubles included) so the runtime can diagnose them.
    fn try_fold_constant(
        &self,
        left: ExprId,
        op: TokenKind,
        right: ExprId,
    ) -> Option<(FoldedValue, bool)> {
        let (lv, l_long) = self.numeric_literal(left)?;
        let (rv, r_long) = self.numeric_literal(right)?;
        let is_long = l_long || r_long;

        let is_double = matches!(lv, LiteralValue::Double(_)) || matches!(rv, LiteralValue::Double(_));
        if is_double {
            let l = match lv {
                LiteralValue::Int(v) => v as f64,
                LiteralValue::Double(v) => v,
                _ => return None,
            };
            let r = match rv {
                LiteralValue::Int(v) => v as f64,
                LiteralValue::Double(v) => v,
                _ => return None,
            };
            if matches!(op, TokenKind::Slash | TokenKind::Modulo) && r == 0.0 {
                return None;
            }
            let value = match op {
                TokenKind::Plus => l + r,
                TokenKind::Minus => l - r,
                TokenKind::Star => l * r,
                TokenKind::Slash => l / r,
                TokenKind::Modulo => l % r,
                _ => return None,
            };
            return Some((FoldedValue::Double(value), false));
        }

        let (LiteralValue::Int(l), LiteralValue::Int(r)) = (lv, rv) else {
            return None;
        };
        if matches!(op, TokenKind::Slash | TokenKind::Modulo) && r == 0 {
            return None;
        }
        let value = match op {
            TokenKind::Plus => l.wrapping_add(r),
            TokenKind::Minus => l.wrapping_sub(r),
            TokenKind::Star => l.wrapping_mul(r),
            TokenKind::Slash => l.wrapping_div(r),
            TokenKind::Modulo => l.wrapping_rem(r),
            _ => return None,
        };
        Some((FoldedValue::Int(value), is_long))
    }

    // ------------------------------------------------------------------
    // String-literal merging
    // ------------------------------------------------------------------

    /// Collapse runs of adjacent string-typed literal parts into single
    /// literals. Non-string parts break runs and are never merged across.
    fn merge_interpolated_parts(&mut self, id: ExprId, parts: Vec<ExprId>) {
        let mut merged: Vec<ExprId> = Vec::with_capacity(parts.len());
        let mut merges = 0usize;

        for part in parts {
            let text = self.string_literal_text(part);
            match (text, merged.last().copied()) {
                (Some(text), Some(prev)) if self.string_literal_text(prev).is_some() => {
                    let prev_text = self.string_literal_text(prev).unwrap();
                    let combined = self.arena.dup_str(&format!("{}{}", prev_text, text));
                    let string_ty = self.arena.primitive(Primitive::String);
                    let expr = self.arena.expr_mut(prev);
                    expr.kind = ExprKind::Literal {
                        value: LiteralValue::Str(combined),
                        ty: string_ty,
                    };
                    expr.expr_type = Some(string_ty);
                    merges += 1;
                }
                _ => merged.push(part),
            }
        }

        if merges > 0 {
            if let ExprKind::Interpolated { parts } = &mut self.arena.expr_mut(id).kind {
                *parts = merged;
            }
            self.stats.strings_merged += merges;
        }
    }

    // ------------------------------------------------------------------
    // Unreachable-statement removal
    // ------------------------------------------------------------------

    /// Remove statements after the first terminator in each block,
    /// recursively. Returns the number of statements removed.
    fn remove_unreachable_in(&mut self, stmts: &mut Vec<StmtId>) -> usize {
        let mut removed = 0;
        if let Some(pos) = stmts
            .iter()
            .position(|&s| self.arena.stmt(s).is_terminator())
        {
            removed += stmts.len() - pos - 1;
            stmts.truncate(pos + 1);
        }
        for &stmt in stmts.iter() {
            removed += self.remove_unreachable_nested(stmt);
        }
        removed
    }

    fn remove_unreachable_nested(&mut self, id: StmtId) -> usize {
        match self.arena.stmt(id).kind.clone() {
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                let mut removed = self.remove_unreachable_nested(then_branch);
                if let Some(else_branch) = else_branch {
                    removed += self.remove_unreachable_nested(else_branch);
                }
                removed
            }
            StmtKind::While { body, .. } | StmtKind::ForEach { body, .. } => {
                self.remove_unreachable_nested(body)
            }
            StmtKind::Block { .. } | StmtKind::Private { .. } => {
                let mut list = match &mut self.arena.stmt_mut(id).kind {
                    StmtKind::Block { statements } => std::mem::take(statements),
                    StmtKind::Private { body } => std::mem::take(body),
                    _ => unreachable!(),
                };
                let removed = self.remove_unreachable_in(&mut list);
                match &mut self.arena.stmt_mut(id).kind {
                    StmtKind::Block { statements } => *statements = list,
                    StmtKind::Private { body } => *body = list,
                    _ => unreachable!(),
                }
                removed
            }
            _ => 0,
        }
    }

    // ------------------------------------------------------------------
    // Unused-variable elimination
    // ------------------------------------------------------------------

    fn eliminate_unused_variables(&mut self, body: &mut Vec<StmtId>) {
        let mut used = HashSet::new();
        for &stmt in body.iter() {
            self.collect_used_names(stmt, &mut used);
        }
        self.remove_unused_decls(body, &used);
    }

    /// Identifier uses are collected conservatively across the entire
    /// function body, all branches included.
    fn collect_used_names(&self, id: StmtId, used: &mut HashSet<String>) {
        match &self.arena.stmt(id).kind {
            StmtKind::VarDecl { initializer, .. } => {
                if let Some(init) = initializer {
                    self.collect_expr_names(*init, used);
                }
            }
            StmtKind::Expression { expr } => self.collect_expr_names(*expr, used),
            StmtKind::Return { value, .. } => {
                if let Some(value) = value {
                    self.collect_expr_names(*value, used);
                }
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.collect_expr_names(*condition, used);
                self.collect_used_names(*then_branch, used);
                if let Some(else_branch) = else_branch {
                    self.collect_used_names(*else_branch, used);
                }
            }
            StmtKind::While { condition, body } => {
                self.collect_expr_names(*condition, used);
                self.collect_used_names(*body, used);
            }
            StmtKind::ForEach { iterable, body, .. } => {
                self.collect_expr_names(*iterable, used);
                self.collect_used_names(*body, used);
            }
            StmtKind::Block { statements }
            | StmtKind::Namespace {
                body: statements, ..
            }
            | StmtKind::Private { body: statements } => {
                for &stmt in statements {
                    self.collect_used_names(stmt, used);
                }
            }
            StmtKind::Function(decl) => {
                for &stmt in &decl.body {
                    self.collect_used_names(stmt, used);
                }
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::StructDecl { .. } => {}
        }
    }

    fn collect_expr_names(&self, id: ExprId, used: &mut HashSet<String>) {
        match &self.arena.expr(id).kind {
            ExprKind::Variable { name } => {
                used.insert(name.text.to_string());
            }
            ExprKind::Assign { name, value } => {
                used.insert(name.text.to_string());
                self.collect_expr_names(*value, used);
            }
            ExprKind::Binary { left, right, .. } => {
                self.collect_expr_names(*left, used);
                self.collect_expr_names(*right, used);
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::Increment { operand }
            | ExprKind::Decrement { operand } => self.collect_expr_names(*operand, used),
            ExprKind::IndexAssign {
                array,
                index,
                value,
            } => {
                self.collect_expr_names(*array, used);
                self.collect_expr_names(*index, used);
                self.collect_expr_names(*value, used);
            }
            ExprKind::CompoundAssign { target, value, .. } => {
                self.collect_expr_names(*target, used);
                self.collect_expr_names(*value, used);
            }
            ExprKind::Call { args, .. } => {
                for &arg in args {
                    self.collect_expr_names(arg, used);
                }
            }
            ExprKind::MethodCall { object, args, .. } => {
                self.collect_expr_names(*object, used);
                for &arg in args {
                    self.collect_expr_names(arg, used);
                }
            }
            ExprKind::FieldAccess { object, .. } => self.collect_expr_names(*object, used),
            ExprKind::ArrayLiteral { elements } => {
                for &elem in elements {
                    self.collect_expr_names(elem, used);
                }
            }
            ExprKind::ArrayAccess { array, index } => {
                self.collect_expr_names(*array, used);
                self.collect_expr_names(*index, used);
            }
            ExprKind::ArraySlice { array, start, end } => {
                self.collect_expr_names(*array, used);
                if let Some(start) = start {
                    self.collect_expr_names(*start, used);
                }
                if let Some(end) = end {
                    self.collect_expr_names(*end, used);
                }
            }
            ExprKind::Interpolated { parts } => {
                for &part in parts {
                    self.collect_expr_names(part, used);
                }
            }
            ExprKind::Lambda { body, .. } => {
                for &stmt in body {
                    self.collect_used_names(stmt, used);
                }
            }
            ExprKind::AsVal { inner } => self.collect_expr_names(*inner, used),
            ExprKind::Literal { .. } => {}
        }
    }

    fn remove_unused_decls(&mut self, stmts: &mut Vec<StmtId>, used: &HashSet<String>) {
        let mut kept = Vec::with_capacity(stmts.len());
        for &stmt in stmts.iter() {
            if let StmtKind::VarDecl { name, .. } = &self.arena.stmt(stmt).kind {
                if !used.contains(name.text) {
                    self.stats.variables_removed += 1;
                    continue;
                }
            }
            kept.push(stmt);
        }
        *stmts = kept;

        for i in 0..stmts.len() {
            let id = stmts[i];
            match self.arena.stmt(id).kind.clone() {
                StmtKind::Block { .. } | StmtKind::Private { .. } => {
                    let mut list = match &mut self.arena.stmt_mut(id).kind {
                        StmtKind::Block { statements } => std::mem::take(statements),
                        StmtKind::Private { body } => std::mem::take(body),
                        _ => unreachable!(),
                    };
                    self.remove_unused_decls(&mut list, used);
                    match &mut self.arena.stmt_mut(id).kind {
                        StmtKind::Block { statements } => *statements = list,
                        StmtKind::Private { body } => *body = list,
                        _ => unreachable!(),
                    }
                }
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Tail-call marking
    // ------------------------------------------------------------------

    /// Mark calls that are the direct value of a `return` and call the
    /// enclosing function by name. No combiner may sit between the return
    /// and the call.
    fn mark_tail_calls(&mut self, fn_name: &str, stmts: &[StmtId]) -> usize {
        let mut marked = 0;
        for &stmt in stmts {
            marked += self.mark_tail_calls_stmt(fn_name, stmt);
        }
        marked
    }

    fn mark_tail_calls_stmt(&mut self, fn_name: &str, id: StmtId) -> usize {
        match self.arena.stmt(id).kind.clone() {
            StmtKind::Return {
                value: Some(value), ..
            } => {
                let should_mark = matches!(
                    &self.arena.expr(value).kind,
                    ExprKind::Call {
                        name,
                        is_tail_call: false,
                        ..
                    } if name.text == fn_name
                );
                if should_mark {
                    if let ExprKind::Call { is_tail_call, .. } =
                        &mut self.arena.expr_mut(value).kind
                    {
                        *is_tail_call = true;
                    }
                    return 1;
                }
                0
            }
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                let mut marked = self.mark_tail_calls_stmt(fn_name, then_branch);
                if let Some(else_branch) = else_branch {
                    marked += self.mark_tail_calls_stmt(fn_name, else_branch);
                }
                marked
            }
            StmtKind::While { body, .. } | StmtKind::ForEach { body, .. } => {
                self.mark_tail_calls_stmt(fn_name, body)
            }
            StmtKind::Block { statements } | StmtKind::Private { body: statements } => {
                self.mark_tail_calls(fn_name, &statements)
            }
            _ => 0,
        }
    }
}

/// Result of folding a binary constant expression.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FoldedValue {
    Int(i64),
    Double(f64),
}
