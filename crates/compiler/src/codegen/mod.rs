//! C code generation for Sindarin
//!
//! Walks a checked, optimized module and emits C source that delegates
//! arrays, strings and concurrency to the runtime (`rt_*` identifiers —
//! the generator itself never defines a name with that prefix). Handle
//! lifetime around a statement follows a save/flush/adopt protocol:
//! `temp_save` on entry, subexpressions append temps, and the statement
//! either flushes (frees) them or a consumer adopts them. Both flushing
//! and adoption are scoped to the statement's own save point, so a
//! nested statement never releases an enclosing statement's pending
//! temps.

mod expr;
mod methods;
mod state;

pub use state::CodeGen;

use crate::arena::StmtId;
use crate::ast::{ExprKind, FunctionDecl, Module, StmtKind};
use crate::types::{Primitive, StructField};

use state::mangle;

impl<'a, 'arena> CodeGen<'a, 'arena> {
    /// Emit a complete C translation unit for the module.
    pub fn generate_module(&mut self, module: &Module<'arena>) -> Result<String, String> {
        let mut functions: Vec<StmtId> = Vec::new();
        let mut structs: Vec<StmtId> = Vec::new();
        self.collect_definitions(&module.statements, &mut functions, &mut structs);

        // Pre-pass: decide which functions carry an arena handle.
        for &id in &functions {
            let entry = match &self.arena.stmt(id).kind {
                StmtKind::Function(decl) => {
                    (decl.name.text.to_string(), self.function_needs_arena(decl))
                }
                _ => continue,
            };
            self.fn_needs_arena.insert(entry.0, entry.1);
        }

        // Bodies are generated first so hoisted lambdas can be placed
        // ahead of them in the final output.
        for &id in &functions {
            self.gen_function(id);
        }
        let bodies = std::mem::take(&mut self.out);

        let mut output = String::new();
        output.push_str("/* Generated by the Sindarin compiler. Do not edit. */\n");
        output.push_str(&format!("/* source: {} */\n\n", module.filename));
        output.push_str("#include <stdint.h>\n");
        output.push_str("#include <stdbool.h>\n");
        output.push_str("#include <stddef.h>\n");
        output.push_str("#include \"sindarin_rt.h\"\n\n");

        for &id in &structs {
            if let StmtKind::StructDecl { name, fields, .. } = &self.arena.stmt(id).kind {
                output.push_str(&self.struct_typedef(name.text, fields));
            }
        }

        for &id in &functions {
            if let StmtKind::Function(decl) = &self.arena.stmt(id).kind {
                output.push_str(&format!("{};\n", self.function_signature(decl)));
            }
        }
        output.push('\n');

        if !self.lambda_defs.is_empty() {
            output.push_str(&self.lambda_defs.clone());
            output.push('\n');
        }

        output.push_str(&bodies);

        let main_decl = functions.iter().find_map(|&id| match &self.arena.stmt(id).kind {
            StmtKind::Function(decl) if decl.name.text == "main" => Some(decl.clone()),
            _ => None,
        });
        if let Some(decl) = main_decl {
            output.push_str(&self.main_glue(&decl));
        }

        Ok(output)
    }

    fn collect_definitions(
        &self,
        stmts: &[StmtId],
        functions: &mut Vec<StmtId>,
        structs: &mut Vec<StmtId>,
    ) {
        for &id in stmts {
            match &self.arena.stmt(id).kind {
                StmtKind::Function(_) => functions.push(id),
                StmtKind::StructDecl { .. } => structs.push(id),
                StmtKind::Namespace { body, .. } | StmtKind::Private { body } => {
                    self.collect_definitions(body, functions, structs)
                }
                _ => {}
            }
        }
    }

    fn struct_typedef(&self, name: &str, fields: &[StructField<'arena>]) -> String {
        let c_name = mangle(name);
        let mut out = format!("typedef struct {} {{\n", c_name);
        for field in fields {
            out.push_str(&format!(
                "    {} {};\n",
                self.c_type(field.ty).trim_end(),
                field.name
            ));
        }
        out.push_str(&format!("}} {};\n\n", c_name));
        out
    }

    fn function_signature(&self, decl: &FunctionDecl<'arena>) -> String {
        let needs_arena = self
            .fn_needs_arena
            .get(decl.name.text)
            .copied()
            .unwrap_or(false);
        let mut params: Vec<String> = Vec::new();
        if needs_arena {
            params.push("RtArenaV2 *__arena__".to_string());
        }
        for param in &decl.params {
            params.push(format!(
                "{} {}",
                self.c_type(param.ty).trim_end(),
                param.name.text
            ));
        }
        if params.is_empty() {
            params.push("void".to_string());
        }
        format!(
            "static {} {}({})",
            self.c_type(decl.return_type).trim_end(),
            mangle(decl.name.text),
            params.join(", ")
        )
    }

    fn gen_function(&mut self, id: StmtId) {
        let decl = match &self.arena.stmt(id).kind {
            StmtKind::Function(decl) => decl.clone(),
            _ => return,
        };
        if decl.is_native && decl.body.is_empty() {
            // Bodiless native declarations bind to external C symbols.
            return;
        }
        let needs_arena = self
            .fn_needs_arena
            .get(decl.name.text)
            .copied()
            .unwrap_or(false);

        let signature = self.function_signature(&decl);
        self.line(&format!("{} {{", signature));
        self.indent += 1;

        self.current_function = Some(mangle(decl.name.text));
        self.current_arena_var = needs_arena.then(|| "__arena__".to_string());
        self.current_return_type = Some(decl.return_type);
        self.current_params = decl
            .params
            .iter()
            .map(|p| (p.name.text.to_string(), p.ty))
            .collect();
        self.tail_label_used = self.body_has_tail_call(&decl.body);

        self.line("rt_safepoint_poll();");
        if self.tail_label_used {
            self.line("sn_tail_start:;");
        }
        for &stmt in &decl.body {
            self.gen_statement(stmt);
        }

        self.indent -= 1;
        self.line("}");
        self.line("");

        self.current_function = None;
        self.current_arena_var = None;
        self.current_return_type = None;
        self.current_params.clear();
        self.tail_label_used = false;
    }

    fn body_has_tail_call(&self, stmts: &[StmtId]) -> bool {
        stmts.iter().any(|&s| self.stmt_has_tail_call(s))
    }

    fn stmt_has_tail_call(&self, id: StmtId) -> bool {
        match &self.arena.stmt(id).kind {
            StmtKind::Return {
                value: Some(value), ..
            } => matches!(
                self.arena.expr(*value).kind,
                ExprKind::Call {
                    is_tail_call: true,
                    ..
                }
            ),
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.stmt_has_tail_call(*then_branch)
                    || else_branch.is_some_and(|e| self.stmt_has_tail_call(e))
            }
            StmtKind::While { body, .. } | StmtKind::ForEach { body, .. } => {
                self.stmt_has_tail_call(*body)
            }
            StmtKind::Block { statements } | StmtKind::Private { body: statements } => {
                self.body_has_tail_call(statements)
            }
            _ => false,
        }
    }

    pub(super) fn gen_statement(&mut self, id: StmtId) {
        let kind = self.arena.stmt(id).kind.clone();
        match kind {
            StmtKind::VarDecl {
                name,
                declared_type,
                initializer,
            } => {
                let save = self.temp_save();
                let cty = self.c_type(declared_type);
                match initializer {
                    Some(init) => {
                        let saved_mode = self.expr_as_handle;
                        self.expr_as_handle = self.is_string_type(declared_type);
                        let init_str = self.gen_expr(init);
                        self.expr_as_handle = saved_mode;
                        self.line(&format!("{} {} = {};", cty.trim_end(), name.text, init_str));
                    }
                    None if self.type_allocates(declared_type) => {
                        self.line(&format!("{} {} = NULL;", cty.trim_end(), name.text));
                    }
                    None => {
                        self.line(&format!("{} {} = 0;", cty.trim_end(), name.text));
                    }
                }
                // The declaration owns any handle its initializer produced.
                self.adopt_arena_temps_from(save);
            }
            StmtKind::Expression { expr } => {
                let save = self.temp_save();
                let s = self.gen_expr(expr);
                self.line(&format!("(void)({});", s));
                self.flush_arena_temps_from(save);
            }
            StmtKind::Return { value, .. } => {
                let save = self.temp_save();
                match value {
                    Some(value) => {
                        if let ExprKind::Call {
                            args,
                            is_tail_call: true,
                            ..
                        } = self.arena.expr(value).kind.clone()
                        {
                            self.gen_tail_jump(&args, save);
                            return;
                        }
                        let saved_mode = self.expr_as_handle;
                        self.expr_as_handle = self
                            .current_return_type
                            .is_some_and(|t| self.is_string_type(t));
                        let s = self.gen_expr(value);
                        self.expr_as_handle = saved_mode;
                        // The return value adopts its temps.
                        self.adopt_arena_temps_from(save);
                        self.line(&format!("return {};", s));
                    }
                    None => self.line("return;"),
                }
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let save = self.temp_save();
                let cond = self.gen_expr(condition);
                self.line(&format!("if ({}) {{", cond));
                self.indent += 1;
                self.gen_statement(then_branch);
                self.indent -= 1;
                match else_branch {
                    Some(else_branch) => {
                        self.line("} else {");
                        self.indent += 1;
                        self.gen_statement(else_branch);
                        self.indent -= 1;
                        self.line("}");
                    }
                    None => self.line("}"),
                }
                self.flush_arena_temps_from(save);
            }
            StmtKind::Break => self.line("break;"),
            StmtKind::Continue => self.line("continue;"),
            StmtKind::While { condition, body } => self.gen_while(condition, body),
            StmtKind::ForEach {
                variable,
                iterable,
                body,
            } => self.gen_for_each(&variable.text, iterable, body),
            StmtKind::Block { statements } => {
                self.line("{");
                self.indent += 1;
                for &stmt in &statements {
                    self.gen_statement(stmt);
                }
                self.indent -= 1;
                self.line("}");
            }
            StmtKind::Private { body } => {
                for &stmt in &body {
                    self.gen_statement(stmt);
                }
            }
            // Functions, structs and namespaces are emitted at file scope.
            StmtKind::Function(_) | StmtKind::StructDecl { .. } | StmtKind::Namespace { .. } => {}
        }
    }

    /// Emit a while loop. A condition with no runtime allocations keeps
    /// the plain `while (...)` form. A condition that hoists arena temps
    /// must be re-evaluated every iteration, so it is lowered to a
    /// `for (;;)` whose first statements recompute the condition into a
    /// local, free the iteration's temps, and break when it is false.
    fn gen_while(&mut self, condition: crate::arena::ExprId, body: StmtId) {
        if !self.expr_needs_arena(condition) {
            let save = self.temp_save();
            let cond = self.gen_expr(condition);
            self.line(&format!("while ({}) {{", cond));
            self.indent += 1;
            self.gen_statement(body);
            self.line("rt_safepoint_poll();");
            self.indent -= 1;
            self.line("}");
            self.flush_arena_temps_from(save);
            return;
        }

        let serial = self.cond_serial;
        self.cond_serial += 1;
        let cond_var = format!("__cond_{}__", serial);

        self.line("for (;;) {");
        self.indent += 1;
        let save = self.temp_save();
        let cond = self.gen_expr(condition);
        self.line(&format!("bool {} = {};", cond_var, cond));
        self.flush_arena_temps_from(save);
        self.line(&format!("if (!{}) {{", cond_var));
        self.indent += 1;
        self.line("break;");
        self.indent -= 1;
        self.line("}");
        self.gen_statement(body);
        self.line("rt_safepoint_poll();");
        self.indent -= 1;
        self.line("}");
    }

    fn gen_for_each(&mut self, var_name: &str, iterable: crate::arena::ExprId, body: StmtId) {
        let serial = self.loop_counter_serial;
        let counter = self.next_loop_counter();
        let seq = format!("__seq_{}__", serial);

        let save = self.temp_save();
        let iter_str = self.gen_expr(iterable);
        self.line(&format!("RtArray *{} = {};", seq, iter_str));

        let elem_ty = self
            .arena
            .expr(iterable)
            .expr_type
            .and_then(|t| self.arena.array_element(t));

        self.push_loop_counter(&counter);
        self.line(&format!(
            "for (int64_t {c} = 0; {c} < rt_array_len({s}); {c}++) {{",
            c = counter,
            s = seq
        ));
        self.indent += 1;
        let get = format!("rt_array_get({}, {})", seq, counter);
        let (cty, value) = match elem_ty {
            Some(ty) if self.is_double_type(ty) => {
                ("double".to_string(), format!("rt_f64_from_bits({})", get))
            }
            Some(ty) => {
                let cty = self.c_type(ty);
                let value = format!("(({}){})", cty.trim_end(), get);
                (cty, value)
            }
            None => ("int64_t".to_string(), format!("(int64_t){}", get)),
        };
        self.line(&format!("{} {} = {};", cty.trim_end(), var_name, value));
        self.gen_statement(body);
        self.line("rt_safepoint_poll();");
        self.indent -= 1;
        self.line("}");
        self.pop_loop_counter();
        self.flush_arena_temps_from(save);
    }

    /// Lower a marked self tail call into parameter reassignment plus a
    /// jump back to the function entry.
    fn gen_tail_jump(&mut self, args: &[crate::arena::ExprId], save: usize) {
        if args.len() != self.current_params.len() {
            // Arity mismatches never pass the checker; emit nothing.
            return;
        }
        let mut assignments = Vec::with_capacity(args.len());
        for (i, &arg) in args.iter().enumerate() {
            let (param_name, param_ty) = self.current_params[i].clone();
            let cty = self.c_type(param_ty);
            let value = self.gen_expr(arg);
            let tmp = format!("__tc_{}__", i);
            self.line(&format!("{} {} = {};", cty.trim_end(), tmp, value));
            assignments.push((param_name, tmp));
        }
        for (param_name, tmp) in assignments {
            self.line(&format!("{} = {};", param_name, tmp));
        }
        self.flush_arena_temps_from(save);
        self.line("goto sn_tail_start;");
    }

    fn main_glue(&self, decl: &FunctionDecl<'arena>) -> String {
        let needs_arena = self
            .fn_needs_arena
            .get("main")
            .copied()
            .unwrap_or(false);
        let returns_value = !self
            .arena
            .is_primitive(decl.return_type, Primitive::Void);

        let mut out = String::new();
        out.push_str("int main(int argc, char **argv) {\n");
        out.push_str("    (void)argc;\n");
        out.push_str("    (void)argv;\n");
        out.push_str("    rt_safepoint_init();\n");
        out.push_str("    rt_safepoint_thread_register();\n");
        if needs_arena {
            out.push_str("    RtArenaV2 *__arena__ = rt_arena_v2_create();\n");
        }
        let call = if needs_arena {
            "sn_main(__arena__)"
        } else {
            "sn_main()"
        };
        if returns_value {
            out.push_str(&format!("    int64_t __status__ = {};\n", call));
        } else {
            out.push_str(&format!("    {};\n", call));
        }
        if needs_arena {
            out.push_str("    rt_arena_v2_destroy(__arena__);\n");
        }
        out.push_str("    rt_safepoint_thread_deregister();\n");
        if returns_value {
            out.push_str("    return (int)__status__;\n");
        } else {
            out.push_str("    return 0;\n");
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::AstArena;
    use crate::ast::Param;
    use crate::config::{ArithmeticMode, CompilerConfig};
    use crate::token::{Token, TokenKind};
    use crate::typechecker::TypeChecker;
    use bumpalo::Bump;

    fn ident<'a>(text: &'a str) -> Token<'a> {
        Token::new(TokenKind::Identifier, text, "test.sn", 1, 1)
    }

    #[test]
    fn test_loop_counter_push_pop() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);

        assert!(!r#gen.is_tracked_loop_counter(Some("__idx_0__")));
        assert!(!r#gen.is_tracked_loop_counter(Some("i")));
        assert_eq!(r#gen.loop_counter_count(), 0);

        r#gen.push_loop_counter("__idx_0__");
        assert_eq!(r#gen.loop_counter_count(), 1);
        assert!(r#gen.is_tracked_loop_counter(Some("__idx_0__")));
        assert!(!r#gen.is_tracked_loop_counter(Some("__idx_1__")));

        r#gen.push_loop_counter("__idx_1__");
        assert_eq!(r#gen.loop_counter_count(), 2);
        assert!(r#gen.is_tracked_loop_counter(Some("__idx_0__")));
        assert!(r#gen.is_tracked_loop_counter(Some("__idx_1__")));

        r#gen.pop_loop_counter();
        assert_eq!(r#gen.loop_counter_count(), 1);
        assert!(!r#gen.is_tracked_loop_counter(Some("__idx_1__")));

        r#gen.pop_loop_counter();
        assert_eq!(r#gen.loop_counter_count(), 0);

        // Popping an empty stack is safe.
        r#gen.pop_loop_counter();
        assert_eq!(r#gen.loop_counter_count(), 0);
    }

    #[test]
    fn test_loop_counter_stack_growth() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);

        let names: Vec<String> = (0..20).map(|i| format!("__idx_{}__", i)).collect();
        for name in &names {
            r#gen.push_loop_counter(name);
        }
        assert_eq!(r#gen.loop_counter_count(), 20);
        for name in &names {
            assert!(r#gen.is_tracked_loop_counter(Some(name)));
        }
        assert!(!r#gen.is_tracked_loop_counter(Some("__idx_99__")));

        for _ in 0..20 {
            r#gen.pop_loop_counter();
        }
        assert_eq!(r#gen.loop_counter_count(), 0);
    }

    #[test]
    fn test_loop_counter_none_is_never_tracked() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);

        assert!(!r#gen.is_tracked_loop_counter(None));
        r#gen.push_loop_counter("__idx_0__");
        assert!(!r#gen.is_tracked_loop_counter(None));
        assert!(r#gen.is_tracked_loop_counter(Some("__idx_0__")));
    }

    #[test]
    fn test_can_use_native_operator() {
        assert!(CodeGen::can_use_native_operator(TokenKind::Plus));
        assert!(CodeGen::can_use_native_operator(TokenKind::Minus));
        assert!(CodeGen::can_use_native_operator(TokenKind::Star));
        assert!(CodeGen::can_use_native_operator(TokenKind::EqualEqual));
        assert!(CodeGen::can_use_native_operator(TokenKind::BangEqual));
        assert!(CodeGen::can_use_native_operator(TokenKind::Less));
        assert!(CodeGen::can_use_native_operator(TokenKind::LessEqual));
        assert!(CodeGen::can_use_native_operator(TokenKind::Greater));
        assert!(CodeGen::can_use_native_operator(TokenKind::GreaterEqual));

        // Division and modulo need the runtime's zero check.
        assert!(!CodeGen::can_use_native_operator(TokenKind::Slash));
        assert!(!CodeGen::can_use_native_operator(TokenKind::Modulo));

        assert!(!CodeGen::can_use_native_operator(TokenKind::Dot));
        assert!(!CodeGen::can_use_native_operator(TokenKind::Comma));
    }

    #[test]
    fn test_native_c_operator_strings() {
        assert_eq!(CodeGen::native_c_operator(TokenKind::Plus), Some("+"));
        assert_eq!(CodeGen::native_c_operator(TokenKind::Minus), Some("-"));
        assert_eq!(CodeGen::native_c_operator(TokenKind::Star), Some("*"));
        assert_eq!(CodeGen::native_c_operator(TokenKind::Slash), Some("/"));
        assert_eq!(CodeGen::native_c_operator(TokenKind::Modulo), Some("%"));
        assert_eq!(CodeGen::native_c_operator(TokenKind::EqualEqual), Some("=="));
        assert_eq!(CodeGen::native_c_operator(TokenKind::BangEqual), Some("!="));
        assert_eq!(CodeGen::native_c_operator(TokenKind::Less), Some("<"));
        assert_eq!(CodeGen::native_c_operator(TokenKind::LessEqual), Some("<="));
        assert_eq!(CodeGen::native_c_operator(TokenKind::Greater), Some(">"));
        assert_eq!(
            CodeGen::native_c_operator(TokenKind::GreaterEqual),
            Some(">=")
        );
        assert_eq!(CodeGen::native_c_operator(TokenKind::Dot), None);
    }

    #[test]
    fn test_gen_native_arithmetic_unchecked() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let int = arena.primitive(crate::types::Primitive::Int);
        let config = CompilerConfig::new().with_arithmetic_mode(ArithmeticMode::Unchecked);
        let r#gen = CodeGen::new(&arena, &config);

        let sum = r#gen.gen_native_arithmetic("5LL", "3LL", TokenKind::Plus, int);
        assert_eq!(sum.as_deref(), Some("(5LL + 3LL)"));

        let diff = r#gen.gen_native_arithmetic("10LL", "4LL", TokenKind::Minus, int);
        assert!(diff.is_some_and(|d| d.contains('-')));

        // Division returns None even unchecked; the runtime owns the zero check.
        assert!(r#gen
            .gen_native_arithmetic("20LL", "4LL", TokenKind::Slash, int)
            .is_none());
    }

    #[test]
    fn test_gen_native_arithmetic_checked_mode() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let int = arena.primitive(crate::types::Primitive::Int);
        let config = CompilerConfig::default();
        let r#gen = CodeGen::new(&arena, &config);

        assert!(r#gen
            .gen_native_arithmetic("5LL", "3LL", TokenKind::Plus, int)
            .is_none());
        assert!(r#gen
            .gen_native_arithmetic("5LL", "3LL", TokenKind::Star, int)
            .is_none());
    }

    #[test]
    fn test_arena_temp_emit_flush_adopt() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        r#gen.current_function = Some("sn_f".to_string());
        r#gen.current_arena_var = Some("__arena__".to_string());
        r#gen.indent = 1;

        let save = r#gen.temp_save();
        let name = r#gen.emit_arena_temp("rt_arena_v2_strdup(__arena__, \"x\")");
        assert_eq!(name, "__htmp_0__");
        assert!(r#gen.out.contains("RtHandleV2 *__htmp_0__ ="));
        assert_eq!(r#gen.temp_save(), save + 1);

        r#gen.flush_arena_temps_from(save);
        assert!(r#gen.out.contains("rt_arena_v2_free(__htmp_0__);"));
        assert_eq!(r#gen.temp_save(), 0);

        // Adopted temps are not freed.
        let save = r#gen.temp_save();
        r#gen.emit_arena_temp("rt_arena_v2_strdup(__arena__, \"y\")");
        r#gen.adopt_arena_temps_from(save);
        let before = r#gen.out.clone();
        r#gen.flush_arena_temps_from(save);
        assert_eq!(r#gen.out, before, "adopted temps must not be freed");
    }

    #[test]
    fn test_flush_is_scoped_to_save_point() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        r#gen.current_function = Some("sn_f".to_string());
        r#gen.current_arena_var = Some("__arena__".to_string());
        r#gen.indent = 1;

        // An outer statement hoists a temp, then a nested statement
        // hoists and flushes its own. The outer temp must stay tracked.
        let outer_save = r#gen.temp_save();
        r#gen.emit_arena_temp("rt_arena_v2_strdup(__arena__, \"outer\")");
        let inner_save = r#gen.temp_save();
        r#gen.emit_arena_temp("rt_arena_v2_strdup(__arena__, \"inner\")");
        r#gen.flush_arena_temps_from(inner_save);

        assert!(r#gen.out.contains("rt_arena_v2_free(__htmp_1__);"));
        assert!(!r#gen.out.contains("rt_arena_v2_free(__htmp_0__);"));
        assert_eq!(r#gen.temp_save(), outer_save + 1);

        r#gen.flush_arena_temps_from(outer_save);
        assert!(r#gen.out.contains("rt_arena_v2_free(__htmp_0__);"));
        assert_eq!(r#gen.temp_save(), 0);
    }

    #[test]
    fn test_arena_temp_at_file_scope_stays_inline() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);

        let result = r#gen.emit_arena_temp("rt_arena_v2_strdup(NULL, \"x\")");
        assert_eq!(result, "rt_arena_v2_strdup(NULL, \"x\")");
        assert_eq!(r#gen.temp_save(), 0);
    }

    /// fn add(a: int, b: int) -> int => return a + b
    fn add_module<'arena>(arena: &mut AstArena<'arena>) -> Module<'arena> {
        let int = arena.primitive(crate::types::Primitive::Int);
        let a = Param {
            name: arena.dup_token(&ident("a")),
            ty: int,
            qualifier: Default::default(),
        };
        let b = Param {
            name: arena.dup_token(&ident("b")),
            ty: int,
            qualifier: Default::default(),
        };
        let a_ref = arena.variable_expr(&ident("a"), &ident("a"));
        let b_ref = arena.variable_expr(&ident("b"), &ident("b"));
        let sum = arena.binary_expr(a_ref, TokenKind::Plus, b_ref, &ident("+"));
        let ret = arena.return_stmt(&ident("return"), Some(sum));
        let f = arena.function_stmt(&ident("add"), vec![a, b], int, vec![ret], false);
        let mut module = Module::new("test.sn");
        module.add_statement(f);
        module
    }

    #[test]
    fn test_function_needs_arena_primitives_only() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let module = add_module(&mut arena);
        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::default();
        let r#gen = CodeGen::new(&arena, &config);
        match &arena.stmt(module.statements[0]).kind {
            StmtKind::Function(decl) => assert!(!r#gen.function_needs_arena(decl)),
            _ => panic!("function expected"),
        }
    }

    #[test]
    fn test_function_needs_arena_string_return() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let string_ty = arena.primitive(crate::types::Primitive::String);

        let hello = arena.string_literal("hello", &ident("hello"));
        let ret = arena.return_stmt(&ident("return"), Some(hello));
        let f = arena.function_stmt(&ident("get_string"), Vec::new(), string_ty, vec![ret], false);
        let mut module = Module::new("test.sn");
        module.add_statement(f);

        let config = CompilerConfig::default();
        let r#gen = CodeGen::new(&arena, &config);
        match &arena.stmt(module.statements[0]).kind {
            StmtKind::Function(decl) => assert!(r#gen.function_needs_arena(decl)),
            _ => panic!("function expected"),
        }
    }

    #[test]
    fn test_expr_needs_arena_kinds() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let int = arena.primitive(crate::types::Primitive::Int);

        let lit = arena.int_literal(42, &ident("42"));
        let var = arena.variable_expr(&ident("x"), &ident("x"));
        let arr = arena.array_literal_expr(Vec::new(), &ident("["));
        let interp = arena.interpolated_expr(Vec::new(), &ident("$"));
        let slice_src = arena.variable_expr(&ident("xs"), &ident("xs"));
        let slice = arena.array_slice_expr(slice_src, None, None, &ident("["));
        let lambda = arena.lambda_expr(Vec::new(), int, Vec::new(), &ident("fn"));

        let config = CompilerConfig::default();
        let r#gen = CodeGen::new(&arena, &config);
        assert!(!r#gen.expr_needs_arena(lit));
        assert!(!r#gen.expr_needs_arena(var));
        assert!(r#gen.expr_needs_arena(arr));
        assert!(r#gen.expr_needs_arena(interp));
        assert!(r#gen.expr_needs_arena(slice));
        assert!(r#gen.expr_needs_arena(lambda));
    }

    #[test]
    fn test_generate_add_checked_calls_runtime() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let module = add_module(&mut arena);
        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();

        assert!(output.contains("static int64_t sn_add(int64_t a, int64_t b)"));
        assert!(output.contains("rt_int_add(a, b)"));
        assert!(output.contains("#include \"sindarin_rt.h\""));
    }

    #[test]
    fn test_generate_add_unchecked_inlines_operator() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let module = add_module(&mut arena);
        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::new().with_arithmetic_mode(ArithmeticMode::Unchecked);
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();

        assert!(output.contains("(a + b)"));
        assert!(!output.contains("rt_int_add"));
    }

    #[test]
    fn test_division_always_calls_runtime() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let int = arena.primitive(crate::types::Primitive::Int);

        let a = Param {
            name: arena.dup_token(&ident("a")),
            ty: int,
            qualifier: Default::default(),
        };
        let b = Param {
            name: arena.dup_token(&ident("b")),
            ty: int,
            qualifier: Default::default(),
        };
        let a_ref = arena.variable_expr(&ident("a"), &ident("a"));
        let b_ref = arena.variable_expr(&ident("b"), &ident("b"));
        let quot = arena.binary_expr(a_ref, TokenKind::Slash, b_ref, &ident("/"));
        let ret = arena.return_stmt(&ident("return"), Some(quot));
        let f = arena.function_stmt(&ident("quotient"), vec![a, b], int, vec![ret], false);
        let mut module = Module::new("test.sn");
        module.add_statement(f);

        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::new().with_arithmetic_mode(ArithmeticMode::Unchecked);
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();
        assert!(output.contains("rt_int_div(a, b)"));
    }

    #[test]
    fn test_main_glue_registers_with_safepoint() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let int = arena.primitive(crate::types::Primitive::Int);

        let zero = arena.int_literal(0, &ident("0"));
        let ret = arena.return_stmt(&ident("return"), Some(zero));
        let f = arena.function_stmt(&ident("main"), Vec::new(), int, vec![ret], false);
        let mut module = Module::new("test.sn");
        module.add_statement(f);

        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();

        assert!(output.contains("rt_safepoint_init();"));
        assert!(output.contains("rt_safepoint_thread_register();"));
        assert!(output.contains("rt_safepoint_thread_deregister();"));
        assert!(output.contains("int main(int argc, char **argv)"));
    }

    #[test]
    fn test_while_loop_polls_safepoint() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let int = arena.primitive(crate::types::Primitive::Int);

        // var i = 0; while true => i = i + 1
        let zero = arena.int_literal(0, &ident("0"));
        let decl = arena.var_decl_stmt(&ident("i"), int, Some(zero));
        let cond = arena.bool_literal(true, &ident("true"));
        let i_ref = arena.variable_expr(&ident("i"), &ident("i"));
        let one = arena.int_literal(1, &ident("1"));
        let sum = arena.binary_expr(i_ref, TokenKind::Plus, one, &ident("+"));
        let assign = arena.assign_expr(&ident("i"), sum, &ident("i"));
        let body_stmt = arena.expr_stmt(assign);
        let body = arena.block_stmt(vec![body_stmt]);
        let while_stmt = arena.while_stmt(cond, body);
        let void = arena.primitive(crate::types::Primitive::Void);
        let f = arena.function_stmt(
            &ident("spin"),
            Vec::new(),
            void,
            vec![decl, while_stmt],
            false,
        );
        let mut module = Module::new("test.sn");
        module.add_statement(f);

        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();

        // One poll at entry, one at the loop back edge.
        assert!(output.matches("rt_safepoint_poll();").count() >= 2);
        assert!(output.contains("while ("));
    }

    #[test]
    fn test_allocating_while_condition_reevaluates_each_iteration() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let byte = arena.primitive(crate::types::Primitive::Byte);
        let bytes_ty = arena.array_type(byte);
        let void = arena.primitive(crate::types::Primitive::Void);

        // while data.toHex() == "00" => {}
        let nil = arena.nil_literal(&ident("nil"));
        let decl = arena.var_decl_stmt(&ident("data"), bytes_ty, Some(nil));
        let obj = arena.variable_expr(&ident("data"), &ident("data"));
        let hex = arena.method_call_expr(obj, &ident("toHex"), Vec::new(), &ident("toHex"));
        let zero = arena.string_literal("00", &ident("00"));
        let cond = arena.binary_expr(hex, TokenKind::EqualEqual, zero, &ident("=="));
        let body = arena.block_stmt(Vec::new());
        let while_stmt = arena.while_stmt(cond, body);
        let f = arena.function_stmt(
            &ident("wait_for_data"),
            Vec::new(),
            void,
            vec![decl, while_stmt],
            false,
        );
        let mut module = Module::new("test.sn");
        module.add_statement(f);

        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();

        // The condition allocates, so the loop lowers to a re-evaluating
        // form: the hex encoding runs inside the loop, before the exit
        // test, and its temp is freed every iteration.
        let loop_start = output.find("for (;;) {").expect("re-evaluating loop form");
        let hex_call = output.find("rt_byte_array_to_hex").unwrap();
        let temp_free = output.find("rt_arena_v2_free(").unwrap();
        let exit_test = output.find("if (!__cond_0__)").expect("condition local");
        assert!(hex_call > loop_start);
        assert!(temp_free > hex_call);
        assert!(exit_test > temp_free);
        assert!(output.contains("bool __cond_0__ ="));
        assert!(output.contains("break;"));
    }

    #[test]
    fn test_branch_flush_keeps_outer_condition_temp() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let byte = arena.primitive(crate::types::Primitive::Byte);
        let bytes_ty = arena.array_type(byte);
        let void = arena.primitive(crate::types::Primitive::Void);

        // if data.toHex() == "00" => data.toBase64()
        let nil = arena.nil_literal(&ident("nil"));
        let decl = arena.var_decl_stmt(&ident("data"), bytes_ty, Some(nil));
        let obj1 = arena.variable_expr(&ident("data"), &ident("data"));
        let hex = arena.method_call_expr(obj1, &ident("toHex"), Vec::new(), &ident("toHex"));
        let zero = arena.string_literal("00", &ident("00"));
        let cond = arena.binary_expr(hex, TokenKind::EqualEqual, zero, &ident("=="));
        let obj2 = arena.variable_expr(&ident("data"), &ident("data"));
        let b64 =
            arena.method_call_expr(obj2, &ident("toBase64"), Vec::new(), &ident("toBase64"));
        let branch = arena.expr_stmt(b64);
        let if_stmt = arena.if_stmt(cond, branch, None);
        let f = arena.function_stmt(
            &ident("inspect"),
            Vec::new(),
            void,
            vec![decl, if_stmt],
            false,
        );
        let mut module = Module::new("test.sn");
        module.add_statement(f);

        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();

        // The branch statement frees only its own temp; the condition's
        // temp is freed after the whole if statement, on every path.
        let inner_free = output.find("rt_arena_v2_free(__htmp_1__);").unwrap();
        let outer_free = output.find("rt_arena_v2_free(__htmp_0__);").unwrap();
        assert!(inner_free < outer_free);
        assert_eq!(output.matches("rt_arena_v2_free(__htmp_0__);").count(), 1);
    }

    #[test]
    fn test_byte_array_method_dispatch() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let byte = arena.primitive(crate::types::Primitive::Byte);
        let bytes_ty = arena.array_type(byte);
        let string_ty = arena.primitive(crate::types::Primitive::String);

        let nil = arena.nil_literal(&ident("nil"));
        let decl = arena.var_decl_stmt(&ident("data"), bytes_ty, Some(nil));
        let obj = arena.variable_expr(&ident("data"), &ident("data"));
        let hex = arena.method_call_expr(obj, &ident("toHex"), Vec::new(), &ident("toHex"));
        let ret = arena.return_stmt(&ident("return"), Some(hex));
        let f = arena.function_stmt(&ident("dump"), Vec::new(), string_ty, vec![decl, ret], false);
        let mut module = Module::new("test.sn");
        module.add_statement(f);

        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();

        assert!(output.contains("rt_byte_array_to_hex(__arena__, data)"));
    }

    #[test]
    fn test_array_push_dispatch() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let int = arena.primitive(crate::types::Primitive::Int);
        let ints_ty = arena.array_type(int);
        let void = arena.primitive(crate::types::Primitive::Void);

        let nil = arena.nil_literal(&ident("nil"));
        let decl = arena.var_decl_stmt(&ident("xs"), ints_ty, Some(nil));
        let obj = arena.variable_expr(&ident("xs"), &ident("xs"));
        let value = arena.int_literal(7, &ident("7"));
        let push = arena.method_call_expr(obj, &ident("push"), vec![value], &ident("push"));
        let stmt = arena.expr_stmt(push);
        let f = arena.function_stmt(&ident("grow"), Vec::new(), void, vec![decl, stmt], false);
        let mut module = Module::new("test.sn");
        module.add_statement(f);

        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();

        assert!(output.contains("rt_array_push(__arena__, xs, (uint64_t)(7LL))"));
    }

    #[test]
    fn test_tail_call_lowered_to_jump() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let int = arena.primitive(crate::types::Primitive::Int);

        // fn count(n: int) -> int => if n <= 0 => return 0 ; return count(n - 1)
        let n_param = Param {
            name: arena.dup_token(&ident("n")),
            ty: int,
            qualifier: Default::default(),
        };
        let n1 = arena.variable_expr(&ident("n"), &ident("n"));
        let zero1 = arena.int_literal(0, &ident("0"));
        let cond = arena.binary_expr(n1, TokenKind::LessEqual, zero1, &ident("<="));
        let zero2 = arena.int_literal(0, &ident("0"));
        let base = arena.return_stmt(&ident("return"), Some(zero2));
        let guard = arena.if_stmt(cond, base, None);

        let n2 = arena.variable_expr(&ident("n"), &ident("n"));
        let one = arena.int_literal(1, &ident("1"));
        let dec = arena.binary_expr(n2, TokenKind::Minus, one, &ident("-"));
        let call = arena.call_expr(&ident("count"), vec![dec], &ident("count"));
        let ret = arena.return_stmt(&ident("return"), Some(call));

        let f = arena.function_stmt(&ident("count"), vec![n_param], int, vec![guard, ret], false);
        let mut module = Module::new("test.sn");
        module.add_statement(f);

        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));
        let mut opt = crate::optimizer::Optimizer::new(&mut arena);
        opt.optimize_module(&module);
        assert_eq!(opt.stats().tail_calls_marked, 1);

        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();

        assert!(output.contains("sn_tail_start:;"));
        assert!(output.contains("goto sn_tail_start;"));
    }

    #[test]
    fn test_interpolated_string_flushes_temp() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let void = arena.primitive(crate::types::Primitive::Void);

        let hello = arena.string_literal("hello ", &ident("s"));
        let n = arena.int_literal(1, &ident("1"));
        let interp = arena.interpolated_expr(vec![hello, n], &ident("$"));
        let stmt = arena.expr_stmt(interp);
        let f = arena.function_stmt(&ident("say"), Vec::new(), void, vec![stmt], false);
        let mut module = Module::new("test.sn");
        module.add_statement(f);

        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();

        // The expression statement's temps are freed after it completes.
        assert!(output.contains("RtHandleV2 *__htmp_"));
        assert!(output.contains("rt_arena_v2_free(__htmp_"));
        assert!(output.contains("rt_string_concat(__arena__,"));
    }

    #[test]
    fn test_no_generated_definitions_use_runtime_prefix() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let module = add_module(&mut arena);
        let mut checker = TypeChecker::new(&mut arena);
        assert!(checker.check_module(&module));

        let config = CompilerConfig::default();
        let mut r#gen = CodeGen::new(&arena, &config);
        let output = r#gen.generate_module(&module).unwrap();

        // Every emitted definition is sn_-prefixed; rt_ appears only as calls.
        for line in output.lines() {
            if line.starts_with("static ") {
                assert!(
                    !line.contains(" rt_"),
                    "generated definition collides with runtime prefix: {}",
                    line
                );
            }
        }
    }
}
