//! Expression emission
//!
//! Every emitter returns a C expression string; handle-producing
//! expressions are hoisted into tracked temps by the caller's statement
//! context. `expr_as_handle` decides whether string-typed results are
//! emitted as `RtHandleV2 *` or pinned `char *`.

use crate::arena::{ExprId, TypeId};
use crate::ast::{ExprKind, LiteralValue, Param};
use crate::arena::StmtId;
use crate::token::TokenKind;
use crate::types::Primitive;

use super::state::{escape_c_string, mangle, CodeGen};

impl<'a, 'arena> CodeGen<'a, 'arena> {
    pub(super) fn gen_expr(&mut self, id: ExprId) -> String {
        let kind = self.arena.expr(id).kind.clone();
        match kind {
            ExprKind::Literal { value, ty } => self.gen_literal(value, ty),
            ExprKind::Variable { name } => name.text.to_string(),
            ExprKind::Binary { left, op, right } => self.gen_binary(left, op, right),
            ExprKind::Unary { op, operand } => {
                let operand = self.gen_expr(operand);
                match op {
                    TokenKind::Bang => format!("(!{})", operand),
                    TokenKind::Minus => format!("(-{})", operand),
                    _ => operand,
                }
            }
            ExprKind::Assign { name, value } => {
                let target_ty = self.arena.expr(value).expr_type;
                let saved = self.expr_as_handle;
                self.expr_as_handle = target_ty.is_some_and(|t| self.is_string_type(t));
                let value = self.gen_expr(value);
                self.expr_as_handle = saved;
                format!("{} = {}", name.text, value)
            }
            ExprKind::IndexAssign {
                array,
                index,
                value,
            } => {
                let elem_double = self
                    .arena
                    .expr(value)
                    .expr_type
                    .is_some_and(|t| self.is_double_type(t));
                let array = self.gen_expr(array);
                let index = self.gen_expr(index);
                let value = self.gen_expr(value);
                if elem_double {
                    format!("rt_array_set({}, {}, rt_f64_to_bits({}))", array, index, value)
                } else {
                    format!("rt_array_set({}, {}, (uint64_t)({}))", array, index, value)
                }
            }
            ExprKind::Increment { operand } => {
                let operand = self.gen_expr(operand);
                format!("({}++)", operand)
            }
            ExprKind::Decrement { operand } => {
                let operand = self.gen_expr(operand);
                format!("({}--)", operand)
            }
            ExprKind::CompoundAssign { target, op, value } => {
                self.gen_compound_assign(target, op, value)
            }
            ExprKind::Call { name, args, .. } => self.gen_call(name.text, &args),
            ExprKind::MethodCall {
                object,
                method,
                args,
            } => self.gen_method_call(id, object, method.text, &args),
            ExprKind::FieldAccess { object, field } => {
                let object = self.gen_expr(object);
                format!("{}->{}", object, field.text)
            }
            ExprKind::ArrayLiteral { elements } => self.gen_array_literal(&elements),
            ExprKind::ArrayAccess { array, index } => self.gen_array_access(id, array, index),
            ExprKind::ArraySlice { array, start, end } => {
                let array_str = self.gen_expr(array);
                let start = match start {
                    Some(start) => self.gen_expr(start),
                    None => "0".to_string(),
                };
                let end = match end {
                    Some(end) => self.gen_expr(end),
                    None => "-1".to_string(),
                };
                format!(
                    "rt_array_slice({}, {}, {}, {})",
                    self.arena_var(),
                    array_str,
                    start,
                    end
                )
            }
            ExprKind::Interpolated { parts } => self.gen_interpolated(&parts),
            ExprKind::Lambda {
                params,
                return_type,
                body,
            } => self.gen_lambda(&params, return_type, &body),
            ExprKind::AsVal { inner } => {
                let is_pointer = self
                    .arena
                    .expr(inner)
                    .expr_type
                    .is_some_and(|t| self.arena.is_pointer_type(t));
                let inner = self.gen_expr(inner);
                if is_pointer {
                    format!("(*({}))", inner)
                } else {
                    format!("({})", inner)
                }
            }
        }
    }

    fn gen_literal(&mut self, value: LiteralValue<'arena>, _ty: TypeId) -> String {
        match value {
            LiteralValue::Int(v) => {
                if v == i64::MIN {
                    // INT64_MIN has no direct literal form in C.
                    "(-9223372036854775807LL - 1)".to_string()
                } else {
                    format!("{}LL", v)
                }
            }
            LiteralValue::Double(v) => {
                let text = format!("{:?}", v);
                if text.contains('.') || text.contains('e') || text.contains("inf") {
                    text
                } else {
                    format!("{}.0", text)
                }
            }
            LiteralValue::Bool(v) => if v { "true" } else { "false" }.to_string(),
            LiteralValue::Char(c) => match c as char {
                '\'' => "'\\''".to_string(),
                '\\' => "'\\\\'".to_string(),
                '\n' => "'\\n'".to_string(),
                c => format!("'{}'", c),
            },
            LiteralValue::Str(text) => {
                let escaped = escape_c_string(text);
                if self.expr_as_handle && self.current_arena_var.is_some() {
                    let expr = format!(
                        "rt_arena_v2_strdup({}, \"{}\")",
                        self.arena_var(),
                        escaped
                    );
                    self.emit_arena_temp(&expr)
                } else {
                    format!("\"{}\"", escaped)
                }
            }
            LiteralValue::Nil => "NULL".to_string(),
        }
    }

    fn gen_binary(&mut self, left: ExprId, op: TokenKind, right: ExprId) -> String {
        let left_ty = self.arena.expr(left).expr_type;
        let is_string_concat =
            op == TokenKind::Plus && left_ty.is_some_and(|t| self.is_string_type(t));

        if is_string_concat {
            let saved = self.expr_as_handle;
            self.expr_as_handle = true;
            let l = self.gen_expr(left);
            let r = self.gen_expr(right);
            self.expr_as_handle = saved;
            let concat = format!("rt_string_concat({}, {}, {})", self.arena_var(), l, r);
            let handle = self.emit_arena_temp(&concat);
            return if self.expr_as_handle {
                handle
            } else {
                pin_handle(&handle)
            };
        }

        let saved = self.expr_as_handle;
        self.expr_as_handle = false;
        let l = self.gen_expr(left);
        let r = self.gen_expr(right);
        self.expr_as_handle = saved;

        if op.is_comparison() || matches!(op, TokenKind::AmpAmp | TokenKind::PipePipe) {
            let c_op = match op {
                TokenKind::AmpAmp => "&&",
                TokenKind::PipePipe => "||",
                other => Self::native_c_operator(other).unwrap_or("=="),
            };
            return format!("({} {} {})", l, c_op, r);
        }

        let result_ty = self
            .arena
            .expr(left)
            .expr_type
            .unwrap_or_else(|| self.arena.primitive(Primitive::Int));
        let is_double = self.is_double_type(result_ty)
            || self
                .arena
                .expr(right)
                .expr_type
                .is_some_and(|t| self.is_double_type(t));

        if let Some(native) = self.gen_native_arithmetic(&l, &r, op, result_ty) {
            return native;
        }

        let prefix = if is_double { "rt_double" } else { "rt_int" };
        let suffix = match op {
            TokenKind::Plus => "add",
            TokenKind::Minus => "sub",
            TokenKind::Star => "mul",
            TokenKind::Slash => "div",
            TokenKind::Modulo => "mod",
            _ => "add",
        };
        format!("{}_{}({}, {})", prefix, suffix, l, r)
    }

    fn gen_compound_assign(&mut self, target: ExprId, op: TokenKind, value: ExprId) -> String {
        let target_ty = self
            .arena
            .expr(target)
            .expr_type
            .unwrap_or_else(|| self.arena.primitive(Primitive::Int));
        let t = self.gen_expr(target);
        let v = self.gen_expr(value);
        if let Some(native) = self.gen_native_arithmetic(&t, &v, op, target_ty) {
            return format!("{} = {}", t, native);
        }
        let prefix = if self.is_double_type(target_ty) {
            "rt_double"
        } else {
            "rt_int"
        };
        let suffix = match op {
            TokenKind::Plus => "add",
            TokenKind::Minus => "sub",
            TokenKind::Star => "mul",
            TokenKind::Slash => "div",
            TokenKind::Modulo => "mod",
            _ => "add",
        };
        format!("{} = {}_{}({}, {})", t, prefix, suffix, t, v)
    }

    pub(super) fn gen_call(&mut self, name: &str, args: &[ExprId]) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(args.len() + 1);
        if self.fn_needs_arena.get(name).copied().unwrap_or(false) {
            parts.push(self.arena_var());
        }
        let saved = self.expr_as_handle;
        for &arg in args {
            let arg_ty = self.arena.expr(arg).expr_type;
            self.expr_as_handle = arg_ty.is_some_and(|t| self.is_string_type(t));
            parts.push(self.gen_expr(arg));
        }
        self.expr_as_handle = saved;
        format!("{}({})", mangle(name), parts.join(", "))
    }

    fn gen_array_literal(&mut self, elements: &[ExprId]) -> String {
        let serial = self.literal_serial;
        self.literal_serial += 1;
        let var = format!("__lit_{}__", serial);

        let saved = self.expr_as_handle;
        self.expr_as_handle = false;
        let mut body = format!("({{ RtArray *{} = rt_array_new({}); ", var, self.arena_var());
        for &elem in elements {
            let is_double = self
                .arena
                .expr(elem)
                .expr_type
                .is_some_and(|t| self.is_double_type(t));
            let elem_str = self.gen_expr(elem);
            if is_double {
                body.push_str(&format!(
                    "rt_array_push({}, {}, rt_f64_to_bits({})); ",
                    self.arena_var(),
                    var,
                    elem_str
                ));
            } else {
                body.push_str(&format!(
                    "rt_array_push({}, {}, (uint64_t)({})); ",
                    self.arena_var(),
                    var,
                    elem_str
                ));
            }
        }
        self.expr_as_handle = saved;
        body.push_str(&format!("{}; }})", var));
        body
    }

    fn gen_array_access(&mut self, id: ExprId, array: ExprId, index: ExprId) -> String {
        let elem_ty = self.arena.expr(id).expr_type;
        let saved = self.expr_as_handle;
        self.expr_as_handle = false;
        let array = self.gen_expr(array);
        let index = self.gen_expr(index);
        self.expr_as_handle = saved;
        match elem_ty {
            Some(ty) if self.is_double_type(ty) => {
                format!("rt_f64_from_bits(rt_array_get({}, {}))", array, index)
            }
            Some(ty) => {
                let cty = self.c_type(ty);
                format!("(({})rt_array_get({}, {}))", cty.trim_end(), array, index)
            }
            None => format!("((int64_t)rt_array_get({}, {}))", array, index),
        }
    }

    /// Interpolated strings chain `rt_string_concat` over the converted
    /// parts. The final handle is hoisted as a tracked temp; intermediate
    /// handles stay in the arena and are reclaimed in bulk.
    fn gen_interpolated(&mut self, parts: &[ExprId]) -> String {
        let arena_var = self.arena_var();
        let saved = self.expr_as_handle;
        self.expr_as_handle = true;

        let mut acc: Option<String> = None;
        for &part in parts {
            let part_ty = self.arena.expr(part).expr_type;
            let part_str = match part_ty {
                Some(ty) if self.is_string_type(ty) => self.gen_expr(part),
                Some(ty) if self.is_double_type(ty) => {
                    self.expr_as_handle = false;
                    let raw = self.gen_expr(part);
                    self.expr_as_handle = true;
                    format!("rt_double_to_string({}, {})", arena_var, raw)
                }
                Some(ty) if self.arena.is_primitive(ty, Primitive::Bool) => {
                    self.expr_as_handle = false;
                    let raw = self.gen_expr(part);
                    self.expr_as_handle = true;
                    format!("rt_bool_to_string({}, {})", arena_var, raw)
                }
                _ => {
                    self.expr_as_handle = false;
                    let raw = self.gen_expr(part);
                    self.expr_as_handle = true;
                    format!("rt_int_to_string({}, (int64_t)({}))", arena_var, raw)
                }
            };
            acc = Some(match acc {
                None => part_str,
                Some(acc) => format!("rt_string_concat({}, {}, {})", arena_var, acc, part_str),
            });
        }
        self.expr_as_handle = saved;

        let full = acc.unwrap_or_else(|| {
            format!("rt_arena_v2_strdup({}, \"\")", arena_var)
        });
        let handle = self.emit_arena_temp(&full);
        if self.expr_as_handle {
            handle
        } else {
            pin_handle(&handle)
        }
    }

    fn gen_lambda(
        &mut self,
        params: &[Param<'arena>],
        return_type: TypeId,
        body: &[StmtId],
    ) -> String {
        let serial = self.lambda_serial;
        self.lambda_serial += 1;
        let name = format!("__lambda_{}__", serial);

        let mut sig_params: Vec<String> = Vec::new();
        for param in params {
            sig_params.push(format!("{} {}", self.c_type(param.ty).trim_end(), param.name.text));
        }
        if sig_params.is_empty() {
            sig_params.push("void".to_string());
        }

        // Generate the lambda body into a side buffer, then hoist it as a
        // file-scope function definition.
        let saved_out = std::mem::take(&mut self.out);
        let saved_indent = self.indent;
        let saved_fn = self.current_function.clone();
        self.indent = 0;
        self.current_function = Some(name.clone());
        self.line(&format!(
            "static {} {}({}) {{",
            self.c_type(return_type).trim_end(),
            name,
            sig_params.join(", ")
        ));
        self.indent = 1;
        for &stmt in body {
            self.gen_statement(stmt);
        }
        self.indent = 0;
        self.line("}");
        let def = std::mem::replace(&mut self.out, saved_out);
        self.indent = saved_indent;
        self.current_function = saved_fn;
        self.push_lambda_def(&def);

        format!("(void *){}", name)
    }
}

/// Pin a handle and produce the raw `char *` view.
pub(super) fn pin_handle(handle: &str) -> String {
    format!(
        "({{ RtHandleV2 *__pin = {}; rt_handle_v2_pin(__pin); (char *)__pin->ptr; }})",
        handle
    )
}
