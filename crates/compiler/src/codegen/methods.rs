//! Method-call dispatch
//!
//! Lowers `obj.m(args)` by matching (element type, method name, arity)
//! against the known array and byte-array methods and emitting the
//! matching runtime call. The object is evaluated in non-handle mode;
//! string-returning byte-array methods restore the saved handle mode on
//! the way out, pinning when a raw pointer is expected.

use crate::arena::ExprId;
use crate::types::Primitive;

use super::expr::pin_handle;
use super::state::CodeGen;

impl<'a, 'arena> CodeGen<'a, 'arena> {
    pub(super) fn gen_method_call(
        &mut self,
        _expr: ExprId,
        object: ExprId,
        method: &str,
        args: &[ExprId],
    ) -> String {
        let elem_ty = self
            .arena
            .expr(object)
            .expr_type
            .and_then(|t| self.arena.array_element(t));
        let is_byte_array = elem_ty.is_some_and(|t| self.arena.is_primitive(t, Primitive::Byte));
        let elem_is_double = elem_ty.is_some_and(|t| self.is_double_type(t));
        let arena_var = self.arena_var();

        // Most methods want the object as a raw pointer.
        let saved_handle_mode = self.expr_as_handle;
        self.expr_as_handle = false;
        let obj = self.gen_expr(object);
        let arg_strs: Vec<String> = args.iter().map(|&a| self.gen_expr(a)).collect();
        self.expr_as_handle = saved_handle_mode;

        let elem_in = |value: &str| -> String {
            if elem_is_double {
                format!("rt_f64_to_bits({})", value)
            } else {
                format!("(uint64_t)({})", value)
            }
        };
        let elem_out = |call: String, r#gen: &CodeGen<'_, '_>| -> String {
            if elem_is_double {
                format!("rt_f64_from_bits({})", call)
            } else {
                let cty = elem_ty.map_or("int64_t".to_string(), |t| r#gen.c_type(t));
                format!("(({}){})", cty.trim_end(), call)
            }
        };

        let result = match (method, args.len()) {
            ("push", 1) => format!(
                "rt_array_push({}, {}, {})",
                arena_var,
                obj,
                elem_in(&arg_strs[0])
            ),
            ("pop", 0) => elem_out(format!("rt_array_pop({})", obj), self),
            ("clear", 0) => format!("rt_array_clear({})", obj),
            ("concat", 1) => format!(
                "rt_array_concat({}, {}, {})",
                arena_var, obj, arg_strs[0]
            ),
            ("indexOf", 1) => format!("rt_array_indexof({}, {})", obj, elem_in(&arg_strs[0])),
            ("contains", 1) => format!("rt_array_contains({}, {})", obj, elem_in(&arg_strs[0])),
            ("clone", 0) => format!("rt_array_clone({}, {})", arena_var, obj),
            ("join", 1) => format!("rt_array_join({}, {}, {})", arena_var, obj, arg_strs[0]),
            ("reverse", 0) => format!("rt_array_reverse({})", obj),
            ("insert", 2) => format!(
                "rt_array_insert({}, {}, {}, {})",
                arena_var,
                obj,
                elem_in(&arg_strs[0]),
                arg_strs[1]
            ),
            ("remove", 1) => elem_out(
                format!("rt_array_remove({}, {})", obj, arg_strs[0]),
                self,
            ),
            ("toString", 0) if is_byte_array => {
                format!("rt_byte_array_to_string({}, {})", arena_var, obj)
            }
            ("toStringLatin1", 0) if is_byte_array => {
                format!("rt_byte_array_to_string_latin1({}, {})", arena_var, obj)
            }
            ("toHex", 0) if is_byte_array => {
                format!("rt_byte_array_to_hex({}, {})", arena_var, obj)
            }
            ("toBase64", 0) if is_byte_array => {
                format!("rt_byte_array_to_base64({}, {})", arena_var, obj)
            }
            _ => {
                // Ill-typed method calls are rejected before code
                // generation; emit a call-shaped placeholder anyway.
                "0".to_string()
            }
        };

        // String-returning methods produce RtHandleV2*; in handle mode the
        // handle is returned as-is, otherwise it is pinned to char*.
        let returns_handle = matches!(
            (method, args.len()),
            ("toString", 0) | ("toStringLatin1", 0) | ("toHex", 0) | ("toBase64", 0) | ("join", 1)
        ) && (is_byte_array || method == "join");
        if returns_handle {
            let handle = self.emit_arena_temp(&result);
            if saved_handle_mode {
                return handle;
            }
            return pin_handle(&handle);
        }

        result
    }
}
