//! Sindarin runtime
//!
//! The support library linked into every compiled Sindarin program. The
//! code generator emits calls against the C ABI declared in
//! `include/sindarin_rt.h`; everything exported here carries the `rt_`
//! prefix, which is reserved for the runtime.
//!
//! Subsystems:
//! - `arena`: program-lifetime bump allocation with tracked handles
//! - `arithmetic`: checked arithmetic (wrap on overflow, fatal on /0)
//! - `strings`: concatenation and to-string conversions
//! - `array_ops`: the dynamic array object and its method helpers
//! - `encoding`: byte-array string/hex/Base64 views
//! - `safepoint`: stop-the-world coordination for mutator threads

pub mod arena;
pub mod arithmetic;
pub mod array_ops;
pub mod encoding;
pub mod safepoint;
pub mod strings;

// Re-export key types and entry points for Rust-side consumers (tests,
// host tooling). Generated C binds to the unmangled rt_* symbols.
pub use arena::{
    RtArenaV2, RtHandleV2, rt_arena_v2_alloc_bytes, rt_arena_v2_create, rt_arena_v2_destroy,
    rt_arena_v2_free, rt_arena_v2_strdup, rt_handle_v2_pin, rt_handle_v2_unpin,
};
pub use arithmetic::{
    rt_double_add, rt_double_div, rt_double_mod, rt_double_mul, rt_double_sub, rt_f64_from_bits,
    rt_f64_to_bits, rt_int_add, rt_int_div, rt_int_mod, rt_int_mul, rt_int_sub,
};
pub use array_ops::{
    RtArray, rt_array_clear, rt_array_clone, rt_array_concat, rt_array_contains, rt_array_get,
    rt_array_indexof, rt_array_insert, rt_array_join, rt_array_len, rt_array_new, rt_array_pop,
    rt_array_push, rt_array_remove, rt_array_reverse, rt_array_set, rt_array_slice,
};
pub use encoding::{
    rt_byte_array_to_base64, rt_byte_array_to_hex, rt_byte_array_to_string,
    rt_byte_array_to_string_latin1,
};
pub use safepoint::{
    SAFEPOINT_REQUESTED, rt_safepoint_enter_native, rt_safepoint_init, rt_safepoint_leave_native,
    rt_safepoint_park, rt_safepoint_poll, rt_safepoint_release_stw, rt_safepoint_request_stw,
    rt_safepoint_thread_count, rt_safepoint_thread_deregister, rt_safepoint_thread_register,
};
pub use strings::{
    rt_bool_to_string, rt_double_to_string, rt_int_to_string, rt_string_concat, rt_string_eq,
    rt_string_from_cstr, rt_string_len,
};
