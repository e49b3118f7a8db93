//! String operations for generated code
//!
//! Strings live in the program arena as tracked handles. Concatenation
//! and the to-string conversions used by interpolated literals allocate
//! their results from the same arena the generated function received.

use std::ffi::c_char;

use crate::arena::{handle_bytes, RtArenaV2, RtHandleV2};

unsafe fn arena_ref<'a>(arena: *mut RtArenaV2) -> &'a RtArenaV2 {
    assert!(!arena.is_null(), "string operation: null arena");
    unsafe { &*arena }
}

/// Concatenate two string handles into a new handle.
///
/// # Safety
/// `arena` must be live; `a` and `b` must be handles from this runtime
/// (null reads as the empty string).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_string_concat(
    arena: *mut RtArenaV2,
    a: *const RtHandleV2,
    b: *const RtHandleV2,
) -> *mut RtHandleV2 {
    let arena = unsafe { arena_ref(arena) };
    let a = if a.is_null() { &[][..] } else { unsafe { handle_bytes(a) } };
    let b = if b.is_null() { &[][..] } else { unsafe { handle_bytes(b) } };
    let mut joined = Vec::with_capacity(a.len() + b.len());
    joined.extend_from_slice(a);
    joined.extend_from_slice(b);
    arena.alloc_handle(&joined)
}

/// Length in bytes of a string handle.
///
/// # Safety
/// `s` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_string_len(s: *const RtHandleV2) -> i64 {
    if s.is_null() {
        return 0;
    }
    unsafe { (*s).len as i64 }
}

/// Byte-wise string equality.
///
/// # Safety
/// `a` and `b` must be null or live handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_string_eq(a: *const RtHandleV2, b: *const RtHandleV2) -> bool {
    let a = if a.is_null() { &[][..] } else { unsafe { handle_bytes(a) } };
    let b = if b.is_null() { &[][..] } else { unsafe { handle_bytes(b) } };
    a == b
}

/// Decimal rendering of an integer.
///
/// # Safety
/// `arena` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_int_to_string(arena: *mut RtArenaV2, v: i64) -> *mut RtHandleV2 {
    let arena = unsafe { arena_ref(arena) };
    arena.alloc_handle(v.to_string().as_bytes())
}

/// Shortest round-trip rendering of a double.
///
/// # Safety
/// `arena` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_double_to_string(arena: *mut RtArenaV2, v: f64) -> *mut RtHandleV2 {
    let arena = unsafe { arena_ref(arena) };
    let text = format!("{:?}", v);
    arena.alloc_handle(text.as_bytes())
}

/// `true` or `false`.
///
/// # Safety
/// `arena` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_bool_to_string(arena: *mut RtArenaV2, v: bool) -> *mut RtHandleV2 {
    let arena = unsafe { arena_ref(arena) };
    arena.alloc_handle(if v { b"true" as &[u8] } else { b"false" })
}

/// Duplicate a C string into a handle; convenience for native interop.
///
/// # Safety
/// `arena` must be live; `s` must be NUL-terminated or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_string_from_cstr(
    arena: *mut RtArenaV2,
    s: *const c_char,
) -> *mut RtHandleV2 {
    unsafe { crate::arena::rt_arena_v2_strdup(arena, s) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{rt_arena_v2_create, rt_arena_v2_destroy, rt_arena_v2_strdup};
    use std::ffi::CString;

    #[test]
    fn test_concat() {
        let arena = rt_arena_v2_create();
        let hello = CString::new("Hello ").unwrap();
        let world = CString::new("World").unwrap();
        unsafe {
            let a = rt_arena_v2_strdup(arena, hello.as_ptr());
            let b = rt_arena_v2_strdup(arena, world.as_ptr());
            let joined = rt_string_concat(arena, a, b);
            assert_eq!(handle_bytes(joined), b"Hello World");
            assert_eq!(rt_string_len(joined), 11);
            rt_arena_v2_destroy(arena);
        }
    }

    #[test]
    fn test_concat_with_null_side() {
        let arena = rt_arena_v2_create();
        let only = CString::new("solo").unwrap();
        unsafe {
            let a = rt_arena_v2_strdup(arena, only.as_ptr());
            let joined = rt_string_concat(arena, a, std::ptr::null());
            assert_eq!(handle_bytes(joined), b"solo");
            rt_arena_v2_destroy(arena);
        }
    }

    #[test]
    fn test_conversions() {
        let arena = rt_arena_v2_create();
        unsafe {
            assert_eq!(handle_bytes(rt_int_to_string(arena, -42)), b"-42");
            assert_eq!(handle_bytes(rt_double_to_string(arena, 1.5)), b"1.5");
            assert_eq!(handle_bytes(rt_bool_to_string(arena, true)), b"true");
            assert_eq!(handle_bytes(rt_bool_to_string(arena, false)), b"false");
            rt_arena_v2_destroy(arena);
        }
    }

    #[test]
    fn test_string_eq() {
        let arena = rt_arena_v2_create();
        let x1 = CString::new("same").unwrap();
        let x2 = CString::new("same").unwrap();
        let y = CString::new("other").unwrap();
        unsafe {
            let a = rt_arena_v2_strdup(arena, x1.as_ptr());
            let b = rt_arena_v2_strdup(arena, x2.as_ptr());
            let c = rt_arena_v2_strdup(arena, y.as_ptr());
            assert!(rt_string_eq(a, b));
            assert!(!rt_string_eq(a, c));
            assert!(rt_string_eq(std::ptr::null(), std::ptr::null()));
            rt_arena_v2_destroy(arena);
        }
    }
}
