//! Byte-array encoding helpers
//!
//! Backs the `byte[]` extension methods: UTF-8 decoding (with
//! replacement), Latin-1 widening, lowercase hex and standard Base64
//! with padding. Each returns a string handle allocated from the
//! program arena.

use base64::prelude::*;

use crate::arena::{RtArenaV2, RtHandleV2};
use crate::array_ops::{rt_array_get, rt_array_len, RtArray};

unsafe fn collect_bytes(arr: *const RtArray) -> Vec<u8> {
    let len = unsafe { rt_array_len(arr) };
    let mut bytes = Vec::with_capacity(len as usize);
    for i in 0..len {
        bytes.push(unsafe { rt_array_get(arr, i) } as u8);
    }
    bytes
}

unsafe fn arena_ref<'a>(arena: *mut RtArenaV2) -> &'a RtArenaV2 {
    assert!(!arena.is_null(), "byte-array operation: null arena");
    unsafe { &*arena }
}

/// Decode a byte array as UTF-8; invalid sequences become U+FFFD.
///
/// # Safety
/// `arena` and `arr` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_byte_array_to_string(
    arena: *mut RtArenaV2,
    arr: *const RtArray,
) -> *mut RtHandleV2 {
    let arena = unsafe { arena_ref(arena) };
    let bytes = unsafe { collect_bytes(arr) };
    let text = String::from_utf8_lossy(&bytes);
    arena.alloc_handle(text.as_bytes())
}

/// Decode a byte array as Latin-1/ISO-8859-1: every byte maps to the
/// code point of the same value.
///
/// # Safety
/// `arena` and `arr` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_byte_array_to_string_latin1(
    arena: *mut RtArenaV2,
    arr: *const RtArray,
) -> *mut RtHandleV2 {
    let arena = unsafe { arena_ref(arena) };
    let bytes = unsafe { collect_bytes(arr) };
    let text: String = bytes.iter().map(|&b| b as char).collect();
    arena.alloc_handle(text.as_bytes())
}

/// Lowercase hexadecimal rendering.
///
/// # Safety
/// `arena` and `arr` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_byte_array_to_hex(
    arena: *mut RtArenaV2,
    arr: *const RtArray,
) -> *mut RtHandleV2 {
    let arena = unsafe { arena_ref(arena) };
    let bytes = unsafe { collect_bytes(arr) };
    arena.alloc_handle(hex::encode(&bytes).as_bytes())
}

/// Standard-alphabet Base64 with padding.
///
/// # Safety
/// `arena` and `arr` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_byte_array_to_base64(
    arena: *mut RtArenaV2,
    arr: *const RtArray,
) -> *mut RtHandleV2 {
    let arena = unsafe { arena_ref(arena) };
    let bytes = unsafe { collect_bytes(arr) };
    arena.alloc_handle(BASE64_STANDARD.encode(&bytes).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{handle_bytes, rt_arena_v2_create, rt_arena_v2_destroy};
    use crate::array_ops::{rt_array_new, rt_array_push};

    unsafe fn byte_array(arena: *mut RtArenaV2, bytes: &[u8]) -> *mut RtArray {
        let arr = unsafe { rt_array_new(arena) };
        for &b in bytes {
            unsafe { rt_array_push(arena, arr, b as u64) };
        }
        arr
    }

    #[test]
    fn test_to_string_utf8() {
        let arena = rt_arena_v2_create();
        unsafe {
            let arr = byte_array(arena, "héllo".as_bytes());
            let s = rt_byte_array_to_string(arena, arr);
            assert_eq!(handle_bytes(s), "héllo".as_bytes());
            rt_arena_v2_destroy(arena);
        }
    }

    #[test]
    fn test_to_string_invalid_utf8_replaced() {
        let arena = rt_arena_v2_create();
        unsafe {
            let arr = byte_array(arena, &[0x68, 0xFF, 0x69]);
            let s = rt_byte_array_to_string(arena, arr);
            let text = String::from_utf8(handle_bytes(s).to_vec()).unwrap();
            assert!(text.starts_with('h'));
            assert!(text.contains('\u{FFFD}'));
            rt_arena_v2_destroy(arena);
        }
    }

    #[test]
    fn test_to_string_latin1() {
        let arena = rt_arena_v2_create();
        unsafe {
            // 0xE9 is 'é' in Latin-1.
            let arr = byte_array(arena, &[0x63, 0x61, 0x66, 0xE9]);
            let s = rt_byte_array_to_string_latin1(arena, arr);
            assert_eq!(handle_bytes(s), "café".as_bytes());
            rt_arena_v2_destroy(arena);
        }
    }

    #[test]
    fn test_to_hex() {
        let arena = rt_arena_v2_create();
        unsafe {
            let arr = byte_array(arena, b"hello");
            let s = rt_byte_array_to_hex(arena, arr);
            assert_eq!(handle_bytes(s), b"68656c6c6f");
            rt_arena_v2_destroy(arena);
        }
    }

    #[test]
    fn test_to_base64() {
        let arena = rt_arena_v2_create();
        unsafe {
            let arr = byte_array(arena, b"hello");
            let s = rt_byte_array_to_base64(arena, arr);
            assert_eq!(handle_bytes(s), b"aGVsbG8=");

            let empty = byte_array(arena, b"");
            let e = rt_byte_array_to_base64(arena, empty);
            assert_eq!(handle_bytes(e), b"");
            rt_arena_v2_destroy(arena);
        }
    }
}
