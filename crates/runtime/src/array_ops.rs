//! Dynamic array object and method helpers
//!
//! Arrays are reference-shaped: an `RtArray` header allocated in the
//! program arena, holding a length-prefixed slab of 8-byte element slots.
//! Numeric elements are stored directly (doubles as bit patterns, see
//! `rt_f64_to_bits`); reference elements store the pointer value. Growth
//! allocates a fresh slab from the arena; old slabs are reclaimed when
//! the arena is destroyed.
//!
//! Out-of-bounds access and popping an empty array are runtime errors.

use std::ffi::c_char;
use std::process;

use crate::arena::{RtArenaV2, RtHandleV2};

#[repr(C)]
pub struct RtArray {
    pub data: *mut u64,
    pub len: i64,
    pub cap: i64,
}

fn array_fatal(message: &str) -> ! {
    eprintln!("Runtime error: {}", message);
    process::exit(1);
}

unsafe fn arena_ref<'a>(arena: *mut RtArenaV2) -> &'a RtArenaV2 {
    assert!(!arena.is_null(), "array operation: null arena");
    unsafe { &*arena }
}

unsafe fn array_ref<'a>(arr: *mut RtArray) -> &'a mut RtArray {
    assert!(!arr.is_null(), "array operation: null array");
    unsafe { &mut *arr }
}

unsafe fn elems<'a>(arr: &RtArray) -> &'a [u64] {
    if arr.data.is_null() {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(arr.data, arr.len as usize) }
}

/// Ensure capacity for one more element, growing geometrically.
unsafe fn reserve(arena: &RtArenaV2, arr: &mut RtArray, extra: i64) {
    let needed = arr.len + extra;
    if needed <= arr.cap {
        return;
    }
    let doubled = if arr.cap == 0 { 8 } else { arr.cap * 2 };
    let new_cap = doubled.max(needed);
    let new_data = arena.alloc_bytes(new_cap as usize * 8, 8) as *mut u64;
    if !arr.data.is_null() && arr.len > 0 {
        unsafe { std::ptr::copy_nonoverlapping(arr.data, new_data, arr.len as usize) };
    }
    arr.data = new_data;
    arr.cap = new_cap;
}

/// Allocate an empty array in the arena.
///
/// # Safety
/// `arena` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_new(arena: *mut RtArenaV2) -> *mut RtArray {
    let arena = unsafe { arena_ref(arena) };
    let header = arena.bump().alloc(RtArray {
        data: std::ptr::null_mut(),
        len: 0,
        cap: 0,
    });
    header as *mut RtArray
}

/// # Safety
/// `arena` and `arr` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_push(arena: *mut RtArenaV2, arr: *mut RtArray, value: u64) {
    let arena = unsafe { arena_ref(arena) };
    let arr = unsafe { array_ref(arr) };
    unsafe { reserve(arena, arr, 1) };
    unsafe { *arr.data.add(arr.len as usize) = value };
    arr.len += 1;
}

/// # Safety
/// `arr` must be live and non-empty.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_pop(arr: *mut RtArray) -> u64 {
    let arr = unsafe { array_ref(arr) };
    if arr.len == 0 {
        array_fatal("pop from empty array");
    }
    arr.len -= 1;
    unsafe { *arr.data.add(arr.len as usize) }
}

/// # Safety
/// `arr` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_len(arr: *const RtArray) -> i64 {
    if arr.is_null() { 0 } else { unsafe { (*arr).len } }
}

/// # Safety
/// `arr` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_clear(arr: *mut RtArray) {
    let arr = unsafe { array_ref(arr) };
    arr.len = 0;
}

/// # Safety
/// `arr` must be live; `index` in bounds.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_get(arr: *const RtArray, index: i64) -> u64 {
    assert!(!arr.is_null(), "array operation: null array");
    let arr = unsafe { &*arr };
    if index < 0 || index >= arr.len {
        array_fatal("array index out of bounds");
    }
    unsafe { *arr.data.add(index as usize) }
}

/// # Safety
/// `arr` must be live; `index` in bounds.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_set(arr: *mut RtArray, index: i64, value: u64) {
    let arr = unsafe { array_ref(arr) };
    if index < 0 || index >= arr.len {
        array_fatal("array index out of bounds");
    }
    unsafe { *arr.data.add(index as usize) = value };
}

/// Append the elements of `other` to a copy of `arr`.
///
/// # Safety
/// `arena`, `arr` and `other` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_concat(
    arena: *mut RtArenaV2,
    arr: *mut RtArray,
    other: *mut RtArray,
) -> *mut RtArray {
    let result = unsafe { rt_array_new(arena) };
    for &value in unsafe { elems(array_ref(arr)) } {
        unsafe { rt_array_push(arena, result, value) };
    }
    for &value in unsafe { elems(array_ref(other)) } {
        unsafe { rt_array_push(arena, result, value) };
    }
    result
}

/// Index of the first element equal to `value`, or -1.
///
/// # Safety
/// `arr` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_indexof(arr: *const RtArray, value: u64) -> i64 {
    assert!(!arr.is_null(), "array operation: null array");
    let arr = unsafe { &*arr };
    unsafe { elems(arr) }
        .iter()
        .position(|&v| v == value)
        .map_or(-1, |i| i as i64)
}

/// # Safety
/// `arr` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_contains(arr: *const RtArray, value: u64) -> bool {
    (unsafe { rt_array_indexof(arr, value) }) >= 0
}

/// # Safety
/// `arena` and `arr` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_clone(
    arena: *mut RtArenaV2,
    arr: *mut RtArray,
) -> *mut RtArray {
    let result = unsafe { rt_array_new(arena) };
    for &value in unsafe { elems(array_ref(arr)) } {
        unsafe { rt_array_push(arena, result, value) };
    }
    result
}

/// Join an array of strings with a separator. Elements are pinned
/// `char *` values as produced by string expressions in non-handle mode.
///
/// # Safety
/// `arena` and `arr` must be live; every element must be a valid
/// NUL-terminated string pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_join(
    arena: *mut RtArenaV2,
    arr: *mut RtArray,
    separator: *const c_char,
) -> *mut RtHandleV2 {
    let arena_ref = unsafe { arena_ref(arena) };
    let sep = if separator.is_null() {
        &[][..]
    } else {
        unsafe { std::ffi::CStr::from_ptr(separator) }.to_bytes()
    };
    let mut joined: Vec<u8> = Vec::new();
    for (i, &value) in unsafe { elems(array_ref(arr)) }.iter().enumerate() {
        if i > 0 {
            joined.extend_from_slice(sep);
        }
        if value != 0 {
            let s = unsafe { std::ffi::CStr::from_ptr(value as *const c_char) };
            joined.extend_from_slice(s.to_bytes());
        }
    }
    arena_ref.alloc_handle(&joined)
}

/// Reverse in place.
///
/// # Safety
/// `arr` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_reverse(arr: *mut RtArray) {
    let arr = unsafe { array_ref(arr) };
    if arr.data.is_null() {
        return;
    }
    let slice = unsafe { std::slice::from_raw_parts_mut(arr.data, arr.len as usize) };
    slice.reverse();
}

/// Insert `value` at `index`, shifting later elements right.
///
/// # Safety
/// `arena` and `arr` must be live; `index` in 0..=len.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_insert(
    arena: *mut RtArenaV2,
    arr: *mut RtArray,
    value: u64,
    index: i64,
) {
    let arena = unsafe { arena_ref(arena) };
    let arr = unsafe { array_ref(arr) };
    if index < 0 || index > arr.len {
        array_fatal("array insert index out of bounds");
    }
    unsafe { reserve(arena, arr, 1) };
    let idx = index as usize;
    let len = arr.len as usize;
    unsafe {
        std::ptr::copy(arr.data.add(idx), arr.data.add(idx + 1), len - idx);
        *arr.data.add(idx) = value;
    }
    arr.len += 1;
}

/// Remove and return the element at `index`, shifting later elements left.
///
/// # Safety
/// `arr` must be live; `index` in bounds.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_remove(arr: *mut RtArray, index: i64) -> u64 {
    let arr = unsafe { array_ref(arr) };
    if index < 0 || index >= arr.len {
        array_fatal("array remove index out of bounds");
    }
    let idx = index as usize;
    let len = arr.len as usize;
    let removed = unsafe { *arr.data.add(idx) };
    unsafe { std::ptr::copy(arr.data.add(idx + 1), arr.data.add(idx), len - idx - 1) };
    arr.len -= 1;
    removed
}

/// Copy the half-open range `[start, end)` into a new array. An `end` of
/// -1 means the array's length; bounds are clamped.
///
/// # Safety
/// `arena` and `arr` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_array_slice(
    arena: *mut RtArenaV2,
    arr: *mut RtArray,
    start: i64,
    end: i64,
) -> *mut RtArray {
    let source = unsafe { array_ref(arr) };
    let len = source.len;
    let end = if end < 0 { len } else { end.min(len) };
    let start = start.clamp(0, len);
    let result = unsafe { rt_array_new(arena) };
    let mut i = start;
    while i < end {
        let value = unsafe { rt_array_get(source, i) };
        unsafe { rt_array_push(arena, result, value) };
        i += 1;
    }
    result
}
