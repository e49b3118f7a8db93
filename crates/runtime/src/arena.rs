//! Arena v2 - program-lifetime bump allocation with tracked handles
//!
//! Generated code receives an `RtArenaV2 *` and allocates strings and
//! objects through it. Every allocation is reachable through an
//! `RtHandleV2`, an opaque record the code generator may pin (to read the
//! raw pointer) or free. Freeing marks the handle as released; the
//! backing memory is reclaimed in bulk when the arena is destroyed, so a
//! pinned pointer stays readable for the arena's whole lifetime.

use bumpalo::Bump;
use std::alloc::Layout;
use std::ffi::c_char;

/// A tracked reference to arena-owned memory.
///
/// Layout is part of the C ABI: generated code reads `ptr` after pinning.
#[repr(C)]
pub struct RtHandleV2 {
    pub ptr: *mut u8,
    pub len: usize,
    pub pin_count: u32,
    pub freed: bool,
}

/// A program arena backed by a bump allocator.
pub struct RtArenaV2 {
    bump: Bump,
}

impl RtArenaV2 {
    fn new() -> Self {
        RtArenaV2 { bump: Bump::new() }
    }

    /// Allocate a handle pointing at a copy of `bytes`, with a NUL
    /// terminator so pinned pointers read as C strings.
    pub(crate) fn alloc_handle(&self, bytes: &[u8]) -> *mut RtHandleV2 {
        let storage = self.bump.alloc_slice_fill_copy(bytes.len() + 1, 0u8);
        storage[..bytes.len()].copy_from_slice(bytes);
        let handle = self.bump.alloc(RtHandleV2 {
            ptr: storage.as_mut_ptr(),
            len: bytes.len(),
            pin_count: 0,
            freed: false,
        });
        handle as *mut RtHandleV2
    }

    pub(crate) fn alloc_bytes(&self, len: usize, align: usize) -> *mut u8 {
        let layout = Layout::from_size_align(len.max(1), align.max(1))
            .expect("invalid arena allocation layout");
        self.bump.alloc_layout(layout).as_ptr()
    }

    pub(crate) fn bump(&self) -> &Bump {
        &self.bump
    }

    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }
}

/// Create a new arena. The caller owns it and must destroy it.
#[unsafe(no_mangle)]
pub extern "C" fn rt_arena_v2_create() -> *mut RtArenaV2 {
    Box::into_raw(Box::new(RtArenaV2::new()))
}

/// Destroy an arena, reclaiming every allocation made from it.
///
/// # Safety
/// `arena` must come from `rt_arena_v2_create` and not be used afterward.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_arena_v2_destroy(arena: *mut RtArenaV2) {
    if !arena.is_null() {
        drop(unsafe { Box::from_raw(arena) });
    }
}

/// Duplicate a NUL-terminated C string into the arena, returning a
/// tracked handle.
///
/// # Safety
/// `arena` must be a live arena; `s` must be NUL-terminated or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_arena_v2_strdup(
    arena: *mut RtArenaV2,
    s: *const c_char,
) -> *mut RtHandleV2 {
    assert!(!arena.is_null(), "rt_arena_v2_strdup: null arena");
    let arena = unsafe { &*arena };
    if s.is_null() {
        return arena.alloc_handle(b"");
    }
    let bytes = unsafe { std::ffi::CStr::from_ptr(s) }.to_bytes();
    arena.alloc_handle(bytes)
}

/// Allocate raw zero-initialized storage from the arena.
///
/// # Safety
/// `arena` must be a live arena.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_arena_v2_alloc_bytes(arena: *mut RtArenaV2, len: usize) -> *mut u8 {
    assert!(!arena.is_null(), "rt_arena_v2_alloc_bytes: null arena");
    let arena = unsafe { &*arena };
    let ptr = arena.alloc_bytes(len, 8);
    unsafe { std::ptr::write_bytes(ptr, 0, len.max(1)) };
    ptr
}

/// Release a handle. Pinned handles are only marked; the release takes
/// effect at the last unpin. Null is ignored.
///
/// # Safety
/// `handle` must be null or a handle from this runtime.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_arena_v2_free(handle: *mut RtHandleV2) {
    if handle.is_null() {
        return;
    }
    let handle = unsafe { &mut *handle };
    handle.freed = true;
}

/// Pin a handle so its raw pointer stays valid across runtime calls.
///
/// # Safety
/// `handle` must be a live handle from this runtime.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_handle_v2_pin(handle: *mut RtHandleV2) {
    assert!(!handle.is_null(), "rt_handle_v2_pin: null handle");
    let handle = unsafe { &mut *handle };
    handle.pin_count += 1;
}

/// Drop one pin.
///
/// # Safety
/// `handle` must be a live handle from this runtime.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_handle_v2_unpin(handle: *mut RtHandleV2) {
    assert!(!handle.is_null(), "rt_handle_v2_unpin: null handle");
    let handle = unsafe { &mut *handle };
    handle.pin_count = handle.pin_count.saturating_sub(1);
}

/// View a handle's bytes as a str (lossy at the boundary is the caller's
/// concern; handles created by this runtime always hold UTF-8).
///
/// # Safety
/// `handle` must be a live handle from this runtime.
pub(crate) unsafe fn handle_bytes<'h>(handle: *const RtHandleV2) -> &'h [u8] {
    let handle = unsafe { &*handle };
    unsafe { std::slice::from_raw_parts(handle.ptr, handle.len) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strdup_copies_content() {
        let arena = rt_arena_v2_create();
        let source = std::ffi::CString::new("hello").unwrap();
        unsafe {
            let handle = rt_arena_v2_strdup(arena, source.as_ptr());
            assert_eq!(handle_bytes(handle), b"hello");
            assert_eq!((*handle).len, 5);
            // NUL terminator present for C consumers.
            assert_eq!(*(*handle).ptr.add(5), 0);
            rt_arena_v2_destroy(arena);
        }
    }

    #[test]
    fn test_strdup_null_gives_empty() {
        let arena = rt_arena_v2_create();
        unsafe {
            let handle = rt_arena_v2_strdup(arena, std::ptr::null());
            assert_eq!((*handle).len, 0);
            rt_arena_v2_destroy(arena);
        }
    }

    #[test]
    fn test_free_marks_handle() {
        let arena = rt_arena_v2_create();
        let source = std::ffi::CString::new("x").unwrap();
        unsafe {
            let handle = rt_arena_v2_strdup(arena, source.as_ptr());
            assert!(!(*handle).freed);
            rt_arena_v2_free(handle);
            assert!((*handle).freed);
            // Freeing null is a no-op.
            rt_arena_v2_free(std::ptr::null_mut());
            rt_arena_v2_destroy(arena);
        }
    }

    #[test]
    fn test_pin_unpin_counting() {
        let arena = rt_arena_v2_create();
        let source = std::ffi::CString::new("pinned").unwrap();
        unsafe {
            let handle = rt_arena_v2_strdup(arena, source.as_ptr());
            rt_handle_v2_pin(handle);
            rt_handle_v2_pin(handle);
            assert_eq!((*handle).pin_count, 2);
            rt_handle_v2_unpin(handle);
            rt_handle_v2_unpin(handle);
            rt_handle_v2_unpin(handle); // saturates at zero
            assert_eq!((*handle).pin_count, 0);
            rt_arena_v2_destroy(arena);
        }
    }

    #[test]
    fn test_alloc_bytes_zeroed() {
        let arena = rt_arena_v2_create();
        unsafe {
            let ptr = rt_arena_v2_alloc_bytes(arena, 64);
            for i in 0..64 {
                assert_eq!(*ptr.add(i), 0);
            }
            rt_arena_v2_destroy(arena);
        }
    }
}
