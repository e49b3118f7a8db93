//! Stop-the-world safepoint coordination
//!
//! Generated code polls at safepoints (function entries, loop back edges);
//! a GC actor stops the world with `request_stw` and resumes it with
//! `release_stw`. The fast path is a single relaxed atomic load; all
//! non-atomic state lives under one mutex with two condition variables,
//! which gives a total order between the last parker and the GC waker.
//!
//! The requester may or may not be a registered mutator itself, so the
//! wait condition excludes the calling thread only when its thread-local
//! registration flag is set.
//!
//! Blocking native calls are bracketed by `enter_native`/`leave_native`:
//! while in native code the thread counts as parked, and on the way back
//! it re-parks until the epoch advances if a stop-the-world is still in
//! progress.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

/// Global flag - release-store by the GC, relaxed-load in the poll fast
/// path.
pub static SAFEPOINT_REQUESTED: AtomicBool = AtomicBool::new(false);

struct SafepointState {
    /// Registered mutator threads.
    thread_count: i32,
    /// Currently parked (or in native code).
    parked_count: i32,
    /// Incremented each GC cycle.
    gc_epoch: u64,
}

static STATE: Mutex<SafepointState> = Mutex::new(SafepointState {
    thread_count: 0,
    parked_count: 0,
    gc_epoch: 0,
});

/// GC waits on this until all other mutators are parked.
static ALL_PARKED: Condvar = Condvar::new();
/// Parked threads wait on this until the epoch advances.
static GC_DONE: Condvar = Condvar::new();

thread_local! {
    /// Is this thread registered with the safepoint subsystem?
    static REGISTERED: Cell<bool> = const { Cell::new(false) };
}

/// Initialize (or reset) the safepoint subsystem. Call once from the
/// process entry point before any thread registers.
#[unsafe(no_mangle)]
pub extern "C" fn rt_safepoint_init() {
    let mut state = STATE.lock().unwrap();
    state.thread_count = 0;
    state.parked_count = 0;
    state.gc_epoch = 0;
    SAFEPOINT_REQUESTED.store(false, Ordering::Release);
}

/// Register the calling thread as a mutator.
#[unsafe(no_mangle)]
pub extern "C" fn rt_safepoint_thread_register() {
    let mut state = STATE.lock().unwrap();
    state.thread_count += 1;
    REGISTERED.with(|r| r.set(true));
}

/// Deregister the calling thread. If the GC is waiting and this was the
/// last thread it needed, wake it; the requester re-checks its condition.
#[unsafe(no_mangle)]
pub extern "C" fn rt_safepoint_thread_deregister() {
    let mut state = STATE.lock().unwrap();
    state.thread_count -= 1;
    REGISTERED.with(|r| r.set(false));
    if SAFEPOINT_REQUESTED.load(Ordering::Relaxed) {
        ALL_PARKED.notify_one();
    }
}

/// Slow path: park until the GC cycle completes (the epoch advances).
#[unsafe(no_mangle)]
pub extern "C" fn rt_safepoint_park() {
    let mut state = STATE.lock().unwrap();
    state.parked_count += 1;
    if state.parked_count >= state.thread_count - 1 {
        ALL_PARKED.notify_one();
    }
    let my_epoch = state.gc_epoch;
    while state.gc_epoch == my_epoch && SAFEPOINT_REQUESTED.load(Ordering::Relaxed) {
        state = GC_DONE.wait(state).unwrap();
    }
    state.parked_count -= 1;
}

/// Fast-path poll: a relaxed load, then the park slow path only when a
/// stop-the-world has been requested.
#[unsafe(no_mangle)]
pub extern "C" fn rt_safepoint_poll() {
    if !SAFEPOINT_REQUESTED.load(Ordering::Relaxed) {
        return;
    }
    rt_safepoint_park();
}

/// Stop the world: publish the flag, then block until all other
/// registered threads have reached safepoints. If the calling thread is
/// itself a registered mutator it is excluded from the wait count.
#[unsafe(no_mangle)]
pub extern "C" fn rt_safepoint_request_stw() {
    let mut state = STATE.lock().unwrap();
    SAFEPOINT_REQUESTED.store(true, Ordering::Release);
    let exclude_self = i32::from(REGISTERED.with(|r| r.get()));
    while state.parked_count < state.thread_count - exclude_self {
        state = ALL_PARKED.wait(state).unwrap();
    }
    // All mutators parked - safe to collect.
}

/// Resume the world: advance the epoch, clear the flag, wake every
/// parked thread.
#[unsafe(no_mangle)]
pub extern "C" fn rt_safepoint_release_stw() {
    let mut state = STATE.lock().unwrap();
    state.gc_epoch += 1;
    SAFEPOINT_REQUESTED.store(false, Ordering::Release);
    GC_DONE.notify_all();
}

/// Number of registered mutator threads.
#[unsafe(no_mangle)]
pub extern "C" fn rt_safepoint_thread_count() -> i32 {
    STATE.lock().unwrap().thread_count
}

/// Mark the calling thread as "in native code". From the GC's
/// perspective the thread is parked: if a stop-the-world is already in
/// progress this may satisfy the park count immediately, and if not it
/// pre-parks so a future request will not wait for this thread.
#[unsafe(no_mangle)]
pub extern "C" fn rt_safepoint_enter_native() {
    let mut state = STATE.lock().unwrap();
    state.parked_count += 1;
    if SAFEPOINT_REQUESTED.load(Ordering::Relaxed) && state.parked_count >= state.thread_count - 1
    {
        ALL_PARKED.notify_one();
    }
}

/// Return from native code. If a stop-the-world is active the thread
/// re-parks and waits for the epoch to advance before resuming.
#[unsafe(no_mangle)]
pub extern "C" fn rt_safepoint_leave_native() {
    let mut state = STATE.lock().unwrap();
    state.parked_count -= 1;
    if SAFEPOINT_REQUESTED.load(Ordering::Relaxed) {
        state.parked_count += 1;
        let my_epoch = state.gc_epoch;
        while state.gc_epoch == my_epoch && SAFEPOINT_REQUESTED.load(Ordering::Relaxed) {
            state = GC_DONE.wait(state).unwrap();
        }
        state.parked_count -= 1;
    }
}

/// Current GC epoch; monotone. Exposed for tests and diagnostics.
pub fn gc_epoch() -> u64 {
    STATE.lock().unwrap().gc_epoch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_resets_state() {
        rt_safepoint_init();
        assert_eq!(rt_safepoint_thread_count(), 0);
        assert!(!SAFEPOINT_REQUESTED.load(Ordering::Relaxed));
        assert_eq!(gc_epoch(), 0);
    }

    #[test]
    #[serial]
    fn test_register_deregister_counts() {
        rt_safepoint_init();
        rt_safepoint_thread_register();
        assert_eq!(rt_safepoint_thread_count(), 1);
        rt_safepoint_thread_register();
        assert_eq!(rt_safepoint_thread_count(), 2);
        rt_safepoint_thread_deregister();
        rt_safepoint_thread_deregister();
        assert_eq!(rt_safepoint_thread_count(), 0);
    }

    #[test]
    #[serial]
    fn test_poll_with_flag_clear_returns() {
        rt_safepoint_init();
        // Nothing requested: poll is a no-op and must not block.
        rt_safepoint_poll();
        rt_safepoint_poll();
    }

    #[test]
    #[serial]
    fn test_epoch_advances_on_release() {
        rt_safepoint_init();
        let before = gc_epoch();
        // No registered threads: request returns immediately.
        rt_safepoint_request_stw();
        rt_safepoint_release_stw();
        assert_eq!(gc_epoch(), before + 1);
        assert!(!SAFEPOINT_REQUESTED.load(Ordering::Relaxed));
    }
}
