//! Stack growth for deeply recursive scripts.
//!
//! Script recursion is bounded by `MAX_CALL_DEPTH`, not by the host thread's
//! stack, so a mission moved onto a small worker thread still reports
//! `CallDepthExceeded` instead of overflowing.

/// Minimum stack space to keep available (100KB red zone).
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate when growing (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, first growing the stack if less than the red zone remains.
#[inline]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
