//! Stack growth for recursive graph walks.
//!
//! Trait queries and pushdown classification recurse along input and
//! dependee chains whose depth is bounded only by the size of the
//! component being compiled. Wrapping the recursive step in
//! [`ensure_sufficient_stack`] grows the stack on demand instead of
//! overflowing.

/// Grow when less than this remains.
const RED_ZONE: usize = 64 * 1024;

/// Size of each new stack segment.
const SEGMENT: usize = 1024 * 1024;

/// Run `f`, first growing the stack if it is close to exhausted.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
