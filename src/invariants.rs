//! Debug assertion macros for queue invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`); zero overhead in
//! release builds. Mirrors this code family's existing `invariants.rs`
//! convention of naming each macro after the invariant it checks rather than
//! inlining the `debug_assert!` at each call site.

/// `read_ix`/`write_ix` must stay 8-byte aligned at every observable point.
macro_rules! debug_assert_index_aligned {
    ($name:literal, $ix:expr) => {
        debug_assert!(
            $ix % 8 == 0,
            "{} is not 8-byte aligned: {}",
            $name,
            $ix
        )
    };
}

/// `msg_count` must never exceed the number of minimum-size frames the
/// buffer can hold.
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "msg_count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// A non-empty `MessageView` must carry a non-null data pointer.
macro_rules! debug_assert_valid_view_ptr {
    ($ptr:expr) => {
        debug_assert!(!$ptr.is_null(), "non-empty MessageView has a null data pointer")
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_index_aligned;
pub(crate) use debug_assert_valid_view_ptr;
