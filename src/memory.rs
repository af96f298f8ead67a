//! The memory-provider contract.
//!
//! The protocol core never allocates or maps memory itself — per §1 and §4.3
//! of the design, aligned heap allocation and POSIX shared-memory mapping are
//! external collaborators. [`Storage::open_fresh`](crate::Storage::open_fresh)
//! and [`Storage::attach`](crate::Storage::attach) take a raw pointer and a
//! [`ReleaseHook`] directly; [`MemoryProvider`] documents the contract a
//! collaborator implements to produce that pair, and [`HeapRegion`] is this
//! crate's reference implementation for single-process use (tests, the
//! bundled demo, anyone who does not need real cross-process shared memory).

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Invoked with the region pointer exactly once when a [`crate::Storage`] is
/// closed or dropped. Boxed so providers can close over whatever state they
/// need (an `mmap` handle, a `memfd`, an allocation `Layout`, ...).
pub type ReleaseHook = Box<dyn FnOnce(*mut u8) + Send>;

/// External collaborator contract: hand the core a writable, 64-byte-aligned
/// region of a caller-chosen size, plus a hook to release it later.
///
/// Implementations outside this crate are expected to back `provide` with a
/// real allocator or a POSIX shared-memory mapping (`shm_open`/`mmap`,
/// `memfd_create`, Windows `CreateFileMapping`, ...); this crate ships only
/// [`HeapRegion`], a heap-backed reference implementation for single-process
/// use.
pub trait MemoryProvider {
    /// Returns a pointer to a writable region of exactly `size` bytes, base
    /// address 64-byte aligned, together with a release hook for that pointer.
    fn provide(&mut self, size: u64) -> (*mut u8, ReleaseHook);
}

/// Heap-backed reference implementation of [`MemoryProvider`].
///
/// Allocates a 64-byte-aligned buffer with the global allocator. This is
/// sufficient for same-process producer/consumer pairs (including across
/// threads) but does **not** provide cross-process shared memory — for that,
/// implement [`MemoryProvider`] over a real `mmap`/`shm_open` mapping.
#[derive(Debug, Default)]
pub struct HeapRegion;

impl HeapRegion {
    /// Creates a new heap-backed provider.
    pub const fn new() -> Self {
        Self
    }
}

impl MemoryProvider for HeapRegion {
    fn provide(&mut self, size: u64) -> (*mut u8, ReleaseHook) {
        let layout = Layout::from_size_align(size as usize, 64)
            .expect("requested region size overflows a Layout");

        // SAFETY: `layout` has non-zero size, which `Storage::open_fresh` enforces
        // via its `storage_size > 256` precondition before this is ever called.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));

        let hook: ReleaseHook = Box::new(move |p: *mut u8| {
            // SAFETY: `p` is the same pointer returned above, laid out identically;
            // the caller (Storage::close) guarantees this hook runs exactly once.
            unsafe { alloc::dealloc(p, layout) };
        });

        (ptr.as_ptr(), hook)
    }
}
