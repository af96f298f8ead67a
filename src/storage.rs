//! The fixed, versioned on-memory layout (ABI v1) and the type that owns it.

use crate::error::StorageError;
use crate::memory::ReleaseHook;
use std::sync::atomic::{AtomicU64, Ordering};

/// `"SPSC"` as a little-endian-packed `u32` tag, written at offset 0.
pub const MAGIC: u32 = 0x5350_5343;
/// The on-memory layout version this crate reads and writes.
pub const ABI_VERSION: u32 = 1;
/// Size in bytes of the fixed header preceding the ring buffer.
pub const HEADER_SIZE: u64 = 256;

#[inline]
pub(crate) const fn align_up_8(value: u64) -> u64 {
    (value + 7) & !7
}

/// Smallest payload buffer that can hold one minimum-size frame
/// (an 8-byte header with a 0-byte payload, 8-byte aligned).
const MIN_BUFFER_SIZE: u64 = 16;

/// The fixed header, laid out exactly as specified in ABI v1.
///
/// `read_ix`, `write_ix`, and `msg_count` each occupy a distinct 64-byte
/// cache line, matching this code family's existing `CacheAligned<T>`
/// false-sharing discipline (see `Ring<T>` in the sibling crate), but applied
/// here to fixed byte offsets inside a POD region rather than to struct
/// fields with compiler-chosen layout, since the layout must be stable across
/// processes and (in principle) languages.
#[repr(C)]
struct Header {
    magic: u32,
    abi_version: u32,
    storage_size: u64,
    _pad0: [u8; 48],
    read_ix: AtomicU64,
    _pad1: [u8; 56],
    write_ix: AtomicU64,
    _pad2: [u8; 56],
    msg_count: AtomicU64,
    _pad3: [u8; 56],
}

const _: () = assert!(std::mem::size_of::<Header>() == HEADER_SIZE as usize);
const _: () = assert!(std::mem::align_of::<Header>() <= 64);

/// Owns one contiguous, 64-byte-aligned shared memory region: the fixed
/// header described in the layout table, plus the ring buffer that follows it.
///
/// A `Storage` is either [`open_fresh`](Storage::open_fresh) from a region the
/// caller just obtained (writes the header, zeroes the indices) or
/// [`attach`](Storage::attach)ed to a region an earlier `open_fresh` call
/// already initialised (validates `magic`/`abi_version`, touches nothing
/// else). On drop, the release hook supplied at construction runs exactly
/// once, handing the region pointer back to whichever collaborator produced
/// it (an allocator, an `munmap`, ...).
pub struct Storage {
    region: *mut u8,
    storage_size: u64,
    release: Option<ReleaseHook>,
}

// SAFETY: the three atomic index cells are the only mutable shared state
// (see the shared-resource policy in the design notes); `Storage` carries no
// other interior mutability, and the type enforces nothing about which
// thread calls which accessor — that discipline lives in `Queue`.
unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

impl Storage {
    /// Initialises a fresh header over `region_ptr` and zeroes the index cells.
    ///
    /// # Safety
    ///
    /// `region_ptr` must point to a writable allocation of exactly
    /// `storage_size` bytes that nothing else reads or writes until the
    /// returned `Storage` (and anything built on it) is dropped.
    pub unsafe fn open_fresh(
        region_ptr: *mut u8,
        storage_size: u64,
        release: ReleaseHook,
    ) -> Result<Self, StorageError> {
        validate_region(region_ptr, storage_size)?;

        // SAFETY: validated above to be non-null, aligned, and large enough.
        let header = unsafe { &mut *region_ptr.cast::<Header>() };
        header.magic = MAGIC;
        header.abi_version = ABI_VERSION;
        header.storage_size = storage_size;
        header.read_ix = AtomicU64::new(0);
        header.write_ix = AtomicU64::new(0);
        header.msg_count = AtomicU64::new(0);

        Ok(Self {
            region: region_ptr,
            storage_size,
            release: Some(release),
        })
    }

    /// Attaches to a region an earlier `open_fresh` call already initialised.
    ///
    /// # Safety
    ///
    /// `region_ptr` must point to a region previously initialised by
    /// `open_fresh` (possibly in another process mapping the same bytes),
    /// still live and exclusively owned by this `Storage`/the producer and
    /// consumer built on it.
    pub unsafe fn attach(region_ptr: *mut u8, release: ReleaseHook) -> Result<Self, StorageError> {
        if region_ptr.is_null() {
            return Err(StorageError::NullPointer);
        }
        let addr = region_ptr as usize;
        if addr % 64 != 0 {
            return Err(StorageError::MisalignedRegion { addr });
        }

        // SAFETY: non-null and aligned; reads only the immutable header prefix.
        let header = unsafe { &*region_ptr.cast::<Header>() };
        if header.magic != MAGIC {
            return Err(StorageError::BadMagic {
                found: header.magic,
                expected: MAGIC,
            });
        }
        if header.abi_version != ABI_VERSION {
            return Err(StorageError::AbiMismatch {
                found: header.abi_version,
                expected: ABI_VERSION,
            });
        }
        let storage_size = header.storage_size;
        validate_region(region_ptr, storage_size)?;

        Ok(Self {
            region: region_ptr,
            storage_size,
            release: Some(release),
        })
    }

    #[inline]
    fn header(&self) -> &Header {
        // SAFETY: constructed only via `open_fresh`/`attach`, both of which
        // validate `region` points at a live, correctly sized `Header`.
        unsafe { &*self.region.cast::<Header>() }
    }

    /// Total region size `T`, as supplied at construction.
    #[inline]
    pub fn storage_size(&self) -> u64 {
        self.storage_size
    }

    /// Payload ring size `B = T - 256`.
    #[inline]
    pub fn buffer_size(&self) -> u64 {
        self.storage_size - HEADER_SIZE
    }

    /// Pointer to the start of the ring buffer (`region + 256`).
    #[inline]
    pub fn buffer_ptr(&self) -> *mut u8 {
        // SAFETY: `storage_size > HEADER_SIZE` is a construction invariant.
        unsafe { self.region.add(HEADER_SIZE as usize) }
    }

    #[inline]
    pub(crate) fn read_ix(&self) -> &AtomicU64 {
        &self.header().read_ix
    }

    #[inline]
    pub(crate) fn write_ix(&self) -> &AtomicU64 {
        &self.header().write_ix
    }

    #[inline]
    pub(crate) fn msg_count(&self) -> &AtomicU64 {
        &self.header().msg_count
    }

    /// `magic` and `abi_version`, for diagnostics. Never change after construction.
    pub fn header_tag(&self) -> (u32, u32) {
        (self.header().magic, self.header().abi_version)
    }

    /// Invokes the release hook now instead of waiting for `Drop`.
    ///
    /// After `close`, nothing on this `Storage` may be touched again; the
    /// header is never read past this point (matching §4.1's "never reads
    /// the header after close").
    pub fn close(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.region);
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        self.close();
    }
}

fn validate_region(region_ptr: *mut u8, storage_size: u64) -> Result<(), StorageError> {
    if region_ptr.is_null() {
        return Err(StorageError::NullPointer);
    }
    let addr = region_ptr as usize;
    if addr % 64 != 0 {
        return Err(StorageError::MisalignedRegion { addr });
    }
    let minimum = HEADER_SIZE + MIN_BUFFER_SIZE;
    if storage_size <= HEADER_SIZE || storage_size < minimum {
        return Err(StorageError::RegionTooSmall {
            actual: storage_size,
            minimum,
        });
    }
    let buffer_size = storage_size - HEADER_SIZE;
    if buffer_size % 8 != 0 {
        return Err(StorageError::BufferNotMultipleOfEight { buffer_size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{HeapRegion, MemoryProvider};

    fn fresh_region(size: u64) -> (*mut u8, ReleaseHook) {
        HeapRegion::new().provide(size)
    }

    #[test]
    fn open_fresh_writes_header_and_zeroes_indices() {
        let (ptr, release) = fresh_region(1024);
        let storage = unsafe { Storage::open_fresh(ptr, 1024, release).unwrap() };

        assert_eq!(storage.header_tag(), (MAGIC, ABI_VERSION));
        assert_eq!(storage.storage_size(), 1024);
        assert_eq!(storage.buffer_size(), 768);
        assert_eq!(storage.read_ix().load(Ordering::Relaxed), 0);
        assert_eq!(storage.write_ix().load(Ordering::Relaxed), 0);
        assert_eq!(storage.msg_count().load(Ordering::Relaxed), 0);
    }

    #[test]
    fn open_fresh_rejects_null_pointer() {
        let release: ReleaseHook = Box::new(|_| {});
        let err = unsafe { Storage::open_fresh(std::ptr::null_mut(), 1024, release) }.unwrap_err();
        assert_eq!(err, StorageError::NullPointer);
    }

    #[test]
    fn open_fresh_rejects_too_small_region() {
        let (ptr, release) = fresh_region(256);
        let err = unsafe { Storage::open_fresh(ptr, 256, release) }.unwrap_err();
        assert!(matches!(err, StorageError::RegionTooSmall { .. }));
    }

    #[test]
    fn attach_rejects_bad_magic() {
        let (ptr, release) = fresh_region(1024);
        // Corrupt the magic field before attaching.
        unsafe { ptr.cast::<u32>().write(0xDEAD_BEEF) };
        let err = unsafe { Storage::attach(ptr, release) }.unwrap_err();
        assert_eq!(
            err,
            StorageError::BadMagic {
                found: 0xDEAD_BEEF,
                expected: MAGIC,
            }
        );
    }

    #[test]
    fn attach_rejects_abi_mismatch() {
        let (ptr, release) = fresh_region(1024);
        {
            let release_noop: ReleaseHook = Box::new(|_| {});
            let _storage = unsafe { Storage::open_fresh(ptr, 1024, release_noop).unwrap() };
            std::mem::forget(_storage);
        }
        unsafe { ptr.add(4).cast::<u32>().write(2) };
        let err = unsafe { Storage::attach(ptr, release) }.unwrap_err();
        assert_eq!(
            err,
            StorageError::AbiMismatch {
                found: 2,
                expected: ABI_VERSION,
            }
        );
    }

    #[test]
    fn attach_round_trips_a_fresh_region() {
        let (ptr, release) = fresh_region(2048);
        {
            let release_noop: ReleaseHook = Box::new(|_| {});
            let storage = unsafe { Storage::open_fresh(ptr, 2048, release_noop).unwrap() };
            std::mem::forget(storage);
        }

        let attached = unsafe { Storage::attach(ptr, release).unwrap() };
        assert_eq!(attached.storage_size(), 2048);
        assert_eq!(attached.buffer_size(), 1792);
    }

    #[test]
    fn close_runs_release_hook_exactly_once() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let (ptr, _discard_release) = fresh_region(1024);

        let release: ReleaseHook = Box::new(move |p| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            // SAFETY: same allocation HeapRegion produced above.
            unsafe { std::alloc::dealloc(p, std::alloc::Layout::from_size_align(1024, 64).unwrap()) };
        });
        let mut storage = unsafe { Storage::open_fresh(ptr, 1024, release).unwrap() };

        storage.close();
        storage.close(); // idempotent: the hook must not run twice
        drop(storage);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
