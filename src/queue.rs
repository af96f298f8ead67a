//! The SPSC protocol: `enqueue`, the two-phase `dequeue_begin`/`dequeue_commit`,
//! and the non-destructive queries built on top of [`Storage`]'s three index cells.

use std::marker::PhantomData;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::QueueConfig;
use crate::error::{QueueError, StorageError};
use crate::invariants::{debug_assert_bounded_count, debug_assert_index_aligned, debug_assert_valid_view_ptr};
use crate::memory::ReleaseHook;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::storage::{align_up_8, Storage};

struct Inner {
    storage: Storage,
    buffer_size: u64,
    max_message_size: u64,
    max_payload_size: u64,
    metrics: Metrics,
    config: QueueConfig,
}

/// A handle to the SPSC protocol bound to one [`Storage`].
///
/// `Queue` itself holds no mutable state beyond the derived constants cached
/// at construction; every mutation goes through `Storage`'s three atomic
/// index cells. Cloning a `Queue` clones the handle (an `Arc` bump), not the
/// queue — the same discipline this code family's `Channel` uses for its
/// producer/consumer handles.
///
/// Nothing here enforces single-producer/single-consumer at the type level:
/// calling `enqueue` from two threads, or `dequeue_begin`/`dequeue_commit`
/// from two threads, is a documented precondition violation, not a checked
/// one, matching how this family trusts the same boundary on `Ring<T>`.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("buffer_size", &self.inner.buffer_size)
            .field("max_payload_size", &self.inner.max_payload_size)
            .field("length", &self.length())
            .finish()
    }
}

/// A borrowed, zero-copy view of one dequeued frame's payload.
///
/// Valid until the matching [`Queue::dequeue_commit`] call; the consumer must
/// not retain `data` past that point. An empty queue yields
/// [`MessageView::is_empty`] `== true`, with `data` null and `size == 0`.
pub struct MessageView<'q> {
    size: u64,
    data: *const u8,
    index: u64,
    _marker: PhantomData<&'q Queue>,
}

impl<'q> MessageView<'q> {
    fn empty() -> Self {
        Self {
            size: 0,
            data: std::ptr::null(),
            index: 0,
            _marker: PhantomData,
        }
    }

    /// `true` iff the queue was observed empty; there is no frame to read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The payload's length in bytes. `0` iff [`Self::is_empty`].
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The payload bytes, borrowed from the ring. Empty slice iff [`Self::is_empty`].
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        if self.size == 0 {
            return &[];
        }
        debug_assert_valid_view_ptr!(self.data);
        // SAFETY: `data` points at `size` live payload bytes inside the ring,
        // valid until the matching `dequeue_commit`, which this borrow's
        // lifetime prevents from happening first.
        unsafe { std::slice::from_raw_parts(self.data, self.size as usize) }
    }
}

impl Queue {
    fn from_storage(storage: Storage, config: QueueConfig) -> Result<Self, StorageError> {
        let buffer_size = storage.buffer_size();
        let max_message_size = buffer_size / 2;
        let max_payload_size = max_message_size - 8;

        Ok(Self {
            inner: Arc::new(Inner {
                storage,
                buffer_size,
                max_message_size,
                max_payload_size,
                metrics: Metrics::new(),
                config,
            }),
        })
    }

    /// Initialises a fresh [`Storage`] over `region_ptr` and wraps it in a `Queue`.
    ///
    /// # Safety
    ///
    /// Same contract as [`Storage::open_fresh`]: `region_ptr` must point to a
    /// writable, exclusively-owned allocation of exactly `storage_size` bytes.
    pub unsafe fn open_fresh(
        region_ptr: *mut u8,
        storage_size: u64,
        release: ReleaseHook,
        config: QueueConfig,
    ) -> Result<Self, StorageError> {
        let storage = unsafe { Storage::open_fresh(region_ptr, storage_size, release)? };
        Self::from_storage(storage, config)
    }

    /// Attaches to a region an earlier `open_fresh` call already initialised.
    ///
    /// # Safety
    ///
    /// Same contract as [`Storage::attach`].
    pub unsafe fn attach(
        region_ptr: *mut u8,
        release: ReleaseHook,
        config: QueueConfig,
    ) -> Result<Self, StorageError> {
        let storage = unsafe { Storage::attach(region_ptr, release)? };
        Self::from_storage(storage, config)
    }

    /// Payload ring size `B`.
    #[inline]
    pub fn buffer_size(&self) -> u64 {
        self.inner.buffer_size
    }

    /// Largest frame (header + payload) that fits the "at least two frames"
    /// rule, `floor(B/2)`.
    #[inline]
    pub fn max_message_size(&self) -> u64 {
        self.inner.max_message_size
    }

    /// Largest payload `enqueue` will accept, `max_message_size() - 8`.
    #[inline]
    pub fn max_payload_size(&self) -> u64 {
        self.inner.max_payload_size
    }

    /// A snapshot of the opt-in metrics counters. Unchanging if
    /// [`QueueConfig::enable_metrics`] was `false` at construction.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// `(magic, abi_version)` of the underlying region. Unchanged by any
    /// `enqueue`/`dequeue` sequence; exposed for diagnostics.
    pub fn header_tag(&self) -> (u32, u32) {
        self.inner.storage.header_tag()
    }

    /// Producer-only. Copies `payload` into the ring as one frame.
    ///
    /// `Ok(true)` on success, `Ok(false)` if the ring has no room (not an
    /// error — the caller decides retry policy), `Err` if `payload` violates
    /// the size precondition.
    pub fn enqueue(&self, payload: &[u8]) -> Result<bool, QueueError> {
        let size = payload.len() as u64;
        if size == 0 {
            return Err(QueueError::MessageEmpty);
        }
        if size > self.inner.max_payload_size {
            return Err(QueueError::MessageTooLarge {
                size,
                max: self.inner.max_payload_size,
            });
        }

        let storage = &self.inner.storage;
        let buffer_size = self.inner.buffer_size;
        let buffer = storage.buffer_ptr();

        let read_ix = storage.read_ix().load(Ordering::Acquire);
        let write_ix = storage.write_ix().load(Ordering::Relaxed);
        let total = 8 + size;
        let next_w = align_up_8(write_ix + total);

        let published = if next_w < buffer_size {
            // Case A: frame fits without crossing the end of the buffer.
            if write_ix < read_ix && next_w >= read_ix {
                return self.reject_full();
            }
            // SAFETY: `write_ix..next_w` is within `[0, buffer_size)` and, per
            // the check above, does not overlap the consumer's unread region;
            // the producer is the sole writer of this span.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    payload.as_ptr(),
                    buffer.add((write_ix + 8) as usize),
                    size as usize,
                );
                buffer.add(write_ix as usize).cast::<u64>().write(size);
            }
            next_w
        } else {
            // Case B: frame would cross the end; wrap to offset 0.
            let sentinel_end = write_ix + 8;
            if write_ix < read_ix && sentinel_end >= read_ix {
                return self.reject_full();
            }
            let wrapped_next_w = align_up_8(total);
            if wrapped_next_w >= read_ix {
                return self.reject_full();
            }
            // SAFETY: the wrapped frame lands in `[0, wrapped_next_w)`, which
            // per the check above does not reach `read_ix`; the sentinel slot
            // at `write_ix` was checked separately above.
            unsafe {
                std::ptr::copy_nonoverlapping(payload.as_ptr(), buffer.add(8), size as usize);
                buffer.cast::<u64>().write(size);
                // Sentinel is written last: any consumer observing it via the
                // `write_ix` release below has already observed the wrapped
                // frame at offset 0.
                buffer.add(write_ix as usize).cast::<u64>().write(0);
            }
            wrapped_next_w
        };

        debug_assert_index_aligned!("write_ix", published);
        storage.write_ix().store(published, Ordering::Release);
        let new_count = storage.msg_count().fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert_bounded_count!(new_count, buffer_size / 8);

        if self.inner.config.enable_metrics {
            self.inner.metrics.record_enqueued();
        }
        Ok(true)
    }

    #[cold]
    fn reject_full(&self) -> Result<bool, QueueError> {
        if self.inner.config.enable_metrics {
            self.inner.metrics.record_full_rejection();
        }
        Ok(false)
    }

    /// Consumer-only. Returns a zero-copy view of the next frame, or an
    /// empty view if the queue has nothing to read. Skips wrap-sentinel
    /// frames transparently.
    pub fn dequeue_begin(&self) -> MessageView<'_> {
        let storage = &self.inner.storage;
        let buffer = storage.buffer_ptr();

        loop {
            let read_ix = storage.read_ix().load(Ordering::Relaxed);
            let write_ix = storage.write_ix().load(Ordering::Acquire);
            if read_ix == write_ix {
                return MessageView::empty();
            }

            // SAFETY: `write_ix`'s acquire load above synchronises-with the
            // producer's release store, making the frame header at `read_ix`
            // (written strictly before that release) visible here.
            let size = unsafe { buffer.add(read_ix as usize).cast::<u64>().read() };
            if size == 0 {
                debug_assert_index_aligned!("read_ix", read_ix);
                storage.read_ix().store(0, Ordering::Release);
                continue;
            }

            // SAFETY: same synchronisation as above covers the payload bytes.
            let data = unsafe { buffer.add((read_ix + 8) as usize) };
            return MessageView {
                size,
                data,
                index: read_ix,
                _marker: PhantomData,
            };
        }
    }

    /// Consumer-only. Advances past the frame `view` borrowed and releases
    /// the slot back to the producer. A no-op on an already-empty view.
    pub fn dequeue_commit(&self, view: MessageView<'_>) {
        if view.is_empty() {
            return;
        }
        let storage = &self.inner.storage;
        let next_r = align_up_8(view.index + view.size + 8);
        debug_assert_index_aligned!("read_ix", next_r);
        storage.read_ix().store(next_r, Ordering::Release);
        storage.msg_count().fetch_sub(1, Ordering::AcqRel);

        if self.inner.config.enable_metrics {
            self.inner.metrics.record_dequeued();
        }
    }

    /// Best-effort snapshot: `true` iff `read_ix == write_ix` at the moment of the call.
    pub fn is_empty(&self) -> bool {
        let storage = &self.inner.storage;
        let read_ix = storage.read_ix().load(Ordering::Acquire);
        let write_ix = storage.write_ix().load(Ordering::Acquire);
        read_ix == write_ix
    }

    /// Consumer-only. `true` iff a `dequeue_begin` call would return a non-empty view.
    pub fn can_dequeue(&self) -> bool {
        let storage = &self.inner.storage;
        let read_ix = storage.read_ix().load(Ordering::Relaxed);
        let write_ix = storage.write_ix().load(Ordering::Acquire);
        read_ix != write_ix
    }

    /// In-flight message count. A lower bound from the consumer's side, an
    /// upper bound from the producer's side (see module docs).
    pub fn length(&self) -> u64 {
        self.inner.storage.msg_count().load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{HeapRegion, MemoryProvider};

    fn fresh_queue(storage_size: u64) -> Queue {
        let (ptr, release) = HeapRegion::new().provide(storage_size);
        unsafe { Queue::open_fresh(ptr, storage_size, release, QueueConfig::default()).unwrap() }
    }

    #[test]
    fn fresh_queue_reports_derived_constants() {
        let q = fresh_queue(1024);
        assert!(q.is_empty());
        assert!(!q.can_dequeue());
        assert_eq!(q.length(), 0);
        assert_eq!(q.buffer_size(), 768);
        assert_eq!(q.max_message_size(), 384);
        assert_eq!(q.max_payload_size(), 376);
    }

    #[test]
    fn enqueue_then_dequeue_round_trips_small_payload() {
        let q = fresh_queue(1024);
        let ok = q.enqueue(&[1, 2, 3, 4, 5]).unwrap();
        assert!(ok);
        assert!(!q.is_empty());
        assert!(q.can_dequeue());
        assert_eq!(q.length(), 1);

        let view = q.dequeue_begin();
        assert!(!view.is_empty());
        assert_eq!(view.size(), 5);
        assert_eq!(view.as_slice(), &[1, 2, 3, 4, 5]);
        let index = view.index;
        q.dequeue_commit(view);

        assert_eq!(index, 0);
        assert!(q.is_empty());
        assert_eq!(q.length(), 0);
    }

    #[test]
    fn five_small_frames_advance_write_ix_by_sixteen_each() {
        let q = fresh_queue(1024);
        for i in 1..=5u64 {
            assert!(q.enqueue(&[0u8; 8]).unwrap());
            assert_eq!(q.length(), i);
        }
        assert_eq!(
            q.inner.storage.write_ix().load(Ordering::Relaxed),
            5 * 16
        );
    }

    #[test]
    fn oversize_payload_is_rejected_without_mutation() {
        let q = fresh_queue(1024);
        let payload = vec![0u8; 400];
        let err = q.enqueue(&payload).unwrap_err();
        assert_eq!(err, QueueError::MessageTooLarge { size: 400, max: 376 });
        assert!(q.is_empty());
        assert_eq!(q.length(), 0);
    }

    #[test]
    fn empty_payload_is_rejected() {
        let q = fresh_queue(1024);
        let err = q.enqueue(&[]).unwrap_err();
        assert_eq!(err, QueueError::MessageEmpty);
    }

    #[test]
    fn fill_drain_and_refill_exercises_wrap() {
        let q = fresh_queue(1024);
        let payload = [0xABu8; 20];
        let mut enqueued = 0;
        while q.enqueue(&payload).unwrap() {
            enqueued += 1;
        }
        assert!(enqueued > 0);

        let view = q.dequeue_begin();
        assert_eq!(view.as_slice(), &payload);
        q.dequeue_commit(view);

        assert!(q.enqueue(&payload).unwrap());

        let mut drained = 0;
        loop {
            let view = q.dequeue_begin();
            if view.is_empty() {
                break;
            }
            assert_eq!(view.as_slice(), &payload);
            q.dequeue_commit(view);
            drained += 1;
        }
        assert_eq!(drained, enqueued);
        assert!(q.is_empty());
    }

    #[test]
    fn fifo_order_is_preserved_across_many_varied_sizes() {
        let q = fresh_queue(4096);
        let payloads: Vec<Vec<u8>> = (0u8..64).map(|n| vec![n; (n as usize % 40) + 1]).collect();

        let mut enqueued_idx = 0;
        let mut dequeued_idx = 0;
        while dequeued_idx < payloads.len() {
            if enqueued_idx < payloads.len() && q.enqueue(&payloads[enqueued_idx]).unwrap() {
                enqueued_idx += 1;
                continue;
            }
            let view = q.dequeue_begin();
            if view.is_empty() {
                assert!(enqueued_idx < payloads.len());
                assert!(q.enqueue(&payloads[enqueued_idx]).unwrap());
                enqueued_idx += 1;
                continue;
            }
            assert_eq!(view.as_slice(), &payloads[dequeued_idx][..]);
            q.dequeue_commit(view);
            dequeued_idx += 1;
        }
    }
}
