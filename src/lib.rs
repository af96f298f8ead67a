//! spscq-rs — a lock-free single-producer single-consumer variable-sized
//! message queue over a shared memory region.
//!
//! The protocol core does not allocate or map memory itself: it is handed a
//! pointer to a 64-byte-aligned region by an external [`MemoryProvider`]
//! collaborator (this crate ships [`HeapRegion`] as a single-process
//! reference implementation; real cross-process use backs the same trait
//! with `mmap`/`shm_open`). [`Storage`] owns that region and its fixed
//! header; [`Queue`] implements the enqueue/dequeue protocol on top of it.
//!
//! # Example
//!
//! ```
//! use spscq_rs::{HeapRegion, MemoryProvider, Queue, QueueConfig};
//!
//! let (region, release) = HeapRegion::new().provide(4096);
//! let queue = unsafe { Queue::open_fresh(region, 4096, release, QueueConfig::default()).unwrap() };
//!
//! assert!(queue.enqueue(b"hello").unwrap());
//! let view = queue.dequeue_begin();
//! assert_eq!(view.as_slice(), b"hello");
//! queue.dequeue_commit(view);
//! ```

mod config;
mod error;
mod invariants;
mod memory;
mod metrics;
mod queue;
mod storage;

pub use config::{QueueConfig, METRICS_CONFIG};
pub use error::{QueueError, StorageError};
pub use memory::{HeapRegion, MemoryProvider, ReleaseHook};
pub use metrics::{Metrics, MetricsSnapshot};
pub use queue::{MessageView, Queue};
pub use storage::{Storage, ABI_VERSION, HEADER_SIZE, MAGIC};
