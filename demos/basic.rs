//! Producer/consumer demo over a heap-backed region.
//!
//! Run with `cargo run --example basic --features tracing` to see
//! structured construction diagnostics.

use crossbeam_utils::Backoff;
use spscq_rs::{HeapRegion, MemoryProvider, Queue, QueueConfig};
use std::thread;
use std::time::Instant;

const STORAGE_SIZE: u64 = 1 << 16;
const N: u64 = 1_000_000;

fn main() {
    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt::init();

    let (region, release) = HeapRegion::new().provide(STORAGE_SIZE);
    let queue = unsafe {
        Queue::open_fresh(region, STORAGE_SIZE, release, QueueConfig::new(true)).unwrap()
    };

    #[cfg(feature = "tracing")]
    tracing::info!(
        buffer_size = queue.buffer_size(),
        max_payload_size = queue.max_payload_size(),
        "queue constructed"
    );

    println!("spscq-rs basic demo");
    println!("  buffer_size: {}", queue.buffer_size());
    println!("  max_payload_size: {}", queue.max_payload_size());
    println!("  messages: {N}\n");

    let start = Instant::now();

    let producer = queue.clone();
    let producer_handle = thread::spawn(move || {
        let backoff = Backoff::new();
        for i in 0..N {
            let payload = i.to_le_bytes();
            loop {
                match producer.enqueue(&payload).unwrap() {
                    true => {
                        backoff.reset();
                        break;
                    }
                    false => backoff.snooze(),
                }
            }
        }
    });

    let backoff = Backoff::new();
    let mut checksum = 0u64;
    let mut received = 0u64;
    while received < N {
        let view = queue.dequeue_begin();
        if view.is_empty() {
            backoff.snooze();
            continue;
        }
        backoff.reset();
        let value = u64::from_le_bytes(view.as_slice().try_into().unwrap());
        checksum = checksum.wrapping_add(value);
        queue.dequeue_commit(view);
        received += 1;
    }

    producer_handle.join().unwrap();
    let elapsed = start.elapsed();

    let snapshot = queue.metrics_snapshot();
    println!("done in {elapsed:.2?}");
    println!("  messages_enqueued:  {}", snapshot.messages_enqueued);
    println!("  messages_dequeued:  {}", snapshot.messages_dequeued);
    println!("  full_rejections:    {}", snapshot.full_rejections);
    println!("  checksum:           {checksum}");
}
