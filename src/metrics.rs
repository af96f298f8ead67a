use std::sync::atomic::{AtomicU64, Ordering};

/// Optional counters for monitoring queue activity.
///
/// Mirrors this code family's existing `Metrics`/`MetricsSnapshot` split: the
/// live counters are atomics embedded in the `Queue` (cheap relaxed
/// fetch-adds, never on the critical ordering path), and [`Metrics::snapshot`]
/// produces a plain-data copy for reporting.
#[derive(Debug, Default)]
pub struct Metrics {
    messages_enqueued: AtomicU64,
    messages_dequeued: AtomicU64,
    full_rejections: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_enqueued(&self) {
        self.messages_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dequeued(&self) {
        self.messages_dequeued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_full_rejection(&self) {
        self.full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_enqueued: self.messages_enqueued.load(Ordering::Relaxed),
            messages_dequeued: self.messages_dequeued.load(Ordering::Relaxed),
            full_rejections: self.full_rejections.load(Ordering::Relaxed),
        }
    }
}

/// A plain-data snapshot of [`Metrics`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Number of messages successfully enqueued.
    pub messages_enqueued: u64,
    /// Number of messages successfully dequeued and committed.
    pub messages_dequeued: u64,
    /// Number of `enqueue` calls that returned `Ok(false)` because the ring was full.
    pub full_rejections: u64,
}
