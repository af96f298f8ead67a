/// Configuration knobs that do not live in the shared memory region itself.
///
/// Unlike `storage_size`, `magic`, and `abi_version` — which are part of the
/// on-memory header and therefore shared across processes — these settings
/// are local to a single [`crate::Queue`] handle and may differ between the
/// producer's and the consumer's handle without affecting correctness.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Enable the lightweight in-process [`crate::Metrics`] counters.
    ///
    /// Disabled by default: the counters add an extra relaxed fetch-add per
    /// `enqueue`/`dequeue_commit`, which is cheap but not free on the hot path.
    pub enable_metrics: bool,
}

impl QueueConfig {
    /// Creates a new configuration.
    pub const fn new(enable_metrics: bool) -> Self {
        Self { enable_metrics }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
        }
    }
}

/// A configuration with metrics enabled, for diagnostics and benchmarking.
pub const METRICS_CONFIG: QueueConfig = QueueConfig::new(true);
