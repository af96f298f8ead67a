use thiserror::Error;

/// Construction-time failures: the region handed to [`crate::Storage`] does not
/// satisfy the layout contract, or an existing region does not speak this ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The region pointer was null.
    #[error("region pointer is null")]
    NullPointer,
    /// The region's base address is not 64-byte aligned.
    #[error("region base address {addr:#x} is not 64-byte aligned")]
    MisalignedRegion {
        /// The offending base address, for diagnostics.
        addr: usize,
    },
    /// The region is smaller than the header plus one minimum-size frame.
    #[error("region size {actual} is smaller than the minimum {minimum}")]
    RegionTooSmall {
        /// Bytes the caller supplied.
        actual: u64,
        /// Bytes required: header plus one minimum frame.
        minimum: u64,
    },
    /// The payload buffer (region size minus header) is not a multiple of 8.
    #[error("buffer size {buffer_size} is not a multiple of 8")]
    BufferNotMultipleOfEight {
        /// The offending buffer size.
        buffer_size: u64,
    },
    /// `attach` found a header whose magic does not match `SPSC`.
    #[error("bad magic {found:#010x}, expected {expected:#010x}")]
    BadMagic {
        /// Magic value actually found.
        found: u32,
        /// Magic value this crate writes and expects.
        expected: u32,
    },
    /// `attach` found a header whose ABI version this crate does not understand.
    #[error("unsupported ABI version {found}, expected {expected}")]
    AbiMismatch {
        /// ABI version actually found.
        found: u32,
        /// ABI version this crate implements.
        expected: u32,
    },
}

/// Runtime precondition violations on [`crate::Queue::enqueue`].
///
/// These are distinct from "queue full", which is a legitimate runtime outcome
/// (`Ok(false)`), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The caller tried to enqueue a zero-length message.
    #[error("message size must be greater than zero")]
    MessageEmpty,
    /// The caller tried to enqueue a message larger than `max_payload_size()`.
    #[error("message size {size} exceeds max payload size {max}")]
    MessageTooLarge {
        /// The rejected message's size.
        size: u64,
        /// The queue's configured maximum payload size.
        max: u64,
    },
}
