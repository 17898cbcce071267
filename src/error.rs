//! Error types surfaced by [`crate::Vector`].
//!
//! Per the container's narrow failure model, only the handful of conditions a
//! caller can reasonably act on at the call site are modeled as `Result`.
//! Internal invariant violations (a double-release, an out-of-range index on
//! an unallocated bucket) remain hard panics — see the module docs on
//! [`crate::Vector`] for the full breakdown.

use std::fmt;

/// Errors returned by [`crate::Vector`] construction and thread registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// `set_thread_id` was called with an id outside `0..max_threads`.
    #[error("thread id {id} is out of range: must be < max_threads ({max_threads})")]
    ThreadIdOutOfRange {
        /// The offending id.
        id: usize,
        /// The configured bound.
        max_threads: usize,
    },

    /// [`crate::Config`] failed validation at construction time.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of which constraint failed.
        reason: ConfigViolation,
    },
}

/// The specific [`crate::Config`] constraint that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigViolation {
    /// `first_bucket_size` was zero or not a power of two.
    FirstBucketSizeNotPowerOfTwo,
    /// `max_threads` was zero.
    MaxThreadsZero,
    /// `max_pools` was zero or greater than `max_threads`.
    MaxPoolsOutOfRange,
    /// `max_l1_buckets` was too small to ever reach `first_bucket_size` capacity.
    MaxL1BucketsTooSmall,
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConfigViolation::FirstBucketSizeNotPowerOfTwo => {
                "first_bucket_size must be a power of two >= 2"
            }
            ConfigViolation::MaxThreadsZero => "max_threads must be >= 1",
            ConfigViolation::MaxPoolsOutOfRange => "max_pools must satisfy 1 <= max_pools <= max_threads",
            ConfigViolation::MaxL1BucketsTooSmall => "max_l1_buckets must be at least 1",
        };
        f.write_str(msg)
    }
}
