//! Segmented concurrent hash map.
//!
//! # segmap::ConcurrentMap
//! A string-keyed concurrent hash map that spreads its entries across independently locked
//! segments. Each segment owns a bucket array that grows and shrinks on its own, according to a
//! pluggable [`Redistributor`] policy.
//!
//! * Lock-free reads: lookups never take a lock, even while the segment is being resized.
//! * Copy-on-write chains: a delete rebuilds the affected chain prefix instead of unlinking in
//!   place, so a reader never observes a torn chain.
//! * Per-segment resizing: only the segment that became overweight or underweight is rehashed.
//!
//! # Examples
//!
//! ```
//! use segmap::ConcurrentMap;
//!
//! let map: ConcurrentMap<i32> = ConcurrentMap::new(16).unwrap();
//! assert_eq!(map.put("a", 1), Ok(true));
//! assert_eq!(map.get("a"), Some(1));
//! assert!(map.delete("a"));
//! assert!(map.is_empty());
//! ```

mod bucket;
mod bucket_array;
mod error;
mod hash;
mod map;
mod pair;
mod redistributor;
mod segment;

pub use bucket::{Bucket, Iter};
pub use bucket_array::BucketArray;
pub use error::{Error, Result};
pub use hash::hash;
pub use map::{Builder, ConcurrentMap};
pub use pair::Pair;
pub use redistributor::{BucketStatus, DefaultRedistributor, Redistributor};
pub use segment::Segment;

pub use sdd::{Guard, Shared};

/// The default load factor of [`DefaultRedistributor`].
pub const DEFAULT_BUCKET_LOAD_FACTOR: f64 = 0.75;

/// The default number of buckets of a [`Segment`].
pub const DEFAULT_BUCKET_NUMBER: usize = 16;

/// The default size above which a bucket is always overweight.
pub const DEFAULT_BUCKET_MAX_SIZE: u64 = 1000;

/// The maximum number of segments of a [`ConcurrentMap`].
pub const MAX_CONCURRENCY: usize = 65536;

/// The default maximum number of buckets of a [`Segment`].
pub const MAX_BUCKET_NUMBER: usize = 1 << 30;

#[cfg(test)]
mod tests;
