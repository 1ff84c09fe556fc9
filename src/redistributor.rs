//! [`Redistributor`] decides when a segment grows or shrinks its [`BucketArray`].

use sdd::Guard;
use tracing::trace;

use crate::bucket_array::BucketArray;
use crate::error::{Error, Result};
use crate::{DEFAULT_BUCKET_LOAD_FACTOR, DEFAULT_BUCKET_MAX_SIZE, MAX_BUCKET_NUMBER};

/// The average bucket size never falls below this when computing the threshold.
const MIN_AVERAGE: u64 = 100;

/// A segment with fewer buckets than this never shrinks.
const MIN_SHRINK_BUCKETS: usize = 100;

/// The number of buckets never drops below this when shrinking.
const MIN_BUCKET_NUMBER: usize = 2;

/// Classification of the bucket touched by the last put or delete.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BucketStatus {
    /// Nothing to do.
    Normal,
    /// The bucket became empty.
    Underweight,
    /// The bucket holds too many pairs.
    Overweight,
}

/// [`Redistributor`] is the resizing policy of a segment.
///
/// A segment calls the three methods in order, while holding its lock, after every successful
/// put or delete. Each segment owns its own clone of the policy, so implementations may keep
/// state across calls without synchronization.
pub trait Redistributor: Clone + Send + 'static {
    /// Recomputes the overweight threshold from the current totals.
    fn update_threshold(&mut self, pair_total: u64, bucket_count: usize);

    /// Classifies the bucket that was just modified.
    fn check_bucket_status(&mut self, pair_total: u64, bucket_size: u64) -> BucketStatus;

    /// Returns a resized [`BucketArray`] if the policy decides to resize.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Redistribution`] if the resize cannot be carried out. The segment keeps
    /// its current [`BucketArray`] in that case.
    fn redistribute<V: 'static>(
        &mut self,
        status: BucketStatus,
        array: &BucketArray<V>,
        guard: &Guard,
    ) -> Result<Option<BucketArray<V>>>;
}

/// [`DefaultRedistributor`] doubles or halves the number of buckets of a segment.
///
/// A bucket is overweight if it holds more than `bucket_max_size` pairs, or more than
/// `max(pair_total / bucket_count, 100) * load_factor` pairs. The bucket array doubles once the
/// number of overweight observations reaches a quarter of the bucket count. It halves, down to
/// two buckets, once at least 100 buckets exist and the number of observed empty buckets reaches a
/// quarter of the bucket count. Both counters are reset whenever a resize is decided.
///
/// # Examples
///
/// ```
/// use segmap::{BucketStatus, DefaultRedistributor, Redistributor};
///
/// let mut redistributor = DefaultRedistributor::new(0.5).with_bucket_max_size(64);
/// redistributor.update_threshold(1600, 16);
/// assert_eq!(redistributor.upper_threshold(), 50);
/// assert_eq!(redistributor.check_bucket_status(1600, 51), BucketStatus::Overweight);
/// assert_eq!(redistributor.check_bucket_status(1600, 0), BucketStatus::Underweight);
/// assert_eq!(redistributor.check_bucket_status(1600, 10), BucketStatus::Normal);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DefaultRedistributor {
    load_factor: f64,
    bucket_max_size: u64,
    max_bucket_number: usize,
    upper_threshold: u64,
    overweight_count: u64,
    empty_count: u64,
}

impl DefaultRedistributor {
    /// Creates a new [`DefaultRedistributor`].
    ///
    /// A negative or non-finite `load_factor` is replaced with the default of `0.75`.
    #[must_use]
    pub fn new(load_factor: f64) -> Self {
        let load_factor = if load_factor.is_finite() && load_factor >= 0.0 {
            load_factor
        } else {
            DEFAULT_BUCKET_LOAD_FACTOR
        };
        Self {
            load_factor,
            bucket_max_size: DEFAULT_BUCKET_MAX_SIZE,
            max_bucket_number: MAX_BUCKET_NUMBER,
            upper_threshold: 0,
            overweight_count: 0,
            empty_count: 0,
        }
    }

    /// Sets the size above which a bucket is always overweight.
    #[must_use]
    pub fn with_bucket_max_size(mut self, bucket_max_size: u64) -> Self {
        self.bucket_max_size = bucket_max_size;
        self
    }

    /// Sets the number of buckets a segment may grow to.
    #[must_use]
    pub fn with_max_bucket_number(mut self, max_bucket_number: usize) -> Self {
        self.max_bucket_number = max_bucket_number;
        self
    }

    /// Returns the load factor.
    #[must_use]
    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }

    /// Returns the size above which a bucket is always overweight.
    #[must_use]
    pub fn bucket_max_size(&self) -> u64 {
        self.bucket_max_size
    }

    /// Returns the number of buckets a segment may grow to.
    #[must_use]
    pub fn max_bucket_number(&self) -> usize {
        self.max_bucket_number
    }

    /// Returns the threshold computed by the last [`Redistributor::update_threshold`] call.
    #[must_use]
    pub fn upper_threshold(&self) -> u64 {
        self.upper_threshold
    }

    /// Returns the number of overweight observations since the last resize decision.
    #[must_use]
    pub fn overweight_count(&self) -> u64 {
        self.overweight_count
    }

    /// Returns the number of empty-bucket observations since the last resize decision.
    #[must_use]
    pub fn empty_count(&self) -> u64 {
        self.empty_count
    }

    fn reset(&mut self) {
        self.overweight_count = 0;
        self.empty_count = 0;
    }
}

impl Default for DefaultRedistributor {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_LOAD_FACTOR)
    }
}

impl Redistributor for DefaultRedistributor {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )] // Truncating the threshold is intended.
    fn update_threshold(&mut self, pair_total: u64, bucket_count: usize) {
        let average = (pair_total / bucket_count.max(1) as u64).max(MIN_AVERAGE);
        self.upper_threshold = (average as f64 * self.load_factor) as u64;
        trace!(
            pair_total,
            bucket_count,
            average,
            upper_threshold = self.upper_threshold,
            "threshold updated"
        );
    }

    fn check_bucket_status(&mut self, _pair_total: u64, bucket_size: u64) -> BucketStatus {
        if bucket_size > self.bucket_max_size || bucket_size > self.upper_threshold {
            self.overweight_count += 1;
            BucketStatus::Overweight
        } else if bucket_size == 0 {
            self.empty_count += 1;
            BucketStatus::Underweight
        } else {
            BucketStatus::Normal
        }
    }

    fn redistribute<V: 'static>(
        &mut self,
        status: BucketStatus,
        array: &BucketArray<V>,
        guard: &Guard,
    ) -> Result<Option<BucketArray<V>>> {
        let current = array.len();
        let new_len = match status {
            BucketStatus::Overweight => {
                if self.overweight_count.saturating_mul(4) < current as u64 {
                    return Ok(None);
                }
                let limit = self.max_bucket_number;
                match current.checked_mul(2).filter(|n| *n <= limit) {
                    Some(new_len) => new_len,
                    None => {
                        self.reset();
                        return Err(Error::redistribution(format!(
                            "cannot grow {current} buckets beyond {limit}"
                        )));
                    }
                }
            }
            BucketStatus::Underweight => {
                if current < MIN_SHRINK_BUCKETS
                    || self.empty_count.saturating_mul(4) < current as u64
                {
                    return Ok(None);
                }
                (current / 2).max(MIN_BUCKET_NUMBER)
            }
            BucketStatus::Normal => return Ok(None),
        };

        self.reset();
        Ok(Some(array.rehash(new_len, guard)))
    }
}
