//! [`BucketArray`] is the immutable array of [`Bucket`] instances of a segment.

use std::fmt::{self, Debug};

use sdd::Guard;

use crate::bucket::Bucket;

/// [`BucketArray`] is a fixed-length array of [`Bucket`] instances.
///
/// The length of a [`BucketArray`] never changes; a segment is resized by building a new
/// [`BucketArray`] with [`BucketArray::rehash`] and publishing it in place of the old one.
pub struct BucketArray<V> {
    buckets: Box<[Bucket<V>]>,
}

impl<V> BucketArray<V> {
    /// Creates a new [`BucketArray`] of empty buckets.
    ///
    /// `len` is clamped to at least one bucket.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            buckets: (0..len.max(1)).map(|_| Bucket::new()).collect(),
        }
    }

    /// Returns the number of [`Bucket`] instances in the [`BucketArray`].
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Always returns `false`; a [`BucketArray`] has at least one [`Bucket`].
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Calculates the [`Bucket`] index for the hash value.
    #[allow(clippy::cast_possible_truncation)] // The result is smaller than `len`.
    #[inline]
    #[must_use]
    pub fn calculate_bucket_index(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// Returns a reference to a [`Bucket`] at the given position.
    #[inline]
    #[must_use]
    pub fn bucket(&self, index: usize) -> &Bucket<V> {
        &self.buckets[index]
    }

    /// Returns the [`Bucket`] that the hash value is routed to.
    #[inline]
    #[must_use]
    pub fn bucket_for(&self, hash: u64) -> &Bucket<V> {
        self.bucket(self.calculate_bucket_index(hash))
    }

    /// Returns an iterator over the buckets.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Bucket<V>> {
        self.buckets.iter()
    }

    /// Returns the number of pairs stored in all the buckets.
    #[must_use]
    pub fn num_pairs(&self) -> u64 {
        self.buckets.iter().map(Bucket::size).sum()
    }
}

impl<V: 'static> BucketArray<V> {
    /// Builds a new [`BucketArray`] of `new_len` buckets holding a copy of every pair.
    ///
    /// Each pair lands in the bucket at `pair.hash() % new_len`. The order of pairs within a
    /// bucket is unspecified. `self` is left untouched, so readers still traversing it are not
    /// affected.
    #[must_use]
    pub fn rehash(&self, new_len: usize, guard: &Guard) -> Self {
        let new_array = Self::new(new_len);
        for bucket in self.iter() {
            for pair in bucket.iter(guard) {
                new_array
                    .bucket_for(pair.hash())
                    .push(pair.copy(guard), guard);
            }
        }
        new_array
    }
}

impl<V: Debug> Debug for BucketArray<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.buckets.iter()).finish()
    }
}
