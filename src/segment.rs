//! [`Segment`] is an independently locked shard of a [`ConcurrentMap`](crate::ConcurrentMap).

use std::any::Any;
use std::fmt::{self, Debug};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use parking_lot::Mutex;
use sdd::{AtomicShared, Guard, Shared, Tag};
use tracing::{debug, warn};

use crate::bucket_array::BucketArray;
use crate::error::Error;
use crate::hash::hash;
use crate::pair::Pair;
use crate::redistributor::{BucketStatus, Redistributor};
use crate::DEFAULT_BUCKET_NUMBER;

/// Orders redistribution faults across every segment of the process.
static FAULT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// [`Segment`] owns a resizable [`BucketArray`], a pair counter and a [`Redistributor`].
///
/// Puts, deletes and resizes of a [`Segment`] are serialized by its lock. Reads never lock: the
/// current [`BucketArray`] is published atomically, and a reader that loaded an array before it
/// was replaced finishes its lookup against the old array.
pub struct Segment<V, R> {
    array: AtomicShared<BucketArray<V>>,
    pair_total: AtomicU64,
    num_faults: AtomicU64,
    state: Mutex<State<R>>,
}

/// Data only accessed while the lock is held.
struct State<R> {
    redistributor: R,
    /// The most recent fault and its position in [`FAULT_SEQUENCE`].
    last_fault: Option<(u64, Error)>,
}

impl<V: 'static, R: Redistributor> Segment<V, R> {
    /// Creates a new [`Segment`] with `bucket_number` empty buckets.
    ///
    /// `bucket_number == 0` falls back to [`DEFAULT_BUCKET_NUMBER`].
    #[must_use]
    pub fn new(bucket_number: usize, redistributor: R) -> Self {
        let bucket_number = if bucket_number == 0 {
            DEFAULT_BUCKET_NUMBER
        } else {
            bucket_number
        };
        Self {
            array: AtomicShared::new(BucketArray::new(bucket_number)),
            pair_total: AtomicU64::new(0),
            num_faults: AtomicU64::new(0),
            state: Mutex::new(State {
                redistributor,
                last_fault: None,
            }),
        }
    }

    /// Inserts the [`Pair`], or replaces the element of the entry with the same key.
    ///
    /// Returns `true` if a new entry was created.
    pub fn put(&self, pair: Pair<V>) -> bool {
        let mut state = self.state.lock();
        let guard = Guard::new();
        let array = self.current_array(&guard);
        let bucket = array.bucket_for(pair.hash());
        let inserted = bucket.put(pair, &guard);
        let pair_total = if inserted {
            self.pair_total.fetch_add(1, Relaxed) + 1
        } else {
            self.pair_total.load(Relaxed)
        };
        self.redistribute(&mut state, array, pair_total, bucket.size(), &guard);
        inserted
    }

    /// Removes the entry with the key.
    ///
    /// Returns `false` if the key is not found.
    pub fn delete(&self, key: &str) -> bool {
        self.delete_with_hash(key, hash(key))
    }

    /// Removes the entry with the key whose hash was already computed.
    pub fn delete_with_hash(&self, key: &str, hash: u64) -> bool {
        let mut state = self.state.lock();
        let guard = Guard::new();
        let array = self.current_array(&guard);
        let bucket = array.bucket_for(hash);
        if !bucket.delete(key, &guard) {
            return false;
        }
        let pair_total = self.pair_total.fetch_sub(1, Relaxed) - 1;
        self.redistribute(&mut state, array, pair_total, bucket.size(), &guard);
        true
    }

    /// Runs the [`Redistributor`] and publishes a resized [`BucketArray`] if it produced one.
    ///
    /// Faults, including panics raised by the [`Redistributor`], are recorded and never
    /// propagated to the put or delete that triggered the check.
    fn redistribute(
        &self,
        state: &mut State<R>,
        array: &BucketArray<V>,
        pair_total: u64,
        bucket_size: u64,
        guard: &Guard,
    ) {
        let bucket_count = array.len();
        let redistributor = &mut state.redistributor;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            redistributor.update_threshold(pair_total, bucket_count);
            let status = redistributor.check_bucket_status(pair_total, bucket_size);
            redistributor
                .redistribute(status, array, guard)
                .map(|new_array| new_array.map(|a| (status, a)))
        }))
        .unwrap_or_else(|payload| Err(Error::redistribution(panic_message(payload.as_ref()))));

        match outcome {
            Ok(Some((status, new_array))) => {
                debug!(
                    ?status,
                    pair_total,
                    from = bucket_count,
                    to = new_array.len(),
                    "segment resized"
                );
                drop(
                    self.array
                        .swap((Some(Shared::new(new_array)), Tag::None), Release),
                );
            }
            Ok(None) => (),
            Err(error) => {
                let num_faults = self.num_faults.fetch_add(1, Relaxed) + 1;
                warn!(%error, num_faults, bucket_count, pair_total, "redistribution failed");
                state.last_fault = Some((FAULT_SEQUENCE.fetch_add(1, Relaxed), error));
            }
        }
    }
}

impl<V, R> Segment<V, R> {
    /// Returns the value associated with the key.
    #[inline]
    pub fn get(&self, key: &str) -> Option<Shared<V>> {
        self.get_with_hash(key, hash(key))
    }

    /// Returns the value associated with the key whose hash was already computed.
    #[inline]
    pub fn get_with_hash(&self, key: &str, hash: u64) -> Option<Shared<V>> {
        let guard = Guard::new();
        self.current_array(&guard)
            .bucket_for(hash)
            .get(key, &guard)
            .map(|pair| pair.element_shared(&guard))
    }

    /// Reads the entry with the key.
    ///
    /// Returns `None` if the key is not found.
    #[inline]
    pub fn read<U, F: FnOnce(&str, &V) -> U>(&self, key: &str, hash: u64, reader: F) -> Option<U> {
        let guard = Guard::new();
        self.current_array(&guard)
            .bucket_for(hash)
            .get(key, &guard)
            .map(|pair| reader(pair.key(), pair.element(&guard)))
    }

    /// Returns the number of pairs in the [`Segment`].
    #[inline]
    pub fn size(&self) -> u64 {
        self.pair_total.load(Relaxed)
    }

    /// Returns the current number of buckets.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        let guard = Guard::new();
        self.current_array(&guard).len()
    }

    /// Returns the number of redistribution faults recorded so far.
    #[inline]
    pub fn redistribution_faults(&self) -> u64 {
        self.num_faults.load(Relaxed)
    }

    /// Returns the most recent redistribution fault.
    #[inline]
    pub fn last_redistribution_error(&self) -> Option<Error> {
        self.last_fault().map(|(_, error)| error)
    }

    /// Returns the most recent redistribution fault with its sequence number.
    ///
    /// A larger sequence number means a later fault, also across segments.
    pub(crate) fn last_fault(&self) -> Option<(u64, Error)> {
        self.state.lock().last_fault.clone()
    }

    fn current_array<'g>(&self, guard: &'g Guard) -> &'g BucketArray<V> {
        let Some(array) = self.array.load(Acquire, guard).as_ref() else {
            unreachable!("a segment always has a bucket array");
        };
        array
    }
}

impl<V: Debug, R> Debug for Segment<V, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = Guard::new();
        f.debug_struct("Segment")
            .field("pair_total", &self.size())
            .field("buckets", self.current_array(&guard))
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "redistributor panicked".to_string()
    }
}
