//! [`ConcurrentMap`] is a segmented concurrent hash map keyed by strings.

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;

use crate::error::{Error, Result};
use crate::hash::{hash, segment_index};
use crate::pair::Pair;
use crate::redistributor::{DefaultRedistributor, Redistributor};
use crate::segment::Segment;
use crate::{DEFAULT_BUCKET_NUMBER, MAX_CONCURRENCY};

/// The number of segments a [`Builder`] creates unless told otherwise.
const DEFAULT_CONCURRENCY: usize = 16;

/// Segmented concurrent hash map.
///
/// [`ConcurrentMap`] splits its entries across a fixed number of [`Segment`] instances chosen at
/// construction. Each segment has its own lock, bucket array and [`Redistributor`], so writers
/// touching different segments never contend.
///
/// ## Locking behavior
///
/// ### Read
///
/// Reads never lock. Bucket arrays and bucket chains are published atomically and protected by
/// [`sdd`], so a read observes either the state before or after a concurrent write.
///
/// ### Write
///
/// Puts and deletes lock the segment the key belongs to. Entries are never modified in place in a
/// way a concurrent reader could observe halfway: deletes rebuild the affected chain prefix and
/// publish it with a single atomic store.
///
/// ### Resize
///
/// After a put or delete, the segment asks its [`Redistributor`] whether to grow or shrink its
/// bucket array. A resize builds a complete new array while still holding the segment lock, then
/// publishes it; readers that loaded the previous array finish against it undisturbed.
///
/// ## Counting
///
/// [`ConcurrentMap::len`] is maintained with atomic counters and is a best-effort snapshot while
/// writers are active.
pub struct ConcurrentMap<V, R = DefaultRedistributor> {
    segments: Box<[Segment<V, R>]>,
    total: AtomicU64,
}

/// [`Builder`] configures a [`ConcurrentMap`].
///
/// # Examples
///
/// ```
/// use segmap::{ConcurrentMap, DefaultRedistributor};
///
/// let map: ConcurrentMap<u64> = ConcurrentMap::builder()
///     .concurrency(8)
///     .bucket_number(64)
///     .redistributor(DefaultRedistributor::new(0.5))
///     .build()
///     .unwrap();
/// assert_eq!(map.concurrency(), 8);
/// ```
pub struct Builder<V, R = DefaultRedistributor> {
    concurrency: usize,
    bucket_number: usize,
    redistributor: R,
    _marker: PhantomData<fn() -> V>,
}

impl<V: 'static> ConcurrentMap<V, DefaultRedistributor> {
    /// Creates an empty [`ConcurrentMap`] with `concurrency` segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `concurrency` is zero or greater than
    /// [`MAX_CONCURRENCY`].
    ///
    /// # Examples
    ///
    /// ```
    /// use segmap::{ConcurrentMap, Error};
    ///
    /// let map: ConcurrentMap<i32> = ConcurrentMap::new(16).unwrap();
    /// assert_eq!(map.concurrency(), 16);
    ///
    /// assert!(matches!(ConcurrentMap::<i32>::new(0), Err(Error::InvalidInput(_))));
    /// assert!(matches!(ConcurrentMap::<i32>::new(100_000), Err(Error::InvalidInput(_))));
    /// ```
    #[inline]
    pub fn new(concurrency: usize) -> Result<Self> {
        Self::with_redistributor(concurrency, DefaultRedistributor::default())
    }

    /// Returns a [`Builder`] with the default configuration.
    #[inline]
    #[must_use]
    pub fn builder() -> Builder<V, DefaultRedistributor> {
        Builder::default()
    }
}

impl<V: 'static, R: Redistributor> ConcurrentMap<V, R> {
    /// Creates an empty [`ConcurrentMap`] whose segments each own a clone of `redistributor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `concurrency` is zero or greater than
    /// [`MAX_CONCURRENCY`].
    #[inline]
    pub fn with_redistributor(concurrency: usize, redistributor: R) -> Result<Self> {
        Self::with_config(concurrency, DEFAULT_BUCKET_NUMBER, &redistributor)
    }

    fn with_config(concurrency: usize, bucket_number: usize, redistributor: &R) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::invalid_input("concurrency is too small"));
        }
        if concurrency > MAX_CONCURRENCY {
            return Err(Error::invalid_input(format!(
                "concurrency is too large: {concurrency} > {MAX_CONCURRENCY}"
            )));
        }
        let segments = (0..concurrency)
            .map(|_| Segment::new(bucket_number, redistributor.clone()))
            .collect();
        Ok(Self {
            segments,
            total: AtomicU64::new(0),
        })
    }

    /// Inserts a key-value pair, replacing the value if the key exists.
    ///
    /// Returns `true` if a new entry was created and `false` if the value of an existing entry
    /// was replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `value` is `None`; the map is left unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use segmap::{ConcurrentMap, Error};
    ///
    /// let map: ConcurrentMap<i32> = ConcurrentMap::new(1).unwrap();
    /// assert_eq!(map.put("a", 1), Ok(true));
    /// assert_eq!(map.put("a", 2), Ok(false));
    /// assert_eq!(map.get("a"), Some(2));
    /// assert_eq!(map.len(), 1);
    ///
    /// assert!(matches!(map.put("b", None::<i32>), Err(Error::InvalidInput(_))));
    /// assert_eq!(map.len(), 1);
    /// ```
    #[inline]
    pub fn put<K: Into<String>, T: Into<Option<V>>>(&self, key: K, value: T) -> Result<bool> {
        let pair = Pair::new(key.into(), value.into())?;
        let inserted = self.segment(pair.hash()).put(pair);
        if inserted {
            self.total.fetch_add(1, Relaxed);
        }
        Ok(inserted)
    }

    /// Removes the entry with the key.
    ///
    /// Returns `false` if the key is not found.
    ///
    /// # Examples
    ///
    /// ```
    /// use segmap::ConcurrentMap;
    ///
    /// let map: ConcurrentMap<i32> = ConcurrentMap::new(4).unwrap();
    /// assert!(!map.delete("a"));
    /// assert!(map.put("a", 1).unwrap());
    /// assert!(map.delete("a"));
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    pub fn delete(&self, key: &str) -> bool {
        let hash = hash(key);
        if self.segment(hash).delete_with_hash(key, hash) {
            self.total.fetch_sub(1, Relaxed);
            return true;
        }
        false
    }
}

impl<V, R> ConcurrentMap<V, R> {
    /// Returns a copy of the value associated with the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use segmap::ConcurrentMap;
    ///
    /// let map: ConcurrentMap<String> = ConcurrentMap::new(4).unwrap();
    /// assert!(map.get("a").is_none());
    /// assert!(map.put("a", "b".to_string()).unwrap());
    /// assert_eq!(map.get("a").as_deref(), Some("b"));
    /// ```
    #[inline]
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.read(key, |_, v| v.clone())
    }

    /// Reads the entry with the key without copying the value.
    ///
    /// Returns `None` if the key is not found.
    ///
    /// # Examples
    ///
    /// ```
    /// use segmap::ConcurrentMap;
    ///
    /// let map: ConcurrentMap<Vec<u8>> = ConcurrentMap::new(4).unwrap();
    /// assert!(map.put("a", vec![1_u8, 2, 3]).unwrap());
    /// assert_eq!(map.read("a", |_, v| v.len()), Some(3));
    /// ```
    #[inline]
    pub fn read<U, F: FnOnce(&str, &V) -> U>(&self, key: &str, reader: F) -> Option<U> {
        let hash = hash(key);
        self.segment(hash).read(key, hash, reader)
    }

    /// Returns `true` if the key is present.
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.read(key, |_, _| ()).is_some()
    }

    /// Returns the number of entries.
    #[inline]
    pub fn len(&self) -> u64 {
        self.total.load(Relaxed)
    }

    /// Returns `true` if the map holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of segments.
    #[inline]
    pub fn concurrency(&self) -> usize {
        self.segments.len()
    }

    /// Returns the total number of redistribution faults recorded by all the segments.
    ///
    /// A fault means a segment could not resize after a put or delete; the put or delete itself
    /// succeeded.
    #[inline]
    pub fn redistribution_faults(&self) -> u64 {
        self.segments.iter().map(Segment::redistribution_faults).sum()
    }

    /// Returns the most recent redistribution fault recorded by any segment.
    #[inline]
    pub fn last_redistribution_error(&self) -> Option<Error> {
        self.segments
            .iter()
            .filter_map(Segment::last_fault)
            .max_by_key(|(sequence, _)| *sequence)
            .map(|(_, error)| error)
    }

    fn segment(&self, hash: u64) -> &Segment<V, R> {
        &self.segments[segment_index(hash, self.segments.len())]
    }
}

impl<V: 'static> Default for ConcurrentMap<V, DefaultRedistributor> {
    /// Creates an empty [`ConcurrentMap`] with the default configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use segmap::ConcurrentMap;
    ///
    /// let map: ConcurrentMap<u64> = ConcurrentMap::default();
    /// assert_eq!(map.concurrency(), 16);
    /// ```
    #[inline]
    fn default() -> Self {
        let redistributor = DefaultRedistributor::default();
        Self {
            segments: (0..DEFAULT_CONCURRENCY)
                .map(|_| Segment::new(DEFAULT_BUCKET_NUMBER, redistributor.clone()))
                .collect(),
            total: AtomicU64::new(0),
        }
    }
}

impl<V: Debug, R> Debug for ConcurrentMap<V, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("len", &self.len())
            .field("segments", &self.segments)
            .finish()
    }
}

impl<V: 'static, R: Redistributor> Builder<V, R> {
    /// Sets the number of segments.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the initial number of buckets of each segment.
    ///
    /// Zero falls back to [`DEFAULT_BUCKET_NUMBER`].
    #[must_use]
    pub fn bucket_number(mut self, bucket_number: usize) -> Self {
        self.bucket_number = bucket_number;
        self
    }

    /// Sets the [`Redistributor`] cloned into every segment.
    #[must_use]
    pub fn redistributor<S: Redistributor>(self, redistributor: S) -> Builder<V, S> {
        Builder {
            concurrency: self.concurrency,
            bucket_number: self.bucket_number,
            redistributor,
            _marker: PhantomData,
        }
    }

    /// Creates the [`ConcurrentMap`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configured concurrency is zero or greater than
    /// [`MAX_CONCURRENCY`].
    pub fn build(self) -> Result<ConcurrentMap<V, R>> {
        ConcurrentMap::with_config(self.concurrency, self.bucket_number, &self.redistributor)
    }
}

impl<V> Default for Builder<V, DefaultRedistributor> {
    #[inline]
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            bucket_number: DEFAULT_BUCKET_NUMBER,
            redistributor: DefaultRedistributor::default(),
            _marker: PhantomData,
        }
    }
}

impl<V, R: Debug> Debug for Builder<V, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("concurrency", &self.concurrency)
            .field("bucket_number", &self.bucket_number)
            .field("redistributor", &self.redistributor)
            .finish()
    }
}
