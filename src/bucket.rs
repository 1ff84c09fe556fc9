//! [`Bucket`] is the head of a copy-on-write chain of [`Pair`] instances.

use std::fmt::{self, Debug};
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use sdd::{AtomicShared, Guard, Shared, Tag};

use crate::pair::Pair;

/// [`Bucket`] owns one hash chain of a segment.
///
/// Readers traverse the chain without locking. Methods that modify the chain must be serialized
/// by the owner of the [`Bucket`]; a segment only calls them while holding its lock. A
/// modification becomes visible to readers through a single atomic store of the chain head, and
/// nodes that readers may still be traversing are never modified in a way that breaks the chain
/// they belong to.
pub struct Bucket<V> {
    /// The first [`Pair`]; null if the [`Bucket`] is empty.
    head: AtomicShared<Pair<V>>,
    /// Number of pairs in the chain.
    size: AtomicU64,
}

/// [`Iter`] walks the chain of a [`Bucket`] as it was when the iterator was created.
pub struct Iter<'g, V> {
    current: Option<&'g Pair<V>>,
    guard: &'g Guard,
}

impl<V: 'static> Bucket<V> {
    /// Inserts the [`Pair`], or replaces the element of the [`Pair`] with the same key.
    ///
    /// Returns `true` if the [`Pair`] was linked as a new entry, and `false` if the key was
    /// already present, in which case only the element of the existing node is replaced.
    ///
    /// The caller must hold the lock of the owning segment.
    pub fn put(&self, pair: Pair<V>, guard: &Guard) -> bool {
        if let Some(existing) = self.get(pair.key(), guard) {
            existing.set_element_shared(pair.element_shared(guard));
            return false;
        }
        self.push(pair, guard);
        true
    }

    /// Unlinks the [`Pair`] with the key.
    ///
    /// Every node in front of the target is copied and the copies are chained to the successor of
    /// the target, then the new head is published. A reader that loaded the old head keeps
    /// traversing the old, unmodified chain. Returns `false` if the key is not found.
    ///
    /// The caller must hold the lock of the owning segment.
    pub fn delete(&self, key: &str, guard: &Guard) -> bool {
        let mut prefix = Vec::new();
        let mut target = None;
        for pair in self.iter(guard) {
            if pair.key() == key {
                target = Some(pair);
                break;
            }
            prefix.push(pair);
        }
        let Some(target) = target else {
            return false;
        };

        let mut new_head = target.next_shared(guard);
        for pair in prefix.into_iter().rev() {
            let copied = pair.copy(guard);
            copied.set_next(new_head);
            new_head = Some(Shared::new(copied));
        }
        drop(self.head.swap((new_head, Tag::None), Release));
        self.size.fetch_sub(1, Relaxed);
        true
    }

    /// Links the [`Pair`] in front of the chain without looking for the same key.
    pub(crate) fn push(&self, pair: Pair<V>, guard: &Guard) {
        pair.set_next(self.head.get_shared(Relaxed, guard));
        drop(self.head.swap((Some(Shared::new(pair)), Tag::None), Release));
        self.size.fetch_add(1, Relaxed);
    }
}

impl<V> Bucket<V> {
    /// Creates an empty [`Bucket`].
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: AtomicShared::null(),
            size: AtomicU64::new(0),
        }
    }

    /// Returns the first [`Pair`] with the key.
    #[inline]
    pub fn get<'g>(&self, key: &str, guard: &'g Guard) -> Option<&'g Pair<V>> {
        self.iter(guard).find(|pair| pair.key() == key)
    }

    /// Returns the first [`Pair`] of the chain.
    #[inline]
    pub fn first_pair<'g>(&self, guard: &'g Guard) -> Option<&'g Pair<V>> {
        self.head.load(Acquire, guard).as_ref()
    }

    /// Returns an iterator over the current chain.
    #[inline]
    pub fn iter<'g>(&self, guard: &'g Guard) -> Iter<'g, V> {
        Iter {
            current: self.first_pair(guard),
            guard,
        }
    }

    /// Empties the [`Bucket`].
    ///
    /// The caller must hold the lock of the owning segment.
    #[inline]
    pub fn clear(&self) {
        drop(self.head.swap((None, Tag::None), Release));
        self.size.store(0, Relaxed);
    }

    /// Returns the number of pairs in the [`Bucket`].
    #[inline]
    pub fn size(&self) -> u64 {
        self.size.load(Relaxed)
    }

    /// Returns `true` if the [`Bucket`] is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl<V: Debug> Bucket<V> {
    /// Renders every [`Pair`] of the chain.
    #[must_use]
    pub fn describe(&self) -> String {
        let guard = Guard::new();
        let mut out = String::from("[");
        for pair in self.iter(&guard) {
            out.push_str(&pair.describe());
            out.push(' ');
        }
        out.push(']');
        out
    }
}

impl<V> Default for Bucket<V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Debug> Debug for Bucket<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = Guard::new();
        f.debug_struct("Bucket")
            .field("size", &self.size())
            .field("chain", &self.iter(&guard).collect::<Vec<_>>())
            .finish()
    }
}

impl<'g, V> Iterator for Iter<'g, V> {
    type Item = &'g Pair<V>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = current.next(self.guard);
        Some(current)
    }
}
