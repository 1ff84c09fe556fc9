//! [`Pair`] is a single key-value node of a bucket chain.

use std::fmt::{self, Debug, Display};
use std::sync::atomic::Ordering::{Acquire, Release};

use sdd::{AtomicShared, Guard, Shared, Tag};

use crate::error::{Error, Result};
use crate::hash::hash;

/// [`Pair`] holds one entry and a link to the next [`Pair`] of the chain.
///
/// The key and its hash never change. The element and the link are atomically replaceable so
/// that a reader traversing a chain always observes fully constructed values, and anything a
/// reader can reach stays alive until the reader drops its [`Guard`].
pub struct Pair<V> {
    key: String,
    hash: u64,
    element: AtomicShared<V>,
    next: AtomicShared<Pair<V>>,
}

impl<V: 'static> Pair<V> {
    /// Creates a new [`Pair`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `element` is `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use segmap::{hash, Error, Pair};
    ///
    /// let pair = Pair::new("key".to_string(), Some(1)).unwrap();
    /// assert_eq!(pair.hash(), hash("key"));
    ///
    /// assert!(matches!(Pair::<i32>::new("key".to_string(), None), Err(Error::InvalidInput(_))));
    /// ```
    #[inline]
    pub fn new(key: String, element: Option<V>) -> Result<Self> {
        let element = element.ok_or_else(|| Error::invalid_input("element is absent"))?;
        Ok(Self::with_shared(key, Shared::new(element)))
    }

    /// Replaces the element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `element` is `None`; the current element is kept.
    #[inline]
    pub fn set_element(&self, element: Option<V>) -> Result<()> {
        let element = element.ok_or_else(|| Error::invalid_input("element is absent"))?;
        self.set_element_shared(Shared::new(element));
        Ok(())
    }
}

impl<V> Pair<V> {
    /// Creates a new [`Pair`] sharing an already allocated element.
    pub(crate) fn with_shared(key: String, element: Shared<V>) -> Self {
        let hash = hash(&key);
        Self {
            key,
            hash,
            element: AtomicShared::from(element),
            next: AtomicShared::null(),
        }
    }

    /// Returns the key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the precomputed hash of the key.
    #[inline]
    #[must_use]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// Returns a reference to the element that stays valid while `guard` is alive.
    #[inline]
    pub fn element<'g>(&self, guard: &'g Guard) -> &'g V {
        let Some(element) = self.element.load(Acquire, guard).as_ref() else {
            unreachable!("a pair is never constructed without an element");
        };
        element
    }

    /// Returns a strong reference to the element.
    #[inline]
    pub fn element_shared(&self, guard: &Guard) -> Shared<V> {
        let Some(element) = self.element.get_shared(Acquire, guard) else {
            unreachable!("a pair is never constructed without an element");
        };
        element
    }

    /// Replaces the element with an already allocated one.
    ///
    /// The previous element is reclaimed once no reader can observe it.
    #[inline]
    pub fn set_element_shared(&self, element: Shared<V>) {
        drop(self.element.swap((Some(element), Tag::None), Release));
    }

    /// Returns the next [`Pair`] in the chain.
    #[inline]
    pub fn next<'g>(&self, guard: &'g Guard) -> Option<&'g Pair<V>> {
        self.next.load(Acquire, guard).as_ref()
    }

    /// Returns a strong reference to the next [`Pair`] in the chain.
    #[inline]
    pub fn next_shared(&self, guard: &Guard) -> Option<Shared<Pair<V>>> {
        self.next.get_shared(Acquire, guard)
    }

    /// Links `next` after `self`, replacing the previous link.
    #[inline]
    pub fn set_next(&self, next: Option<Shared<Pair<V>>>) {
        drop(self.next.swap((next, Tag::None), Release));
    }

    /// Copies the [`Pair`] without its link.
    ///
    /// The copy shares the element with `self`; replacing the element of either one afterwards
    /// does not affect the other.
    #[inline]
    #[must_use]
    pub fn copy(&self, guard: &Guard) -> Self {
        Self {
            key: self.key.clone(),
            hash: self.hash,
            element: AtomicShared::from(self.element_shared(guard)),
            next: AtomicShared::null(),
        }
    }
}

impl<V: Debug> Pair<V> {
    /// Renders the [`Pair`] without its successors.
    #[must_use]
    pub fn describe(&self) -> String {
        self.to_string()
    }

    /// Renders the [`Pair`] and every [`Pair`] reachable from it.
    #[must_use]
    pub fn describe_chain(&self) -> String {
        let guard = Guard::new();
        let mut out = String::new();
        let mut depth = 0_usize;
        let mut current = Some(self);
        while let Some(pair) = current {
            if depth != 0 {
                out.push_str(", next:");
            }
            out.push_str(&format!(
                "pair{{key:{}, hash:{}, element:{:?}",
                pair.key,
                pair.hash,
                pair.element(&guard)
            ));
            depth += 1;
            current = pair.next(&guard);
        }
        out.push_str(", next:nil");
        out.extend(std::iter::repeat('}').take(depth));
        out
    }
}

impl<V: Debug> Debug for Pair<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = Guard::new();
        f.debug_struct("Pair")
            .field("key", &self.key)
            .field("hash", &self.hash)
            .field("element", self.element(&guard))
            .finish_non_exhaustive()
    }
}

impl<V: Debug> Display for Pair<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = Guard::new();
        write!(
            f,
            "pair{{key:{}, hash:{}, element:{:?}}}",
            self.key,
            self.hash,
            self.element(&guard)
        )
    }
}
