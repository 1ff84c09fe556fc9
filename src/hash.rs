//! String hashing and segment routing.

/// Multiplier of the polynomial string hash.
const SEED: u64 = 13131;

/// 2^64 divided by the golden ratio, used to spread a hash across segments.
const FIBONACCI_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

/// Hashes a key.
///
/// The value is a running polynomial over the UTF-8 bytes of the key with the top bit cleared,
/// so it is deterministic across processes and never exceeds `i64::MAX`.
///
/// # Examples
///
/// ```
/// use segmap::hash;
///
/// assert_eq!(hash(""), 0);
/// assert_eq!(hash("a"), 97);
/// assert_eq!(hash("ab"), 97 * 13131 + 98);
/// assert_eq!(hash("key"), hash("key"));
/// ```
#[inline]
#[must_use]
pub fn hash(key: &str) -> u64 {
    key.bytes()
        .fold(0_u64, |h, b| h.wrapping_mul(SEED).wrapping_add(u64::from(b)))
        & 0x7FFF_FFFF_FFFF_FFFF
}

/// Calculates the segment index for the hash value.
///
/// Bucket routing inside a segment uses `hash % bucket_count`, which depends on the low bits of
/// the hash. The segment index is taken from the upper half of a multiplicative scramble instead
/// so that both choices stay independent of each other.
#[allow(clippy::cast_possible_truncation)] // Intended truncation.
#[inline]
pub(crate) const fn segment_index(hash: u64, concurrency: usize) -> usize {
    if concurrency <= 1 {
        return 0;
    }
    let scrambled = (hash.wrapping_mul(FIBONACCI_MULTIPLIER) >> 32) as usize;
    scrambled % concurrency
}
