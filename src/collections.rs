//! Hash collections used on the hot path of a walk
//!
//! With the `gxhash` feature the maps use gxhash's hasher, which needs AES-NI
//! and SSE2 (or the ARM equivalents). Without it they fall back to the
//! standard library's SipHash. Construct them through [`new_map`] and
//! [`new_set`] so call sites do not depend on the chosen hasher.

#[cfg(feature = "gxhash")]
type BuildHasher = gxhash::GxBuildHasher;

#[cfg(not(feature = "gxhash"))]
type BuildHasher = std::collections::hash_map::RandomState;

/// HashMap keyed with the feature-selected hasher
pub type HashMap<K, V> = std::collections::HashMap<K, V, BuildHasher>;

/// HashSet keyed with the feature-selected hasher
pub type HashSet<T> = std::collections::HashSet<T, BuildHasher>;

/// Create an empty map with room for `capacity` entries
pub fn new_map<K, V>(capacity: usize) -> HashMap<K, V> {
    HashMap::with_capacity_and_hasher(capacity, BuildHasher::default())
}

/// Create an empty set with room for `capacity` entries
pub fn new_set<T>(capacity: usize) -> HashSet<T> {
    HashSet::with_capacity_and_hasher(capacity, BuildHasher::default())
}
