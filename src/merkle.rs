//! Merkle hashing of directories
//!
//! A directory's hash is the digest of its children's content hashes, sorted
//! lexicographically and joined with `\n`. Sorting makes the result a pure
//! function of the multiset of children, so enumeration order never leaks into
//! the hash:
//!
//! ```text
//!            dir = md5("h(a)\nh(b)\nh(sub)")
//!           /      |        \
//!        h(a)    h(b)     h(sub) = md5("h(c)")
//!                             |
//!                            h(c)
//! ```
//!
//! Names are not part of the hash. Two directories holding the same bytes
//! under different file names are content-identical.

use crate::hasher::hash_bytes;

/// Compute the hash of a directory from its children's hashes
///
/// # Arguments
///
/// * `child_hashes` - Content hashes of the aggregated children, in any order
///
/// # Returns
///
/// Hex digest of the sorted, newline-joined hashes. An empty directory hashes
/// the empty string.
pub fn directory_hash<I, S>(child_hashes: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hashes: Vec<S> = child_hashes.into_iter().collect();
    hashes.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));

    let joined = hashes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join("\n");
    hash_bytes(joined.as_bytes())
}
