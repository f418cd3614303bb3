//! Read-only hash cache built from a previous walk
//!
//! A walk consults the cache before reading a regular file. The cached content
//! is reused only when the entry's kind, size and mtime (nanoseconds) all match
//! exactly; anything else falls through to the hasher.
//!
//! Directories and archives are never answered from the cache. A directory's
//! aggregated size is only known after its children are resolved, and an
//! archive must be expanded again so its members and failure state are
//! reproduced. Both still benefit, because their files hit the cache.

use crate::collections::{new_map, HashMap};
use crate::types::{Content, Kind, Pointer, Tree};
use std::path::Path;

/// Index of a previous [`Tree`] keyed by pointer
#[derive(Debug, Clone)]
pub struct Cache {
    entries: HashMap<Pointer, Content>,
}

impl Default for Cache {
    fn default() -> Self {
        Self { entries: new_map(0) }
    }
}

impl Cache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every entry of `tree`
    pub fn from_tree(tree: &Tree) -> Self {
        let mut entries = new_map(tree.len());
        for (pointer, content) in tree {
            entries.insert(pointer.clone(), content.clone());
        }
        Self { entries }
    }

    /// Cached content for a node observed with the given attributes
    ///
    /// Returns `None` unless an entry exists at `(path, mtime)` with the same
    /// kind and size.
    pub fn lookup(&self, path: &Path, kind: Kind, size: u64, mtime: i64) -> Option<&Content> {
        let pointer = Pointer::new(path, mtime);
        self.entries
            .get(&pointer)
            .filter(|content| content.kind == kind && content.size == size)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&Tree> for Cache {
    fn from(tree: &Tree) -> Self {
        Cache::from_tree(tree)
    }
}
