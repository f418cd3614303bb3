//! Core data types used throughout the treeprint library
//!
//! The model separates *what* an entry contains from *where* it was seen:
//!
//! - [`Content`] is the `(hash, kind, size)` key identifying data.
//! - [`Pointer`] is the `(path, mtime)` pair identifying a location.
//! - [`Tree`] maps each visited [`Pointer`] to its [`Content`].
//! - [`Listing`] is the inverse index, grouping every [`Pointer`] sharing a
//!   [`Content`] so duplicates fall out of the structure directly.
//! - [`Forbidden`] records paths that could not be fully processed.
//!
//! All maps are ordered, so two walks of the same filesystem state compare
//! equal and serialize identically regardless of scheduling.
//!
//! ## Examples
//!
//! ```rust
//! use treeprint::types::{Content, Pointer, Tree};
//!
//! let mut tree = Tree::new();
//! tree.insert(
//!     Pointer::new("/data/a.txt", 1_700_000_000_000_000_000),
//!     Content::file("9e107d9d372bb6826bd81d3542a419d6", 43),
//! );
//! assert_eq!(tree.len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the directory holding treeprint snapshots inside an indexed root
pub const METADATA_DIR_NAME: &str = ".treeprint";

/// Names that are excluded from every walk regardless of caller exclusions
pub const RESERVED_NAMES: &[&str] = &[METADATA_DIR_NAME];

/// Kind of filesystem entry a [`Content`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Regular file, or an archive that could only be hashed as opaque bytes
    #[serde(rename = "FILE")]
    File,
    /// Directory, or an archive expanded as a directory
    #[serde(rename = "DIR")]
    Directory,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::File => write!(f, "FILE"),
            Kind::Directory => write!(f, "DIR"),
        }
    }
}

/// Identifies what a filesystem entry contains, independent of where it lives
///
/// Two entries with equal `Content` are content-identical. For directories
/// this covers every descendant, since a directory hash is derived from the
/// sorted hashes of its children.
///
/// Ordering is `(hash, kind, size)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Content {
    /// Hex digest of the entry; empty when hashing was disabled
    pub hash: String,
    /// File or directory
    pub kind: Kind,
    /// File size, or the sum of children sizes for a directory
    pub size: u64,
}

impl Content {
    /// Create a FILE content entry
    pub fn file(hash: impl Into<String>, size: u64) -> Self {
        Self {
            hash: hash.into(),
            kind: Kind::File,
            size,
        }
    }

    /// Create a DIR content entry
    pub fn directory(hash: impl Into<String>, size: u64) -> Self {
        Self {
            hash: hash.into(),
            kind: Kind::Directory,
            size,
        }
    }

    /// Whether this content describes a file
    pub fn is_file(&self) -> bool {
        self.kind == Kind::File
    }

    /// Whether this content describes a directory
    pub fn is_dir(&self) -> bool {
        self.kind == Kind::Directory
    }
}

/// Identifies where and when an entry was observed
///
/// `mtime` is the last modification time in nanoseconds since the Unix epoch.
/// Archive members carry paths re-rooted beneath the archive's own path, e.g.
/// `/data/backup.zip/inner/file.txt`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pointer {
    /// Absolute path of the entry
    pub path: PathBuf,
    /// Modification time, nanoseconds since the Unix epoch
    pub mtime: i64,
}

impl Pointer {
    /// Create a new pointer
    pub fn new(path: impl Into<PathBuf>, mtime: i64) -> Self {
        Self {
            path: path.into(),
            mtime,
        }
    }
}

/// Mapping Pointer → Content, one entry per visited filesystem node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: BTreeMap<Pointer, Content>,
}

impl Tree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the content previously stored at `pointer`
    pub fn insert(&mut self, pointer: Pointer, content: Content) -> Option<Content> {
        self.entries.insert(pointer, content)
    }

    /// Content stored at `pointer`
    pub fn get(&self, pointer: &Pointer) -> Option<&Content> {
        self.entries.get(pointer)
    }

    /// First entry stored for `path`, whatever its mtime
    pub fn get_by_path(&self, path: &Path) -> Option<(&Pointer, &Content)> {
        let start = Pointer::new(path, i64::MIN);
        self.entries
            .range(start..)
            .next()
            .filter(|(pointer, _)| pointer.path == path)
    }

    /// Whether `pointer` has an entry
    pub fn contains(&self, pointer: &Pointer) -> bool {
        self.entries.contains_key(pointer)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in pointer order
    pub fn iter(&self) -> btree_map::Iter<'_, Pointer, Content> {
        self.entries.iter()
    }

    /// Move every entry of `other` into this tree, overwriting on collision
    pub fn merge(&mut self, other: Tree) {
        self.entries.extend(other.entries);
    }

    /// Total size of all FILE entries
    pub fn file_bytes(&self) -> u64 {
        self.entries
            .values()
            .filter(|content| content.is_file())
            .map(|content| content.size)
            .sum()
    }
}

impl FromIterator<(Pointer, Content)> for Tree {
    fn from_iter<I: IntoIterator<Item = (Pointer, Content)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<(Pointer, Content)> for Tree {
    fn extend<I: IntoIterator<Item = (Pointer, Content)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for Tree {
    type Item = (Pointer, Content);
    type IntoIter = btree_map::IntoIter<Pointer, Content>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tree {
    type Item = (&'a Pointer, &'a Content);
    type IntoIter = btree_map::Iter<'a, Pointer, Content>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Mapping Content → set of Pointer, the inverse of a [`Tree`]
///
/// A content key never maps to an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    entries: BTreeMap<Content, BTreeSet<Pointer>>,
}

impl Listing {
    /// Create an empty listing
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `pointer` to the set stored under `content`
    pub fn insert(&mut self, content: Content, pointer: Pointer) -> bool {
        self.entries.entry(content).or_default().insert(pointer)
    }

    /// Pointers stored under `content`
    pub fn get(&self, content: &Content) -> Option<&BTreeSet<Pointer>> {
        self.entries.get(content)
    }

    /// Whether `content` has at least one pointer
    pub fn contains_key(&self, content: &Content) -> bool {
        self.entries.contains_key(content)
    }

    /// Number of distinct content keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of pointers across all content keys
    pub fn pointer_count(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    /// Whether the listing has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate content keys in order with their pointer sets
    pub fn iter(&self) -> btree_map::Iter<'_, Content, BTreeSet<Pointer>> {
        self.entries.iter()
    }
}

impl FromIterator<(Content, BTreeSet<Pointer>)> for Listing {
    fn from_iter<I: IntoIterator<Item = (Content, BTreeSet<Pointer>)>>(iter: I) -> Self {
        let mut listing = Listing::new();
        for (content, pointers) in iter {
            if pointers.is_empty() {
                continue;
            }
            listing.entries.entry(content).or_default().extend(pointers);
        }
        listing
    }
}

impl IntoIterator for Listing {
    type Item = (Content, BTreeSet<Pointer>);
    type IntoIter = btree_map::IntoIter<Content, BTreeSet<Pointer>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Listing {
    type Item = (&'a Content, &'a BTreeSet<Pointer>);
    type IntoIter = btree_map::Iter<'a, Content, BTreeSet<Pointer>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Classification of a node that could not be fully processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForbiddenKind {
    /// The process lacks permission to read the node
    PermissionDenied,
    /// An archive could not be extracted; it was hashed as an opaque file
    ArchiveReadError,
    /// Anything else: vanished nodes, special files, unexpected I/O errors
    Unknown,
}

impl fmt::Display for ForbiddenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForbiddenKind::PermissionDenied => write!(f, "permission denied"),
            ForbiddenKind::ArchiveReadError => write!(f, "archive read error"),
            ForbiddenKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Why a path ended up in [`Forbidden`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenReason {
    /// Failure classification
    pub kind: ForbiddenKind,
    /// Underlying error message, if any
    pub message: Option<String>,
}

impl ForbiddenReason {
    /// Create a reason with an optional message
    pub fn new(kind: ForbiddenKind, message: Option<String>) -> Self {
        Self { kind, message }
    }

    /// Reason for a node the walker could not classify
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ForbiddenKind::Unknown, Some(message.into()))
    }

    /// Reason for an archive that failed to extract
    pub fn archive_read(message: impl Into<String>) -> Self {
        Self::new(ForbiddenKind::ArchiveReadError, Some(message.into()))
    }

    /// Classify an I/O error raised while accessing a node
    pub fn from_io(err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::PermissionDenied => ForbiddenKind::PermissionDenied,
            _ => ForbiddenKind::Unknown,
        };
        Self::new(kind, Some(err.to_string()))
    }
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Mapping path → failure reason for nodes that could not be fully processed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forbidden {
    entries: BTreeMap<PathBuf, ForbiddenReason>,
}

impl Forbidden {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure, replacing any previous reason for `path`
    pub fn insert(&mut self, path: impl Into<PathBuf>, reason: ForbiddenReason) {
        self.entries.insert(path.into(), reason);
    }

    /// Reason recorded for `path`
    pub fn get(&self, path: &Path) -> Option<&ForbiddenReason> {
        self.entries.get(path)
    }

    /// Whether `path` is recorded
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of recorded paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate recorded paths in order
    pub fn iter(&self) -> btree_map::Iter<'_, PathBuf, ForbiddenReason> {
        self.entries.iter()
    }

    /// Union with `other`; entries of `other` win on collision
    pub fn merge(&mut self, other: Forbidden) {
        self.entries.extend(other.entries);
    }
}

impl FromIterator<(PathBuf, ForbiddenReason)> for Forbidden {
    fn from_iter<I: IntoIterator<Item = (PathBuf, ForbiddenReason)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Forbidden {
    type Item = (PathBuf, ForbiddenReason);
    type IntoIter = btree_map::IntoIter<PathBuf, ForbiddenReason>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Progress callback type
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Files processed so far
    pub processed: usize,
    /// Total files to process (if known)
    pub total: Option<usize>,
    /// Bytes processed so far
    pub bytes_processed: u64,
    /// Total bytes to process (if known)
    pub total_bytes: Option<u64>,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}

/// Walk configuration
///
/// # Examples
///
/// ```rust
/// use treeprint::types::WalkConfig;
///
/// let config = WalkConfig {
///     exclusions: vec!["node_modules".to_string(), ".git".to_string()],
///     ..Default::default()
/// };
/// assert!(config.hash_contents);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalkConfig {
    /// File or directory names skipped wherever they appear
    pub exclusions: Vec<String>,
    /// Number of worker threads hashing sibling subtrees
    pub parallel_workers: usize,
    /// When false, files get an empty placeholder hash
    pub hash_contents: bool,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            exclusions: Vec::new(),
            parallel_workers: num_cpus::get(),
            hash_contents: true,
        }
    }
}

/// Counters collected during a walk
///
/// Purely observational; two walks with different stats may still produce
/// identical trees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkStats {
    /// Files whose bytes were read and hashed
    pub files_hashed: usize,
    /// Files whose content was reused from the cache
    pub cache_hits: usize,
    /// Archives successfully expanded and walked
    pub archives_expanded: usize,
    /// Bytes read by the hasher
    pub bytes_hashed: u64,
}

impl WalkStats {
    /// Accumulate the counters of another subtree
    pub fn merge(&mut self, other: &WalkStats) {
        self.files_hashed += other.files_hashed;
        self.cache_hits += other.cache_hits;
        self.archives_expanded += other.archives_expanded;
        self.bytes_hashed += other.bytes_hashed;
    }
}

/// File count and byte total reported by the size pre-pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measure {
    /// Regular files found
    pub files: usize,
    /// Sum of their sizes
    pub bytes: u64,
}

/// Output of a walk
#[derive(Debug, Clone)]
pub struct WalkResult {
    /// Canonical root that was walked
    pub root: PathBuf,
    /// Every visited node
    pub tree: Tree,
    /// Nodes that could not be fully processed
    pub forbidden: Forbidden,
    /// Counters
    pub stats: WalkStats,
}

impl WalkResult {
    /// Content of the walk root, if it could be computed
    pub fn root_content(&self) -> Option<&Content> {
        self.tree.get_by_path(&self.root).map(|(_, content)| content)
    }
}
