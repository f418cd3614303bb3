//! Tree walker: post-order content addressing of a directory subtree
//!
//! The walker visits every node below a root and produces a [`Tree`] of
//! `Pointer → Content` entries plus a [`Forbidden`] map of nodes it could not
//! process. Children are resolved before their parent, so a directory's
//! content is computed from the finished content of its children (see
//! [`crate::merkle`]).
//!
//! ## Node Handling
//!
//! - **Directories**: children are visited, excluded names and symbolic links
//!   are skipped. The directory hash covers every child that produced content
//!   and is not itself forbidden; its size is the sum of those children.
//! - **Archives**: expanded through [`crate::archive`] and walked as a
//!   directory located at the archive path. If extraction fails the archive is
//!   recorded as forbidden and hashed as an opaque file.
//! - **Regular files**: answered from the cache when kind, size and mtime all
//!   match and the cached hash is real; otherwise streamed through the hasher.
//! - **Anything else** (sockets, devices, FIFOs): recorded as forbidden.
//!
//! No error below the root aborts a walk. An error at a node is recorded under
//! that node's path and the walk continues with its siblings.
//!
//! ## Parallelism
//!
//! Sibling subtrees are visited concurrently on a dedicated rayon pool. Every
//! visit returns its own partial tree and forbidden map, which the parent
//! merges after all children finish. Nothing is shared between workers except
//! the read-only cache and the progress counters, so the output does not
//! depend on scheduling.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use treeprint::walker::Walker;
//! use std::path::Path;
//!
//! # fn main() -> treeprint::Result<()> {
//! let first = Walker::new()
//!     .with_exclusions(vec!["node_modules".to_string()])
//!     .with_parallel_workers(4)
//!     .walk(Path::new("./photos"))?;
//!
//! // Re-walk, reusing hashes of unchanged files
//! let second = Walker::new()
//!     .with_exclusions(vec!["node_modules".to_string()])
//!     .with_cache(&first.tree)
//!     .walk(Path::new("./photos"))?;
//! assert_eq!(first.tree, second.tree);
//! # Ok(())
//! # }
//! ```

use crate::archive::{self, ArchiveFormat};
use crate::cache::Cache;
use crate::collections::{new_set, HashSet};
use crate::error::{Result, TreeprintError};
use crate::hasher::{hash_file, PLACEHOLDER_HASH};
use crate::merkle::directory_hash;
use crate::types::{
    Content, Forbidden, ForbiddenReason, Kind, Measure, Pointer, ProgressCallback, ProgressInfo,
    Tree, WalkConfig, WalkResult, WalkStats, RESERVED_NAMES,
};
use crate::utils::{node_metadata, NodeMetadata, NodeType};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Stack size for walk workers; recursion depth follows directory depth
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Walks a directory subtree and computes its content fingerprints
///
/// # Example
///
/// ```rust,ignore
/// use treeprint::walker::Walker;
///
/// let walker = Walker::new()
///     .with_exclusions(vec![".git".to_string()])
///     .with_hashing(true)
///     .with_parallel_workers(8);
/// let result = walker.walk(Path::new("/data"))?;
/// println!("{} nodes, {} forbidden", result.tree.len(), result.forbidden.len());
/// ```
#[derive(Clone)]
pub struct Walker {
    /// Names skipped wherever they appear, as given by the caller
    exclusions: Vec<String>,
    /// Number of worker threads
    parallel_workers: usize,
    /// Whether file bytes are hashed
    hash_contents: bool,
    /// Previous results consulted before hashing
    cache: Option<Arc<Cache>>,
    /// Observational progress sink
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for Walker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Walker")
            .field("exclusions", &self.exclusions)
            .field("parallel_workers", &self.parallel_workers)
            .field("hash_contents", &self.hash_contents)
            .field("cache_entries", &self.cache.as_ref().map(|cache| cache.len()))
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Default for Walker {
    fn default() -> Self {
        Self::from_config(WalkConfig::default())
    }
}

impl Walker {
    /// Create a walker with default settings
    ///
    /// No caller exclusions, content hashing enabled, one worker per CPU core,
    /// no cache and no progress reporting.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a walker from a [`WalkConfig`]
    pub fn from_config(config: WalkConfig) -> Self {
        Self {
            exclusions: config.exclusions,
            parallel_workers: config.parallel_workers.max(1),
            hash_contents: config.hash_contents,
            cache: None,
            progress: None,
        }
    }

    /// Current settings as a [`WalkConfig`]
    pub fn config(&self) -> WalkConfig {
        WalkConfig {
            exclusions: self.exclusions.clone(),
            parallel_workers: self.parallel_workers,
            hash_contents: self.hash_contents,
        }
    }

    /// Set file and directory names to skip
    ///
    /// Names are matched against the final path component only. Reserved
    /// names are always excluded in addition to these.
    pub fn with_exclusions(mut self, exclusions: Vec<String>) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Set number of parallel workers (minimum 1)
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    /// Enable or disable content hashing
    ///
    /// With hashing disabled files get the placeholder hash, which makes a
    /// walk a fast size-only pass. Cache hits still return real hashes.
    pub fn with_hashing(mut self, enabled: bool) -> Self {
        self.hash_contents = enabled;
        self
    }

    /// Reuse content from a previous walk's tree
    pub fn with_cache(mut self, previous: &Tree) -> Self {
        self.cache = Some(Arc::new(Cache::from_tree(previous)));
        self
    }

    /// Report progress to `callback` after every file
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Caller exclusions merged with the reserved names
    ///
    /// The caller's list is left untouched.
    pub fn effective_exclusions(&self) -> BTreeSet<String> {
        self.exclusions
            .iter()
            .cloned()
            .chain(RESERVED_NAMES.iter().map(|name| name.to_string()))
            .collect()
    }

    /// Walk the subtree at `root`
    ///
    /// # Returns
    ///
    /// The tree of every visited node, the forbidden map and walk counters.
    /// The result's `root` is the canonical form of `root`, and every pointer
    /// path starts with it.
    ///
    /// # Errors
    ///
    /// - [`TreeprintError::InvalidRoot`] if `root` does not exist or is neither
    ///   a directory nor a regular file
    /// - [`TreeprintError::InvalidConfiguration`] if an exclusion is not a
    ///   plain file name
    /// - [`TreeprintError::ThreadPool`] if worker threads cannot be started
    pub fn walk(&self, root: &Path) -> Result<WalkResult> {
        self.validate_exclusions()?;
        let root = validate_root(root)?;
        let start = Instant::now();

        let total = match self.progress {
            Some(_) => Some(self.measure(&root)?),
            None => None,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers)
            .stack_size(WORKER_STACK_SIZE)
            .thread_name(|index| format!("treeprint-walk-{}", index))
            .build()?;

        info!(
            "Walking {:?} with {} workers (hashing: {}, cache entries: {})",
            root,
            self.parallel_workers,
            self.hash_contents,
            self.cache.as_ref().map_or(0, |cache| cache.len())
        );

        let context = WalkContext {
            exclusions: self.exclusion_set(),
            hash_contents: self.hash_contents,
            cache: self.cache.as_deref(),
            progress: ProgressTracker::new(self.progress.clone(), total),
        };
        let subtree = pool.install(|| context.visit(&root, &root));

        info!(
            "Walked {:?}: {} nodes, {} forbidden, {} hashed, {} cache hits in {:?}",
            root,
            subtree.tree.len(),
            subtree.forbidden.len(),
            subtree.stats.files_hashed,
            subtree.stats.cache_hits,
            start.elapsed()
        );

        Ok(WalkResult {
            root,
            tree: subtree.tree,
            forbidden: subtree.forbidden,
            stats: subtree.stats,
        })
    }

    /// Count regular files and their bytes below `root`
    ///
    /// Applies the same exclusions as [`walk`](Self::walk) and skips symbolic
    /// links, but does not look inside archives. Unreadable entries are
    /// skipped silently. Used to size progress reporting.
    ///
    /// # Errors
    ///
    /// Same as [`walk`](Self::walk), except for thread pool failures.
    pub fn measure(&self, root: &Path) -> Result<Measure> {
        self.validate_exclusions()?;
        let root = validate_root(root)?;
        let exclusions = self.exclusion_set();
        let mut measure = Measure::default();

        let entries = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !exclusions.contains(entry.file_name()))
            .filter_map(|entry| entry.ok());

        for entry in entries {
            if entry.file_type().is_file() {
                if let Ok(metadata) = entry.metadata() {
                    measure.files += 1;
                    measure.bytes += metadata.len();
                }
            }
        }

        debug!("Measured {:?}: {} files, {} bytes", root, measure.files, measure.bytes);
        Ok(measure)
    }

    /// Exclusions match a single path component, so separators never match
    fn validate_exclusions(&self) -> Result<()> {
        for name in &self.exclusions {
            let special = name.is_empty() || name == "." || name == "..";
            if special || name.chars().any(std::path::is_separator) {
                return Err(TreeprintError::InvalidConfiguration(format!(
                    "exclusion {:?} is not a file name",
                    name
                )));
            }
        }
        Ok(())
    }

    fn exclusion_set(&self) -> HashSet<OsString> {
        let mut set = new_set(self.exclusions.len() + RESERVED_NAMES.len());
        set.extend(self.effective_exclusions().into_iter().map(OsString::from));
        set
    }
}

/// Walk `root` with default settings
pub fn walk(root: &Path) -> Result<WalkResult> {
    Walker::new().walk(root)
}

/// Canonicalize `root` and check that it is a directory or regular file
fn validate_root(root: &Path) -> Result<PathBuf> {
    let canonical =
        fs::canonicalize(root).map_err(|_| TreeprintError::InvalidRoot(root.to_path_buf()))?;
    let metadata =
        fs::metadata(&canonical).map_err(|_| TreeprintError::InvalidRoot(root.to_path_buf()))?;
    if metadata.is_dir() || metadata.is_file() {
        Ok(canonical)
    } else {
        Err(TreeprintError::InvalidRoot(root.to_path_buf()))
    }
}

/// Result of visiting one node: its own entry plus everything below it
#[derive(Debug, Default)]
struct Subtree {
    entry: Option<(Pointer, Content)>,
    tree: Tree,
    forbidden: Forbidden,
    stats: WalkStats,
}

impl Subtree {
    fn leaf(pointer: Pointer, content: Content, stats: WalkStats) -> Self {
        let mut tree = Tree::new();
        tree.insert(pointer.clone(), content.clone());
        Self {
            entry: Some((pointer, content)),
            tree,
            forbidden: Forbidden::new(),
            stats,
        }
    }

    fn forbidden(path: &Path, reason: ForbiddenReason) -> Self {
        warn!("Forbidden {:?}: {}", path, reason);
        let mut forbidden = Forbidden::new();
        forbidden.insert(path, reason);
        Self {
            forbidden,
            ..Self::default()
        }
    }

    /// Whether this node contributes to its parent directory's content
    fn aggregate(&self) -> Option<&Content> {
        self.entry
            .as_ref()
            .filter(|(pointer, _)| !self.forbidden.contains(&pointer.path))
            .map(|(_, content)| content)
    }

    fn absorb(&mut self, child: Subtree) {
        self.tree.merge(child.tree);
        self.forbidden.merge(child.forbidden);
        self.stats.merge(&child.stats);
    }
}

/// Per-walk state shared read-only by every worker
struct WalkContext<'a> {
    exclusions: HashSet<OsString>,
    hash_contents: bool,
    cache: Option<&'a Cache>,
    progress: ProgressTracker,
}

impl WalkContext<'_> {
    /// Visit the node physically at `physical`, recorded under `logical`
    ///
    /// The two differ only inside extracted archives, where `physical` lives
    /// in a temporary directory and `logical` is beneath the archive path.
    fn visit(&self, physical: &Path, logical: &Path) -> Subtree {
        let metadata = match node_metadata(physical) {
            Ok(metadata) => metadata,
            Err(e) => return Subtree::forbidden(logical, ForbiddenReason::from_io(&e)),
        };

        match metadata.node_type {
            NodeType::Directory => self.visit_directory(physical, logical, &metadata),
            NodeType::File => match ArchiveFormat::detect(logical) {
                Some(format) => self.visit_archive(physical, logical, &metadata, format),
                None => self.visit_file(physical, logical, &metadata, true),
            },
            NodeType::Symlink => Subtree::default(),
            NodeType::Other => {
                Subtree::forbidden(logical, ForbiddenReason::unknown("unsupported file type"))
            }
        }
    }

    fn visit_directory(&self, physical: &Path, logical: &Path, metadata: &NodeMetadata) -> Subtree {
        let children = match self.list_children(physical) {
            Ok(children) => children,
            Err(e) => return Subtree::forbidden(logical, ForbiddenReason::from_io(&e)),
        };
        trace!("Visiting {:?} ({} children)", logical, children.len());

        let results: Vec<Subtree> = children
            .par_iter()
            .map(|name| self.visit(&physical.join(name), &logical.join(name)))
            .collect();

        let mut subtree = Subtree::default();
        let mut child_hashes = Vec::with_capacity(results.len());
        let mut size = 0u64;
        for child in results {
            if let Some(content) = child.aggregate() {
                child_hashes.push(content.hash.clone());
                size += content.size;
            }
            subtree.absorb(child);
        }

        let pointer = Pointer::new(logical, metadata.mtime);
        let content = Content::directory(directory_hash(&child_hashes), size);
        subtree.tree.insert(pointer.clone(), content.clone());
        subtree.entry = Some((pointer, content));
        subtree
    }

    /// Names of children to visit: not excluded, not symbolic links
    fn list_children(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if self.is_excluded(&name) {
                continue;
            }
            // A failed file_type() is reported when the child is visited
            if entry.file_type().map(|t| t.is_symlink()).unwrap_or(false) {
                continue;
            }
            children.push(name);
        }
        Ok(children)
    }

    fn is_excluded(&self, name: &OsStr) -> bool {
        self.exclusions.contains(name)
    }

    fn visit_archive(
        &self,
        physical: &Path,
        logical: &Path,
        metadata: &NodeMetadata,
        format: ArchiveFormat,
    ) -> Subtree {
        match archive::extract(physical, format, metadata.mtime) {
            Ok(extracted) => {
                debug!(
                    "Expanding {:?} ({} members) from {:?}",
                    logical,
                    extracted.members(),
                    extracted.path()
                );
                let mut subtree = self.visit(extracted.path(), logical);
                subtree.stats.archives_expanded += 1;
                for member in extracted.special_members() {
                    if member.iter().any(|part| self.is_excluded(part)) {
                        continue;
                    }
                    let path = logical.join(member);
                    let reason = ForbiddenReason::unknown("unsupported file type");
                    warn!("Forbidden {:?}: {}", path, reason);
                    subtree.forbidden.insert(path, reason);
                }
                if let Err(e) = extracted.close() {
                    warn!("Failed to remove extraction directory for {:?}: {}", logical, e);
                }
                subtree
            }
            Err(e) => {
                let reason = ForbiddenReason::archive_read(e.to_string());
                warn!("Forbidden {:?}: {}; hashing as a plain file", logical, reason);
                let mut subtree = self.visit_file(physical, logical, metadata, false);
                subtree.forbidden.insert(logical, reason);
                subtree
            }
        }
    }

    fn visit_file(
        &self,
        physical: &Path,
        logical: &Path,
        metadata: &NodeMetadata,
        use_cache: bool,
    ) -> Subtree {
        let pointer = Pointer::new(logical, metadata.mtime);
        let mut stats = WalkStats::default();

        let cached = self
            .cache
            .filter(|_| use_cache)
            .and_then(|cache| cache.lookup(logical, Kind::File, metadata.size, metadata.mtime))
            // a size-only walk's placeholder is not a hash
            .filter(|content| !(self.hash_contents && content.hash == PLACEHOLDER_HASH));

        let content = if let Some(content) = cached {
            trace!("Cache hit for {:?}", logical);
            stats.cache_hits = 1;
            content.clone()
        } else if !self.hash_contents {
            Content::file(PLACEHOLDER_HASH, metadata.size)
        } else {
            match hash_file(physical) {
                Ok((digest, bytes_read)) => {
                    trace!("Hashed {:?} ({} bytes)", logical, bytes_read);
                    stats.files_hashed = 1;
                    stats.bytes_hashed = bytes_read;
                    Content::file(digest, metadata.size)
                }
                Err(e) => return Subtree::forbidden(logical, ForbiddenReason::from_io(&e)),
            }
        };

        self.progress.advance(logical, metadata.size);
        Subtree::leaf(pointer, content, stats)
    }
}

/// Lock-free counters feeding the progress callback
struct ProgressTracker {
    callback: Option<ProgressCallback>,
    total: Option<Measure>,
    files: AtomicUsize,
    bytes: AtomicU64,
}

impl ProgressTracker {
    fn new(callback: Option<ProgressCallback>, total: Option<Measure>) -> Self {
        Self {
            callback,
            total,
            files: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    fn advance(&self, path: &Path, size: u64) {
        let Some(callback) = &self.callback else {
            return;
        };
        let processed = self.files.fetch_add(1, Ordering::Relaxed) + 1;
        let bytes_processed = self.bytes.fetch_add(size, Ordering::Relaxed) + size;
        callback(ProgressInfo {
            operation: "Indexing".to_string(),
            current_item: Some(path.to_string_lossy().into_owned()),
            processed,
            total: self.total.map(|total| total.files),
            bytes_processed,
            total_bytes: self.total.map(|total| total.bytes),
        });
    }
}
