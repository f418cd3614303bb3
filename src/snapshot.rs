//! JSON snapshots of walk results
//!
//! A [`SnapshotStore`] keeps snapshots of one indexed root in a `.treeprint`
//! directory directly under that root. The walker always excludes this
//! directory, so saving a snapshot never changes the next walk's result.
//!
//! ## Layout
//!
//! ```text
//! <root>/.treeprint/
//! ├── 2024_03_01_09_15_42_118204_tree.json
//! ├── 2024_03_01_09_15_42_118204_forbidden.json
//! └── 2024_03_01_09_16_05_402911_listing.json
//! ```
//!
//! File names start with a UTC timestamp tag that sorts chronologically, so
//! the most recent tree is simply the greatest name. Paths inside the files
//! are stored relative to the root with `/` separators, making a store
//! portable when the root is moved or mounted elsewhere.
//!
//! Paths are stored as UTF-8. A component that is not valid UTF-8 is saved
//! with U+FFFD replacement characters and does not load back to the original
//! path, so such files miss the cache after [`SnapshotStore::load_most_recent`]
//! and are hashed again.
//!
//! ## Write Failures
//!
//! Snapshots are written atomically through a temporary file in the store
//! directory. If that fails (read-only media, missing permissions) the same
//! payload is written to a new file in the system temporary directory and
//! that location is returned instead, with a warning.

use crate::error::{Result, TreeprintError};
use crate::types::{
    Content, Forbidden, ForbiddenKind, ForbiddenReason, Kind, Listing, Pointer, Tree, WalkResult,
    METADATA_DIR_NAME,
};
use crate::utils::make_relative;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Snapshot file format version
const FORMAT_VERSION: u32 = 1;

const TREE_SUFFIX: &str = "_tree.json";
const LISTING_SUFFIX: &str = "_listing.json";
const FORBIDDEN_SUFFIX: &str = "_forbidden.json";

/// Envelope shared by every snapshot file
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile<T> {
    version: u32,
    created: DateTime<Utc>,
    entries: Vec<T>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TreeRecord {
    path: String,
    mtime: i64,
    hash: String,
    kind: Kind,
    size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PointerRecord {
    path: String,
    mtime: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ListingRecord {
    hash: String,
    kind: Kind,
    size: u64,
    pointers: Vec<PointerRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ForbiddenRecord {
    path: String,
    kind: ForbiddenKind,
    message: Option<String>,
}

/// Locations written by [`SnapshotStore::save_walk`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedWalk {
    /// Where the tree was written
    pub tree: PathBuf,
    /// Where the forbidden map was written, if it was not empty
    pub forbidden: Option<PathBuf>,
}

/// Snapshot store for one indexed root
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    dir: PathBuf,
}

impl SnapshotStore {
    /// Create a store for `root`
    ///
    /// `root` is canonicalized when possible so it matches the paths of walk
    /// results. Nothing is created on disk until [`init`](Self::init) or the
    /// first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = fs::canonicalize(&root).unwrap_or(root);
        let dir = root.join(METADATA_DIR_NAME);
        Self { root, dir }
    }

    /// Root whose paths are stored relatively
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the snapshot files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the store directory if it does not exist yet
    ///
    /// Creating it ahead of the first walk keeps the root directory's mtime
    /// stable across the walk and the save that follows it.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Save a tree snapshot and return where it was written
    pub fn save_tree(&self, tree: &Tree) -> Result<PathBuf> {
        let entries = tree
            .iter()
            .map(|(pointer, content)| TreeRecord {
                path: self.encode_path(&pointer.path),
                mtime: pointer.mtime,
                hash: content.hash.clone(),
                kind: content.kind,
                size: content.size,
            })
            .collect();
        self.write_snapshot(TREE_SUFFIX, entries)
    }

    /// Save a listing snapshot and return where it was written
    pub fn save_listing(&self, listing: &Listing) -> Result<PathBuf> {
        let entries = listing
            .iter()
            .map(|(content, pointers)| ListingRecord {
                hash: content.hash.clone(),
                kind: content.kind,
                size: content.size,
                pointers: pointers
                    .iter()
                    .map(|pointer| PointerRecord {
                        path: self.encode_path(&pointer.path),
                        mtime: pointer.mtime,
                    })
                    .collect(),
            })
            .collect();
        self.write_snapshot(LISTING_SUFFIX, entries)
    }

    /// Save a forbidden map snapshot and return where it was written
    pub fn save_forbidden(&self, forbidden: &Forbidden) -> Result<PathBuf> {
        let entries = forbidden
            .iter()
            .map(|(path, reason)| ForbiddenRecord {
                path: self.encode_path(path),
                kind: reason.kind,
                message: reason.message.clone(),
            })
            .collect();
        self.write_snapshot(FORBIDDEN_SUFFIX, entries)
    }

    /// Save the tree of a walk, and its forbidden map when not empty
    pub fn save_walk(&self, result: &WalkResult) -> Result<SavedWalk> {
        let tree = self.save_tree(&result.tree)?;
        let forbidden = if result.forbidden.is_empty() {
            None
        } else {
            Some(self.save_forbidden(&result.forbidden)?)
        };
        Ok(SavedWalk { tree, forbidden })
    }

    /// Load a tree snapshot, re-rooting its paths onto this store's root
    pub fn load_tree(&self, location: &Path) -> Result<Tree> {
        let file: SnapshotFile<TreeRecord> = read_snapshot(location)?;
        Ok(file
            .entries
            .into_iter()
            .map(|record| {
                (
                    Pointer::new(self.decode_path(&record.path), record.mtime),
                    Content {
                        hash: record.hash,
                        kind: record.kind,
                        size: record.size,
                    },
                )
            })
            .collect())
    }

    /// Load a listing snapshot, re-rooting its paths onto this store's root
    pub fn load_listing(&self, location: &Path) -> Result<Listing> {
        let file: SnapshotFile<ListingRecord> = read_snapshot(location)?;
        Ok(file
            .entries
            .into_iter()
            .map(|record| {
                let pointers: BTreeSet<Pointer> = record
                    .pointers
                    .iter()
                    .map(|pointer| Pointer::new(self.decode_path(&pointer.path), pointer.mtime))
                    .collect();
                let content = Content {
                    hash: record.hash,
                    kind: record.kind,
                    size: record.size,
                };
                (content, pointers)
            })
            .collect())
    }

    /// Load a forbidden map snapshot
    pub fn load_forbidden(&self, location: &Path) -> Result<Forbidden> {
        let file: SnapshotFile<ForbiddenRecord> = read_snapshot(location)?;
        Ok(file
            .entries
            .into_iter()
            .map(|record| {
                (
                    self.decode_path(&record.path),
                    ForbiddenReason::new(record.kind, record.message),
                )
            })
            .collect())
    }

    /// Tree snapshots in the store, oldest first
    pub fn list_trees(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut trees = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_name().to_string_lossy().ends_with(TREE_SUFFIX) {
                trees.push(entry.path());
            }
        }
        trees.sort();
        Ok(trees)
    }

    /// Most recent tree snapshot, typically used as a walk cache
    ///
    /// Returns `None` when the store holds no tree.
    pub fn load_most_recent(&self) -> Result<Option<Tree>> {
        match self.list_trees()?.pop() {
            Some(location) => {
                debug!("Loading most recent tree {:?}", location);
                self.load_tree(&location).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Root-relative, `/`-separated form of `path`
    ///
    /// The root itself is `.`; paths outside the root stay absolute.
    fn encode_path(&self, path: &Path) -> String {
        match make_relative(path, &self.root) {
            Ok(relative) if relative.as_os_str().is_empty() => ".".to_string(),
            Ok(relative) => relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }

    fn decode_path(&self, encoded: &str) -> PathBuf {
        let path = Path::new(encoded);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        let mut decoded = self.root.clone();
        for part in encoded.split('/') {
            if !part.is_empty() && part != "." {
                decoded.push(part);
            }
        }
        decoded
    }

    fn write_snapshot<T: Serialize>(&self, suffix: &str, entries: Vec<T>) -> Result<PathBuf> {
        let created = Utc::now();
        let file = SnapshotFile {
            version: FORMAT_VERSION,
            created,
            entries,
        };
        let payload = serde_json::to_string_pretty(&file)?;
        let name = format!("{}{}", created.format("%Y_%m_%d_%H_%M_%S_%6f"), suffix);
        let target = self.dir.join(&name);

        match atomic_write(&self.dir, &target, payload.as_bytes()) {
            Ok(()) => {
                info!("Snapshot written to {:?}", target);
                Ok(target)
            }
            Err(e) => {
                warn!("Cannot write snapshot to {:?}: {}; using a temporary file", target, e);
                let fallback = write_fallback(&name, payload.as_bytes()).map_err(|fallback_err| {
                    TreeprintError::snapshot(format!(
                        "{} not written: {} (fallback: {})",
                        name, e, fallback_err
                    ))
                })?;
                info!("Snapshot written to {:?}", fallback);
                Ok(fallback)
            }
        }
    }
}

/// Write `content` to `target` through a temporary file in `dir`
fn atomic_write(dir: &Path, target: &Path, content: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(content)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Write `content` to a new, kept file in the system temporary directory
fn write_fallback(name: &str, content: &[u8]) -> io::Result<PathBuf> {
    let stem = name.trim_end_matches(".json");
    let mut temp_file = tempfile::Builder::new()
        .prefix(&format!("{}_", stem))
        .suffix(".json")
        .tempfile()?;
    temp_file.write_all(content)?;
    let (_, path) = temp_file.keep().map_err(|e| e.error)?;
    Ok(path)
}

fn read_snapshot<T: DeserializeOwned>(location: &Path) -> Result<SnapshotFile<T>> {
    let text = fs::read_to_string(location)?;
    let file: SnapshotFile<T> = serde_json::from_str(&text)?;
    if file.version != FORMAT_VERSION {
        return Err(TreeprintError::snapshot(format!(
            "{:?} has unsupported format version {}",
            location, file.version
        )));
    }
    Ok(file)
}
