//! # treeprint - content fingerprints for directory trees
//!
//! treeprint content-addresses an entire directory subtree, including the
//! contents of zip and tar archives, so that duplicated content and content
//! missing between two trees can be found independent of names or paths.
//!
//! ## Overview
//!
//! A walk produces two maps:
//!
//! - a [`Tree`] from [`Pointer`] (path and mtime) to [`Content`] (hash, kind
//!   and size) for every visited node
//! - a [`Forbidden`] map of nodes that could not be read, with the reason
//!
//! Directory hashes are Merkle hashes over their children, so two directories
//! holding the same files compare equal wherever they live and whatever their
//! files are called. Archives are expanded transparently and their members
//! appear beneath the archive path, e.g. `backup.zip/photos/cat.jpg`.
//!
//! From a tree, the [`listing`] module builds the inverse [`Listing`] index
//! (content to every pointer holding it), which the [`analysis`] module uses
//! to find duplicates, content missing from another tree, and to unify
//! several partial walks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use treeprint::{get_duplicate, tree_to_listing, SnapshotStore, Walker};
//! use std::path::Path;
//!
//! # fn main() -> treeprint::Result<()> {
//! let root = Path::new("./photos");
//! let store = SnapshotStore::new(root);
//!
//! // Reuse hashes from the previous run when there is one
//! let mut walker = Walker::new().with_exclusions(vec![".git".to_string()]);
//! if let Some(previous) = store.load_most_recent()? {
//!     walker = walker.with_cache(&previous);
//! }
//!
//! let result = walker.walk(root)?;
//! store.save_walk(&result)?;
//!
//! let duplicates = get_duplicate(&tree_to_listing(&result.tree));
//! println!(
//!     "{} duplicated contents, {} reclaimable",
//!     duplicates.len(),
//!     treeprint::utils::format_bytes(duplicates.reclaimable_bytes)
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Failures at individual nodes never abort a walk; they are collected in
//! [`Forbidden`]. Only an invalid walk root, thread pool start-up failures
//! and snapshot I/O surface as [`TreeprintError`].
//!
//! ## Logging
//!
//! All components log through [`tracing`]. Install any subscriber to see walk
//! summaries at `info`, per-archive details at `debug` and per-file events at
//! `trace`. Every forbidden node is reported at `warn`.
//!
//! ## Feature Flags
//!
//! - `gxhash`: use gxhash for in-memory hash maps (needs AES and SSE2 or the
//!   ARM equivalents)

// Public API modules
pub mod analysis;
pub mod archive;
pub mod cache;
pub mod error;
pub mod hasher;
pub mod listing;
pub mod merkle;
pub mod progress;
pub mod snapshot;
pub mod types;
pub mod utils;
pub mod walker;

// Internal modules (not part of public API)
mod collections;

// Re-export main types for convenience
pub use analysis::{get_duplicate, get_missing, unify, unify_walks, Duplicates, Unified};
pub use archive::ArchiveFormat;
pub use cache::Cache;
pub use error::{Result, TreeprintError};
pub use listing::{listing_to_tree, tree_to_listing};
pub use snapshot::{SavedWalk, SnapshotStore};
pub use types::*;
pub use walker::{walk, Walker};
