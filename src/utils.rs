//! Utility functions for treeprint
//!
//! Helpers shared by the walker, the archive adapter and the snapshot store:
//!
//! ### File Metadata
//! - Classifying a node without following symbolic links
//! - Reading and writing modification times at nanosecond resolution
//!
//! ### Path Manipulation
//! - Converting absolute paths to root-relative ones
//!
//! ### Reporting
//! - Human-readable byte sizes
//!
//! All functions are thread-safe and can be called concurrently.

use crate::error::{Result, TreeprintError};
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// What a path points to, without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link (never followed)
    Symlink,
    /// Sockets, FIFOs, devices
    Other,
}

/// Node metadata needed by a walk
#[derive(Debug, Clone, Copy)]
pub struct NodeMetadata {
    /// Node type
    pub node_type: NodeType,
    /// Stat size in bytes
    pub size: u64,
    /// Modification time, nanoseconds since the Unix epoch
    pub mtime: i64,
}

/// Read the metadata of `path` without following symbolic links
pub fn node_metadata(path: &Path) -> io::Result<NodeMetadata> {
    let metadata = fs::symlink_metadata(path)?;
    let file_type = metadata.file_type();
    let node_type = if file_type.is_symlink() {
        NodeType::Symlink
    } else if file_type.is_dir() {
        NodeType::Directory
    } else if file_type.is_file() {
        NodeType::File
    } else {
        NodeType::Other
    };

    Ok(NodeMetadata {
        node_type,
        size: metadata.len(),
        mtime: mtime_nanos(&metadata),
    })
}

/// Modification time of `metadata` in nanoseconds since the Unix epoch
pub fn mtime_nanos(metadata: &fs::Metadata) -> i64 {
    let time = FileTime::from_last_modification_time(metadata);
    nanos_from_unix(time.unix_seconds(), time.nanoseconds())
}

/// Combine seconds and sub-second nanoseconds into nanoseconds since the epoch
///
/// Saturates at `i64::MIN`/`i64::MAX` for times outside roughly 1678..2262.
pub fn nanos_from_unix(seconds: i64, nanos: u32) -> i64 {
    seconds
        .saturating_mul(NANOS_PER_SEC)
        .saturating_add(i64::from(nanos))
}

/// Convert nanoseconds since the Unix epoch into a [`FileTime`]
pub fn filetime_from_nanos(nanos: i64) -> FileTime {
    FileTime::from_unix_time(
        nanos.div_euclid(NANOS_PER_SEC),
        nanos.rem_euclid(NANOS_PER_SEC) as u32,
    )
}

/// Set the modification time of `path` without following symbolic links
///
/// The access time is set to the same instant.
pub fn set_mtime_nanos(path: &Path, nanos: i64) -> io::Result<()> {
    let time = filetime_from_nanos(nanos);
    filetime::set_symlink_file_times(path, time, time)
}

/// Make a path relative to a base path
///
/// # Errors
///
/// Returns [`TreeprintError::Internal`] if `path` is not under `base`.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .map_err(|_| {
            TreeprintError::internal(format!("{:?} is not under {:?}", path, base))
        })
}

/// Format bytes as human-readable string
///
/// ```rust,ignore
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
