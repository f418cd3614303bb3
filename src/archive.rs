//! Archive adapter: makes archive contents walkable as directories
//!
//! A regular file whose name ends in a known suffix is treated as a container.
//! Its members are extracted into a private temporary directory, their
//! modification times are restored from the archive's own metadata, and the
//! walker descends into that directory as if it were an ordinary one. Paths
//! produced inside are re-rooted beneath the archive path by the walker.
//!
//! ## Supported Formats
//!
//! | Format | Suffixes |
//! |--------|----------|
//! | zip    | `.zip` |
//! | tar    | `.tar` |
//! | gzip   | `.tar.gz`, `.tgz` |
//! | bzip2  | `.tar.bz2`, `.tbz2`, `.tbz` |
//! | xz     | `.tar.xz`, `.txz` |
//!
//! ## Modification Times
//!
//! Every extracted member gets the timestamp recorded in the archive. Members
//! without one (implicit parent directories, the extraction root itself) get
//! the archive file's own mtime. Zip timestamps carry no time zone and are read
//! as UTC. Restoring times makes repeated walks of an unchanged archive yield
//! identical pointers, which is what lets the cache hit inside archives.
//!
//! ## Special Members
//!
//! Character devices, block devices and FIFOs stored in a tar archive are
//! not created on disk. Their member paths are reported through
//! [`ExtractedArchive::special_members`] so the walker can record them the
//! same way it records such nodes outside an archive.
//!
//! ## Cleanup
//!
//! The extraction directory is owned by [`ExtractedArchive`] and removed when
//! it is dropped, whether the walk of its contents succeeded or not. Each
//! archive node gets its own directory; nothing is shared between concurrent
//! extractions.

use crate::collections::{new_map, HashMap};
use crate::utils::{nanos_from_unix, set_mtime_nanos};
use chrono::{NaiveDate, TimeZone, Utc};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::EntryType;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Errors raised while extracting an archive
///
/// These never abort a walk. The walker records them in the forbidden map
/// and hashes the archive as an opaque file instead.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// I/O failure reading the archive or writing its members
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The zip container is malformed or uses an unsupported feature
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A member path would escape the extraction directory
    #[error("unsafe member path: {0:?}")]
    UnsafeEntry(PathBuf),
}

/// Archive container formats recognized by suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// PKZIP archive
    Zip,
    /// Uncompressed tarball
    Tar,
    /// gzip-compressed tarball
    TarGz,
    /// bzip2-compressed tarball
    TarBz2,
    /// xz-compressed tarball
    TarXz,
}

impl ArchiveFormat {
    /// All formats, in detection order
    pub const ALL: [ArchiveFormat; 5] = [
        ArchiveFormat::Zip,
        ArchiveFormat::TarGz,
        ArchiveFormat::TarBz2,
        ArchiveFormat::TarXz,
        ArchiveFormat::Tar,
    ];

    /// File name suffixes identifying this format (lowercase)
    pub fn suffixes(&self) -> &'static [&'static str] {
        match self {
            ArchiveFormat::Zip => &[".zip"],
            ArchiveFormat::Tar => &[".tar"],
            ArchiveFormat::TarGz => &[".tar.gz", ".tgz"],
            ArchiveFormat::TarBz2 => &[".tar.bz2", ".tbz2", ".tbz"],
            ArchiveFormat::TarXz => &[".tar.xz", ".txz"],
        }
    }

    /// Detect the format from the file name of `path`
    ///
    /// Matching is case-insensitive. Returns `None` for names without a known
    /// suffix; whether the path is actually a regular file is up to the caller.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        Self::ALL.into_iter().find(|format| {
            format
                .suffixes()
                .iter()
                .any(|suffix| name.len() > suffix.len() && name.ends_with(suffix))
        })
    }
}

/// An archive extracted into a temporary directory
///
/// The directory and everything in it is removed on drop.
#[derive(Debug)]
pub struct ExtractedArchive {
    dir: TempDir,
    members: usize,
    special: Vec<PathBuf>,
}

impl ExtractedArchive {
    /// Root of the extracted contents
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Number of members written
    pub fn members(&self) -> usize {
        self.members
    }

    /// Relative paths of device and FIFO members that were not extracted
    pub fn special_members(&self) -> &[PathBuf] {
        &self.special
    }

    /// Remove the extraction directory, reporting any failure
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// Extract `archive` into a fresh temporary directory
///
/// # Arguments
///
/// * `archive` - Path of the archive file
/// * `format` - Container format, usually from [`ArchiveFormat::detect`]
/// * `fallback_mtime` - Nanosecond mtime for members without one, normally the
///   archive's own mtime
///
/// # Errors
///
/// Any failure reading the container or writing a member. The partially
/// extracted directory is removed before returning.
pub fn extract(
    archive: &Path,
    format: ArchiveFormat,
    fallback_mtime: i64,
) -> Result<ExtractedArchive, ArchiveError> {
    let dir = tempfile::Builder::new().prefix(".treeprint-").tempdir()?;
    let reader = BufReader::new(File::open(archive)?);

    let unpacked = match format {
        ArchiveFormat::Zip => unpack_zip(reader, dir.path())?,
        ArchiveFormat::Tar => unpack_tar(reader, dir.path())?,
        ArchiveFormat::TarGz => unpack_tar(flate2::read::GzDecoder::new(reader), dir.path())?,
        ArchiveFormat::TarBz2 => unpack_tar(bzip2::read::BzDecoder::new(reader), dir.path())?,
        ArchiveFormat::TarXz => unpack_tar(xz2::read::XzDecoder::new(reader), dir.path())?,
    };

    let members = unpacked.mtimes.len();
    restore_mtimes(dir.path(), &unpacked.mtimes, fallback_mtime)?;
    debug!("Extracted {} members of {:?} ({:?})", members, archive, format);

    Ok(ExtractedArchive {
        dir,
        members,
        special: unpacked.special,
    })
}

/// What an unpack pass wrote
#[derive(Default)]
struct Unpacked {
    /// Recorded mtime (nanoseconds) per relative member path
    mtimes: HashMap<PathBuf, i64>,
    /// Members left out because they are devices or FIFOs
    special: Vec<PathBuf>,
}

/// Keep only normal components, rejecting anything that climbs out
fn sanitize(member: &Path) -> Result<PathBuf, ArchiveError> {
    let mut clean = PathBuf::new();
    for component in member.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(ArchiveError::UnsafeEntry(member.to_path_buf())),
        }
    }
    Ok(clean)
}

fn unpack_zip<R: Read + io::Seek>(
    reader: R,
    dest: &Path,
) -> Result<Unpacked, ArchiveError> {
    let mut zip = zip::ZipArchive::new(reader)?;
    let mut mtimes = new_map(zip.len());

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative = match entry.enclosed_name() {
            Some(name) => sanitize(name)?,
            None => return Err(ArchiveError::UnsafeEntry(PathBuf::from(entry.name()))),
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
        }
        trace!("Unpacked zip member {:?}", relative);

        if let Some(mtime) = zip_mtime(&entry.last_modified()) {
            mtimes.insert(relative, mtime);
        }
    }

    Ok(Unpacked {
        mtimes,
        special: Vec::new(),
    })
}

/// Zip timestamps are local wall-clock values with no zone; read them as UTC
fn zip_mtime(stamp: &zip::DateTime) -> Option<i64> {
    let naive = NaiveDate::from_ymd_opt(
        i32::from(stamp.year()),
        u32::from(stamp.month()),
        u32::from(stamp.day()),
    )?
    .and_hms_opt(
        u32::from(stamp.hour()),
        u32::from(stamp.minute()),
        u32::from(stamp.second()),
    )?;
    Some(nanos_from_unix(Utc.from_utc_datetime(&naive).timestamp(), 0))
}

fn unpack_tar<R: Read>(reader: R, dest: &Path) -> Result<Unpacked, ArchiveError> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(false);
    let mut unpacked = Unpacked {
        mtimes: new_map(64),
        special: Vec::new(),
    };

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = sanitize(&entry.path()?)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let entry_type = entry.header().entry_type();
        if matches!(
            entry_type,
            EntryType::Char | EntryType::Block | EntryType::Fifo
        ) {
            trace!("Skipping special tar member {:?}", relative);
            unpacked.special.push(relative);
            continue;
        }
        let mtime = entry.header().mtime().ok();

        if !entry.unpack_in(dest)? {
            return Err(ArchiveError::UnsafeEntry(relative));
        }
        trace!("Unpacked tar member {:?}", relative);

        if let Some(seconds) = mtime {
            let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
            unpacked.mtimes.insert(relative, nanos_from_unix(seconds, 0));
        }
    }

    Ok(unpacked)
}

/// Apply recorded member mtimes, and `fallback` to everything else
///
/// Runs after every member is written, since creating children bumps the
/// mtime of their parent directory.
fn restore_mtimes(
    root: &Path,
    recorded: &HashMap<PathBuf, i64>,
    fallback: i64,
) -> Result<(), ArchiveError> {
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.path_is_symlink() {
            continue;
        }
        let mtime = entry
            .path()
            .strip_prefix(root)
            .ok()
            .and_then(|relative| recorded.get(relative).copied())
            .unwrap_or(fallback);
        set_mtime_nanos(entry.path(), mtime)?;
    }
    Ok(())
}
