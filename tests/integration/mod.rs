//! Integration tests for treeprint
//!
//! End-to-end scenarios over real directory trees: duplicate and missing
//! detection, archive transparency across every supported format, cache
//! equivalence and unification of partial walks.

use ::treeprint::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;
use walkdir::WalkDir;

/// Temporary directory with helpers for building fixture trees
pub struct TreeHarness {
    pub temp_dir: TempDir,
}

impl TreeHarness {
    /// Create an empty harness
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    /// Harness root, canonicalized like walk results
    pub fn root(&self) -> PathBuf {
        fs::canonicalize(self.temp_dir.path()).unwrap()
    }

    /// Write `data` at `relative`, creating parent directories
    pub fn write(&self, relative: &str, data: &[u8]) -> PathBuf {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, data).unwrap();
        path
    }

    /// Create an empty directory at `relative`
    pub fn mkdir(&self, relative: &str) -> PathBuf {
        let path = self.root().join(relative);
        fs::create_dir_all(&path).unwrap();
        path
    }

    /// Pin every mtime below `relative` (inclusive) to `seconds`
    pub fn pin_mtimes(&self, relative: &str, seconds: i64) {
        let time = filetime::FileTime::from_unix_time(seconds, 0);
        for entry in WalkDir::new(self.root().join(relative)).contents_first(true) {
            let entry = entry.unwrap();
            filetime::set_file_times(entry.path(), time, time).unwrap();
        }
    }
}

/// Members of `dir` as archive names with `/` separators, parents first
fn members(dir: &Path) -> Vec<(String, PathBuf, bool)> {
    WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let name = entry
                .path()
                .strip_prefix(dir)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            (name, entry.path().to_path_buf(), entry.file_type().is_dir())
        })
        .collect()
}

/// Zip the contents of `dir` (not `dir` itself) into `archive`
pub fn zip_dir(dir: &Path, archive: &Path) {
    let mut zip = zip::ZipWriter::new(File::create(archive).unwrap());
    let options = zip::write::FileOptions::default();
    for (name, path, is_dir) in members(dir) {
        if is_dir {
            zip.add_directory(name, options).unwrap();
        } else {
            zip.start_file(name, options).unwrap();
            zip.write_all(&fs::read(path).unwrap()).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// Tar the contents of `dir` into `writer`
pub fn tar_dir<W: Write>(dir: &Path, writer: W) -> W {
    let mut builder = tar::Builder::new(writer);
    for (name, path, is_dir) in members(dir) {
        if is_dir {
            builder.append_dir(&name, &path).unwrap();
        } else {
            builder.append_path_with_name(&path, &name).unwrap();
        }
    }
    builder.into_inner().unwrap()
}

/// Archive the contents of `dir` into `archive` in the given format
pub fn archive_dir(dir: &Path, archive: &Path, format: ArchiveFormat) {
    if format == ArchiveFormat::Zip {
        return zip_dir(dir, archive);
    }
    let file = File::create(archive).unwrap();
    match format {
        ArchiveFormat::TarGz => {
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            tar_dir(dir, encoder).finish().unwrap();
        }
        ArchiveFormat::TarBz2 => {
            let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
            tar_dir(dir, encoder).finish().unwrap();
        }
        ArchiveFormat::TarXz => {
            let encoder = xz2::write::XzEncoder::new(file, 6);
            tar_dir(dir, encoder).finish().unwrap();
        }
        ArchiveFormat::Tar | ArchiveFormat::Zip => {
            tar_dir(dir, file).sync_all().unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_folder_duplicates() {
        let harness = TreeHarness::new();
        let same = vec![b'd'; 100];
        harness.write("Folder3/a.txt", &same);
        harness.write("Folder3/b.txt", &same);
        harness.write("Folder3/c.txt", &[b'c'; 50]);

        let result = walk(&harness.root().join("Folder3")).unwrap();
        let duplicates = get_duplicate(&tree_to_listing(&result.tree));

        assert_eq!(duplicates.len(), 1);
        let (content, pointers) = &duplicates.entries[0];
        assert_eq!(content.size, 100);
        assert_eq!(content.kind, Kind::File);
        let names: Vec<_> = pointers
            .iter()
            .map(|p| p.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(duplicates.reclaimable_bytes, 100);
    }

    #[test]
    fn test_missing_between_trees() {
        let harness = TreeHarness::new();
        harness.write("old/x", b"x content");
        harness.write("old/y", b"y content");
        harness.write("new/x", b"x content");

        let old = tree_to_listing(&walk(&harness.root().join("old")).unwrap().tree);
        let new = tree_to_listing(&walk(&harness.root().join("new")).unwrap().tree);
        let missing = get_missing(&old, &new);

        assert_eq!(missing.len(), 1);
        let (content, pointers) = missing.iter().next().unwrap();
        assert_eq!(content.size, 9);
        assert_eq!(pointers.iter().next().unwrap().path, harness.root().join("old/y"));
    }

    #[test]
    fn test_archive_transparency_all_formats() {
        let harness = TreeHarness::new();
        harness.write("D/readme.md", b"# readme");
        harness.write("D/src/main.rs", b"fn main() {}");
        harness.write("D/src/lib.rs", b"pub fn lib() {}");
        harness.write("D/empty.txt", b"");
        harness.mkdir("D/nothing");

        let plain = walk(&harness.root().join("D")).unwrap();
        let expected = plain.root_content().unwrap().clone();

        let formats = [
            (ArchiveFormat::Zip, "D.zip"),
            (ArchiveFormat::Tar, "D.tar"),
            (ArchiveFormat::TarGz, "D.tar.gz"),
            (ArchiveFormat::TarBz2, "D.tar.bz2"),
            (ArchiveFormat::TarXz, "D.tar.xz"),
        ];
        for (format, name) in formats {
            let archive = harness.root().join(name);
            archive_dir(&harness.root().join("D"), &archive, format);

            let packed = walk(&archive).unwrap();
            info!("{:?}: {} entries", format, packed.tree.len());
            assert!(packed.forbidden.is_empty(), "{:?}: {:?}", format, packed.forbidden);
            assert_eq!(packed.root_content(), Some(&expected), "{:?}", format);
            assert_eq!(packed.tree.len(), plain.tree.len(), "{:?}", format);
            assert_eq!(packed.stats.archives_expanded, 1);
        }
    }

    #[test]
    fn test_archive_members_rerooted() {
        let harness = TreeHarness::new();
        harness.write("src/inner/file.txt", b"inside");
        harness.mkdir("scan");
        zip_dir(&harness.root().join("src"), &harness.root().join("scan/pack.zip"));

        let result = walk(&harness.root().join("scan")).unwrap();
        let member = harness.root().join("scan/pack.zip/inner/file.txt");
        let (_, content) = result.tree.get_by_path(&member).unwrap();
        assert_eq!(content.size, 6);

        let (_, archive) = result
            .tree
            .get_by_path(&harness.root().join("scan/pack.zip"))
            .unwrap();
        assert_eq!(archive.kind, Kind::Directory);
        assert!(result
            .tree
            .iter()
            .all(|(pointer, _)| pointer.path.starts_with(harness.root().join("scan"))));
    }

    #[test]
    fn test_nested_archives() {
        let harness = TreeHarness::new();
        harness.write("inner_src/deep.txt", b"deep");
        harness.mkdir("outer_src");
        archive_dir(
            &harness.root().join("inner_src"),
            &harness.root().join("outer_src/inner.tar.gz"),
            ArchiveFormat::TarGz,
        );
        harness.mkdir("scan");
        zip_dir(&harness.root().join("outer_src"), &harness.root().join("scan/outer.zip"));

        let result = walk(&harness.root().join("scan")).unwrap();
        let deep = harness.root().join("scan/outer.zip/inner.tar.gz/deep.txt");
        assert!(result.tree.get_by_path(&deep).is_some());
        assert_eq!(result.stats.archives_expanded, 2);
        assert_eq!(result.root_content().unwrap().size, 4);
    }

    #[test]
    fn test_cache_equivalence() {
        let harness = TreeHarness::new();
        harness.write("a/one.txt", b"1");
        harness.write("a/two.txt", b"22");
        harness.write("b/three.txt", b"333");
        harness.mkdir("pack_src");
        harness.write("pack_src/member.txt", b"member");
        zip_dir(&harness.root().join("pack_src"), &harness.root().join("b/pack.zip"));

        let fresh = walk(&harness.root()).unwrap();
        let cached = Walker::new().with_cache(&fresh.tree).walk(&harness.root()).unwrap();

        assert_eq!(cached.tree, fresh.tree);
        assert_eq!(cached.forbidden, fresh.forbidden);
        // archive members hit too, thanks to restored mtimes
        assert_eq!(cached.stats.files_hashed, 0);
        assert_eq!(cached.stats.cache_hits, fresh.stats.files_hashed);
    }

    #[test]
    fn test_cache_misses_changed_file() {
        let harness = TreeHarness::new();
        let file = harness.write("f.txt", b"before");
        harness.pin_mtimes("f.txt", 1_600_000_000);

        let first = walk(&harness.root()).unwrap();
        fs::write(&file, b"after!").unwrap();
        harness.pin_mtimes("f.txt", 1_600_000_100);

        let second = Walker::new().with_cache(&first.tree).walk(&harness.root()).unwrap();
        assert_eq!(second.stats.cache_hits, 0);
        let (_, content) = second.tree.get_by_path(&file).unwrap();
        assert_eq!(content.hash, hasher::hash_bytes(b"after!"));
    }

    #[test]
    fn test_unify_partial_walks() {
        let harness = TreeHarness::new();
        harness.write("top.txt", b"top");
        harness.write("media/big.bin", &[7u8; 64]);

        let full = walk(&harness.root()).unwrap();
        let without_media = Walker::new()
            .with_exclusions(vec!["media".to_string()])
            .walk(&harness.root())
            .unwrap();
        let media_only = walk(&harness.root().join("media")).unwrap();

        let unified = unify_walks(&[without_media.clone(), media_only.clone()]);
        assert_eq!(unified.tree.len(), full.tree.len());
        assert_eq!(unified.listing.pointer_count(), unified.tree.len());
        for (pointer, content) in &unified.tree {
            assert!(unified.listing.get(content).unwrap().contains(pointer));
        }

        // a later full walk replaces the under-reported root
        let unified = unify_walks(&[without_media, media_only, full.clone()]);
        let (_, root) = unified.tree.get_by_path(&harness.root()).unwrap();
        assert_eq!(root.size, 67);
        assert_eq!(unified.tree, full.tree);
        assert_eq!(unified.listing, tree_to_listing(&full.tree));
    }

    #[test]
    fn test_unify_prefers_largest() {
        let harness = TreeHarness::new();
        harness.write("a.txt", b"aaaa");
        harness.write("b/c.txt", b"cc");

        let partial = Walker::new()
            .with_exclusions(vec!["b".to_string()])
            .walk(&harness.root())
            .unwrap();
        let full = walk(&harness.root()).unwrap();

        let unified = unify_walks(&[partial.clone(), full.clone()]);
        assert_eq!(unified.tree, full.tree);
        assert_eq!(unified.listing, tree_to_listing(&full.tree));
        assert!(!unified
            .listing
            .contains_key(partial.root_content().unwrap()));
    }

    #[test]
    #[traced_test]
    fn test_walk_logs_summary() {
        let harness = TreeHarness::new();
        harness.write("x.txt", b"x");

        walk(&harness.root()).unwrap();
        assert!(logs_contain("Walked"));
    }
}
