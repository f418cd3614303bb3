//! Property-based testing for treeprint
//!
//! Uses proptest to check the algebraic laws of the model (projection
//! round-trips, duplicate accounting, missing idempotence, Merkle order
//! independence) and the determinism of real walks over generated trees.

use ::treeprint::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Generate content keys from a small hash alphabet so duplicates are common
fn content_strategy() -> impl Strategy<Value = Content> {
    (
        "[a-f]{1,2}",
        prop_oneof![Just(Kind::File), Just(Kind::Directory)],
        0u64..10_000,
    )
        .prop_map(|(hash, kind, size)| Content { hash, kind, size })
}

/// Generate pointers under a fixed absolute root
fn pointer_strategy() -> impl Strategy<Value = Pointer> {
    (
        prop::collection::vec("[a-z]{1,6}", 1..4),
        -1_000_000_000i64..2_000_000_000_000_000_000,
    )
        .prop_map(|(parts, mtime)| {
            let mut path = PathBuf::from("/root");
            for part in parts {
                path.push(part);
            }
            Pointer::new(path, mtime)
        })
}

fn tree_strategy() -> impl Strategy<Value = Tree> {
    prop::collection::btree_map(pointer_strategy(), content_strategy(), 0..40)
        .prop_map(|entries| entries.into_iter().collect())
}

/// Generate relative file paths and contents for an on-disk tree
fn files_strategy() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(
        prop::collection::vec("[a-d]{1,3}", 1..4).prop_map(|parts| parts.join("/")),
        prop::collection::vec(any::<u8>(), 0..256),
        1..12,
    )
}

/// Write `files`, skipping paths that collide with an existing file or directory
///
/// Returns the entries actually written.
fn materialize(root: &Path, files: &BTreeMap<String, Vec<u8>>) -> Vec<(String, Vec<u8>)> {
    let mut written = Vec::new();
    for (relative, data) in files {
        let path = root.join(relative);
        let parent_ok = path
            .parent()
            .map(|parent| fs::create_dir_all(parent).is_ok())
            .unwrap_or(false);
        if parent_ok && !path.exists() && fs::write(&path, data).is_ok() {
            written.push((relative.clone(), data.clone()));
        }
    }
    written
}

proptest! {
    #[test]
    fn prop_tree_listing_round_trip(tree in tree_strategy()) {
        let listing = tree_to_listing(&tree);
        prop_assert_eq!(listing_to_tree(&listing), tree.clone());
        prop_assert_eq!(listing.pointer_count(), tree.len());
        prop_assert_eq!(tree_to_listing(&listing_to_tree(&listing)), listing);
    }

    #[test]
    fn prop_missing_from_itself_is_empty(tree in tree_strategy()) {
        let listing = tree_to_listing(&tree);
        prop_assert!(get_missing(&listing, &listing).is_empty());
    }

    #[test]
    fn prop_missing_are_absent_files(old in tree_strategy(), new in tree_strategy()) {
        let old_listing = tree_to_listing(&old);
        let new_listing = tree_to_listing(&new);
        let missing = get_missing(&old_listing, &new_listing);
        for (content, pointers) in &missing {
            prop_assert!(content.is_file());
            prop_assert!(!new_listing.contains_key(content));
            prop_assert_eq!(old_listing.get(content), Some(pointers));
        }
    }

    #[test]
    fn prop_duplicate_accounting(tree in tree_strategy()) {
        let listing = tree_to_listing(&tree);
        let duplicates = get_duplicate(&listing);

        let expected: u64 = listing
            .iter()
            .filter(|(_, pointers)| pointers.len() >= 2)
            .map(|(content, pointers)| content.size * (pointers.len() as u64 - 1))
            .sum();
        prop_assert_eq!(duplicates.reclaimable_bytes, expected);
        prop_assert_eq!(
            duplicates.len(),
            listing.iter().filter(|(_, pointers)| pointers.len() >= 2).count()
        );
        prop_assert!(duplicates.iter().all(|(_, pointers)| pointers.len() >= 2));
        prop_assert!(duplicates
            .entries
            .windows(2)
            .all(|pair| pair[0].0.size >= pair[1].0.size));
    }

    #[test]
    fn prop_merkle_order_independent(
        hashes in prop::collection::vec("[0-9a-f]{32}", 0..20)
            .prop_flat_map(|hashes| (Just(hashes.clone()), Just(hashes).prop_shuffle()))
    ) {
        let (original, shuffled) = hashes;
        prop_assert_eq!(
            merkle::directory_hash(&original),
            merkle::directory_hash(&shuffled)
        );
    }

    #[test]
    fn prop_unify_of_one_is_identity(tree in tree_strategy()) {
        let unified = unify(&[tree.clone()], &[], &[]);
        prop_assert_eq!(unified.listing, tree_to_listing(&tree));
        prop_assert_eq!(unified.tree, tree);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_walk_deterministic_and_sized(files in files_strategy()) {
        let temp_dir = TempDir::new().unwrap();
        let total: u64 = materialize(temp_dir.path(), &files)
            .iter()
            .map(|(_, data)| data.len() as u64)
            .sum();

        let single = Walker::new().with_parallel_workers(1).walk(temp_dir.path()).unwrap();
        let parallel = Walker::new().with_parallel_workers(4).walk(temp_dir.path()).unwrap();
        let cached = Walker::new().with_cache(&single.tree).walk(temp_dir.path()).unwrap();

        prop_assert_eq!(&single.tree, &parallel.tree);
        prop_assert_eq!(&single.tree, &cached.tree);
        prop_assert_eq!(single.root_content().unwrap().size, total);
        prop_assert_eq!(single.tree.file_bytes(), total);
        prop_assert!(single.forbidden.is_empty());
    }

    #[test]
    fn prop_same_files_same_root_hash(files in files_strategy()) {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let written = materialize(first.path(), &files);
        // reverse creation order on disk
        for (relative, data) in written.iter().rev() {
            let path = second.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, data).unwrap();
        }

        let a = walk(first.path()).unwrap();
        let b = walk(second.path()).unwrap();
        prop_assert_eq!(a.root_content(), b.root_content());
    }
}
