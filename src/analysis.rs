//! Duplicate, missing and unify analyses over listings and trees
//!
//! These are pure functions: they never touch the filesystem and their output
//! depends only on their input.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use treeprint::analysis::{get_duplicate, get_missing};
//! use treeprint::listing::tree_to_listing;
//! use treeprint::utils::format_bytes;
//! use treeprint::walker::walk;
//! use std::path::Path;
//!
//! # fn main() -> treeprint::Result<()> {
//! let photos = tree_to_listing(&walk(Path::new("/photos"))?.tree);
//! let duplicates = get_duplicate(&photos);
//! println!("{} could be reclaimed", format_bytes(duplicates.reclaimable_bytes));
//!
//! let backup = tree_to_listing(&walk(Path::new("/mnt/backup"))?.tree);
//! let missing = get_missing(&photos, &backup);
//! println!("{} files are not backed up", missing.pointer_count());
//! # Ok(())
//! # }
//! ```

use crate::listing::tree_to_listing;
use crate::types::{Content, Forbidden, Listing, Pointer, Tree, WalkResult};
use std::collections::BTreeSet;

/// Contents present at two or more pointers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Duplicates {
    /// Duplicated contents with their pointers, largest size first
    pub entries: Vec<(Content, BTreeSet<Pointer>)>,
    /// Bytes saved by keeping exactly one copy of each duplicated content
    pub reclaimable_bytes: u64,
}

impl Duplicates {
    /// Number of duplicated contents
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is duplicated
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate duplicated contents, largest size first
    pub fn iter(&self) -> impl Iterator<Item = &(Content, BTreeSet<Pointer>)> {
        self.entries.iter()
    }

    /// The duplicated contents as a [`Listing`]
    pub fn to_listing(&self) -> Listing {
        self.entries.iter().cloned().collect()
    }
}

/// Find every content with at least two pointers
///
/// # Returns
///
/// The duplicated contents ordered by descending size (ties keep listing
/// order) and the total `size × (count − 1)` over them.
pub fn get_duplicate(listing: &Listing) -> Duplicates {
    let mut entries: Vec<(Content, BTreeSet<Pointer>)> = listing
        .iter()
        .filter(|(_, pointers)| pointers.len() >= 2)
        .map(|(content, pointers)| (content.clone(), pointers.clone()))
        .collect();
    entries.sort_by(|(a, _), (b, _)| b.size.cmp(&a.size));

    let reclaimable_bytes = entries
        .iter()
        .map(|(content, pointers)| content.size * (pointers.len() as u64 - 1))
        .sum();

    Duplicates {
        entries,
        reclaimable_bytes,
    }
}

/// Files of `old` whose content appears nowhere in `new`
///
/// Only FILE contents are reported; a directory missing from `new` shows up
/// as its missing files. Pointers are those recorded in `old`.
pub fn get_missing(old: &Listing, new: &Listing) -> Listing {
    old.iter()
        .filter(|(content, _)| content.is_file() && !new.contains_key(content))
        .map(|(content, pointers)| (content.clone(), pointers.clone()))
        .collect()
}

/// Merged result of several partial walks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unified {
    /// Merged tree
    pub tree: Tree,
    /// Listing pairs the merged tree agrees with
    pub listing: Listing,
    /// Union of the forbidden maps
    pub forbidden: Forbidden,
}

/// Merge independent walks into one consistent result
///
/// - **Tree**: for a pointer present in several trees, the entry with the
///   largest size wins; the first one seen wins ties. A walk that excluded
///   part of a directory under-reports that directory's size.
/// - **Listing**: a `(content, pointer)` pair from `listings` is kept only if
///   the merged tree maps the pointer to that exact content. When `listings`
///   is empty they are derived from `trees`.
/// - **Forbidden**: union, later maps overwrite earlier ones.
pub fn unify(trees: &[Tree], listings: &[Listing], forbiddens: &[Forbidden]) -> Unified {
    let mut tree = Tree::new();
    for each_tree in trees {
        for (pointer, content) in each_tree {
            let replace = tree
                .get(pointer)
                .map_or(true, |current| current.size < content.size);
            if replace {
                tree.insert(pointer.clone(), content.clone());
            }
        }
    }

    let derived: Vec<Listing>;
    let listings = if listings.is_empty() {
        derived = trees.iter().map(tree_to_listing).collect();
        &derived[..]
    } else {
        listings
    };

    let mut listing = Listing::new();
    for each_listing in listings {
        for (content, pointers) in each_listing {
            for pointer in pointers {
                if tree.get(pointer) == Some(content) {
                    listing.insert(content.clone(), pointer.clone());
                }
            }
        }
    }

    let mut forbidden = Forbidden::new();
    for each_forbidden in forbiddens {
        forbidden.merge(each_forbidden.clone());
    }

    Unified {
        tree,
        listing,
        forbidden,
    }
}

/// [`unify`] over complete walk results
pub fn unify_walks(walks: &[WalkResult]) -> Unified {
    let trees: Vec<Tree> = walks.iter().map(|walk| walk.tree.clone()).collect();
    let forbiddens: Vec<Forbidden> = walks.iter().map(|walk| walk.forbidden.clone()).collect();
    unify(&trees, &[], &forbiddens)
}
