//! Conversions between path-keyed trees and content-keyed listings
//!
//! A [`Tree`] answers "what is at this path?", a [`Listing`] answers "where is
//! this content?". Both hold the same `(Pointer, Content)` pairs, so the two
//! projections are lossless inverses of each other.

use crate::types::{Listing, Tree};

/// Group the pointers of `tree` by content
pub fn tree_to_listing(tree: &Tree) -> Listing {
    let mut listing = Listing::new();
    for (pointer, content) in tree {
        listing.insert(content.clone(), pointer.clone());
    }
    listing
}

/// Flatten every pointer set of `listing` back into tree entries
///
/// If a pointer appears under several contents, the greatest content in
/// listing order wins. Listings built from a tree never contain such pointers.
pub fn listing_to_tree(listing: &Listing) -> Tree {
    listing
        .iter()
        .flat_map(|(content, pointers)| {
            pointers
                .iter()
                .map(move |pointer| (pointer.clone(), content.clone()))
        })
        .collect()
}
