//! Helpers shared by unit tests.

// Test keys and locators stay far inside i32 range.
#![allow(clippy::cast_possible_truncation)]

use std::path::Path;

use crate::config::TreeConfig;
use crate::key;
use crate::storage::btree::BPlusTree;
use crate::types::{Key, Locator};

/// Open the tree under `dir` with the given order.
pub fn open_tree(dir: &Path, order: usize) -> BPlusTree {
    let config = TreeConfig::with_order(order).expect("valid order");
    BPlusTree::open(dir, &config).expect("open tree")
}

/// Single-attribute integer key.
pub fn int_key(i: i64) -> Key {
    key![i]
}

/// Two-attribute key of a text tag and an integer.
pub fn pair_key(tag: &str, i: i64) -> Key {
    key![tag, i]
}

/// A locator derived from `i`.
pub const fn loc(i: i64) -> Locator {
    Locator::new(i as i32, (i as i32).wrapping_mul(7))
}
