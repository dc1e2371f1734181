//! Leaf nodes: keys with their locator lists.

// Locator counts are bounded by the number of tuples a table can address
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use std::cmp::Ordering;

use crate::storage::btree::node::{NodeError, PageReader, PageWriter};
use crate::types::{Key, KeySchema, Locator, compare_prefix};

/// A key and every locator inserted under it, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafEntry {
    pub key: Key,
    pub locators: Vec<Locator>,
}

/// A leaf node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafNode {
    /// Entries in sorted order by key, one per distinct key.
    pub entries: Vec<LeafEntry>,
}

impl LeafNode {
    #[must_use]
    pub const fn new(entries: Vec<LeafEntry>) -> Self {
        Self { entries }
    }

    fn position(&self, key: &Key) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.cmp(key))
    }

    /// Locators stored under exactly `key`.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&[Locator]> {
        self.position(key)
            .ok()
            .map(|i| self.entries[i].locators.as_slice())
    }

    /// Add a locator under `key`, appending to an existing entry.
    pub fn insert(&mut self, key: Key, locator: Locator) {
        match self.position(&key) {
            Ok(i) => self.entries[i].locators.push(locator),
            Err(i) => self.entries.insert(
                i,
                LeafEntry {
                    key,
                    locators: vec![locator],
                },
            ),
        }
    }

    /// Remove `key` and return its locators.
    pub fn remove(&mut self, key: &Key) -> Option<Vec<Locator>> {
        self.position(key)
            .ok()
            .map(|i| self.entries.remove(i).locators)
    }

    /// Index of the first entry whose key starts with `prefix` or sorts
    /// after it.
    #[must_use]
    pub fn prefix_start(&self, prefix: &Key) -> usize {
        self.entries
            .partition_point(|e| compare_prefix(prefix, &e.key) == Ordering::Greater)
    }

    #[must_use]
    pub fn first_key(&self) -> Option<&Key> {
        self.entries.first().map(|e| &e.key)
    }

    /// Split an overflowed leaf, returning the promoted key and the new right
    /// leaf. `self` keeps the first `order` entries and the promoted key is a
    /// copy of the right leaf's first key.
    #[must_use]
    pub fn split(&mut self, order: usize) -> (Key, Self) {
        let right = Self::new(self.entries.split_off(order));
        let Some(promoted) = right.first_key().cloned() else {
            unreachable!("leaf split of a node with {} entries", self.entries.len());
        };
        (promoted, right)
    }

    pub(super) fn encode(&self, schema: &KeySchema) -> Vec<u8> {
        let mut writer = PageWriter::new(schema);
        let mut record = Vec::new();
        for entry in &self.entries {
            record.clear();
            record.extend_from_slice(&(entry.locators.len() as i32).to_be_bytes());
            entry.key.encode_into(&mut record);
            writer.push_record(&record);
            for locator in &entry.locators {
                let mut pair = [0u8; Locator::SIZE];
                pair[..4].copy_from_slice(&locator.page_id.to_be_bytes());
                pair[4..].copy_from_slice(&locator.slot_id.to_be_bytes());
                writer.push_record(&pair);
            }
        }
        writer.finish()
    }

    pub(super) fn decode(reader: &mut PageReader<'_>) -> Result<Self, NodeError> {
        let mut entries = Vec::new();
        while reader.next_record()? {
            let count = reader.read_i32()?;
            if count <= 0 {
                return Err(NodeError::InvalidLocatorCount(count));
            }
            let key = reader.read_key()?;
            let mut locators = Vec::new();
            for _ in 0..count {
                if !reader.next_record()? {
                    return Err(NodeError::TruncatedLocators);
                }
                let page_id = reader.read_i32()?;
                let slot_id = reader.read_i32()?;
                locators.push(Locator::new(page_id, slot_id));
            }
            entries.push(LeafEntry { key, locators });
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PAGE_SIZE;
    use crate::key;
    use crate::storage::btree::node::{Node, NodeKind};
    use crate::types::KeyType;

    fn schema() -> KeySchema {
        KeySchema::new(vec![KeyType::Text, KeyType::Float64]).expect("schema")
    }

    #[test]
    fn test_insert_appends_duplicate_locators() {
        let mut leaf = LeafNode::default();
        leaf.insert(key!["b", 1.0], Locator::new(1, 1));
        leaf.insert(key!["a", 1.0], Locator::new(2, 2));
        leaf.insert(key!["b", 1.0], Locator::new(3, 3));
        leaf.insert(key!["b", 1.0], Locator::new(1, 1));

        assert_eq!(leaf.entries.len(), 2);
        assert_eq!(leaf.first_key(), Some(&key!["a", 1.0]));
        assert_eq!(
            leaf.get(&key!["b", 1.0]),
            Some(&[Locator::new(1, 1), Locator::new(3, 3), Locator::new(1, 1)][..])
        );
    }

    #[test]
    fn test_remove() {
        let mut leaf = LeafNode::default();
        leaf.insert(key!["a", 1.0], Locator::new(1, 1));
        assert_eq!(leaf.remove(&key!["a", 1.0]), Some(vec![Locator::new(1, 1)]));
        assert_eq!(leaf.remove(&key!["a", 1.0]), None);
        assert!(leaf.entries.is_empty());
    }

    #[test]
    fn test_prefix_start() {
        let mut leaf = LeafNode::default();
        for (s, f) in [("a", 1.0), ("b", 0.5), ("b", 2.0), ("c", 0.0)] {
            leaf.insert(key![s, f], Locator::default());
        }
        assert_eq!(leaf.prefix_start(&key!["b"]), 1);
        assert_eq!(leaf.prefix_start(&key!["bb"]), 3);
        assert_eq!(leaf.prefix_start(&key!["d"]), 4);
    }

    #[test]
    fn test_split_copies_first_right_key_up() {
        let mut leaf = LeafNode::default();
        for i in 0..5 {
            leaf.insert(key!["k", f64::from(i)], Locator::new(i, i));
        }
        let (promoted, right) = leaf.split(2);
        assert_eq!(promoted, key!["k", 2.0]);
        assert_eq!(leaf.entries.len(), 2);
        assert_eq!(right.entries.len(), 3);
        assert_eq!(right.first_key(), Some(&promoted));
    }

    #[test]
    fn test_zero_locator_is_representable() {
        let mut leaf = LeafNode::default();
        leaf.insert(key!["", 0.0], Locator::new(0, 0));
        let bytes = Node::Leaf(leaf.clone()).encode(&schema());
        let decoded = Node::decode(&bytes, NodeKind::Leaf, &schema()).expect("decode");
        assert_eq!(decoded, Node::Leaf(leaf));
    }

    #[test]
    fn test_locators_continue_on_next_page() {
        let mut leaf = LeafNode::default();
        for i in 0..1000 {
            leaf.insert(key!["hot", 1.5], Locator::new(i, -i));
        }
        leaf.insert(key!["warm", -0.5], Locator::new(7, 7));
        let bytes = Node::Leaf(leaf.clone()).encode(&schema());
        assert_eq!(bytes.len() % PAGE_SIZE, 0);
        assert!(bytes.len() > PAGE_SIZE);

        let decoded = Node::decode(&bytes, NodeKind::Leaf, &schema()).expect("decode");
        assert_eq!(decoded, Node::Leaf(leaf));
    }

    #[test]
    fn test_non_positive_locator_count_rejected() {
        let mut leaf = LeafNode::default();
        leaf.insert(key!["a", 1.0], Locator::new(1, 1));
        let mut bytes = Node::Leaf(leaf).encode(&schema());
        // header 12 + record count 4: the entry's locator count.
        bytes[16..20].copy_from_slice(&0_i32.to_be_bytes());
        assert_eq!(
            Node::decode(&bytes, NodeKind::Leaf, &schema()),
            Err(NodeError::InvalidLocatorCount(0))
        );
    }
}
