//! Index nodes: separator keys over positionally addressed children.

use std::cmp::Ordering;

use crate::storage::btree::node::{NodeError, PageReader, PageWriter};
use crate::types::{Key, KeySchema, compare_prefix};

/// An index node.
///
/// Stores N separator keys and addresses N+1 children as the subdirectories
/// `0..=N` of its own directory.
/// `Child[i]` contains keys < `Key[i]`
/// `Child[i+1]` contains keys >= `Key[i]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexNode {
    /// Keys in sorted order.
    pub keys: Vec<Key>,
}

impl IndexNode {
    #[must_use]
    pub const fn new(keys: Vec<Key>) -> Self {
        Self { keys }
    }

    /// Number of children this node addresses.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn child_count(&self) -> usize {
        self.keys.len() + 1
    }

    /// Find the child index for a full key.
    #[must_use]
    pub fn child_index(&self, key: &Key) -> usize {
        // A key equal to a separator lives to its right.
        self.keys.partition_point(|k| k <= key)
    }

    /// Find the leftmost child that can hold a key starting with `prefix`.
    #[must_use]
    pub fn prefix_child_index(&self, prefix: &Key) -> usize {
        self.keys
            .partition_point(|k| compare_prefix(prefix, k) == Ordering::Greater)
    }

    /// Split an overflowed node, returning the promoted key and the new
    /// right node. The promoted key leaves both halves; `self` keeps the
    /// first `order` keys.
    #[must_use]
    pub fn split(&mut self, order: usize) -> (Key, Self) {
        let right = self.keys.split_off(order + 1);
        let Some(promoted) = self.keys.pop() else {
            unreachable!("index split of a node with {} keys", self.keys.len());
        };
        (promoted, Self::new(right))
    }

    pub(super) fn encode(&self, schema: &KeySchema) -> Vec<u8> {
        let mut writer = PageWriter::new(schema);
        let mut record = Vec::new();
        for key in &self.keys {
            record.clear();
            key.encode_into(&mut record);
            writer.push_record(&record);
        }
        writer.finish()
    }

    pub(super) fn decode(reader: &mut PageReader<'_>) -> Result<Self, NodeError> {
        let mut keys = Vec::new();
        while reader.next_record()? {
            keys.push(reader.read_key()?);
        }
        Ok(Self { keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PAGE_SIZE;
    use crate::key;
    use crate::storage::btree::node::{Node, NodeKind};
    use crate::types::KeyType;

    fn node() -> IndexNode {
        IndexNode::new(vec![key![10_i64], key![20_i64], key![30_i64]])
    }

    #[test]
    fn test_child_index() {
        let n = node();
        assert_eq!(n.child_count(), 4);
        assert_eq!(n.child_index(&key![5_i64]), 0);
        assert_eq!(n.child_index(&key![10_i64]), 1);
        assert_eq!(n.child_index(&key![15_i64]), 1);
        assert_eq!(n.child_index(&key![30_i64]), 3);
        assert_eq!(n.child_index(&key![99_i64]), 3);
    }

    #[test]
    fn test_prefix_child_index_is_lower_bound() {
        let n = IndexNode::new(vec![key!["a", 5_i64], key!["b", 1_i64], key!["b", 9_i64]]);
        // Keys ("a", x > 5) may sit in child 1.
        assert_eq!(n.prefix_child_index(&key!["a"]), 0);
        // ("b", 0) would sort into child 1.
        assert_eq!(n.prefix_child_index(&key!["b"]), 1);
        assert_eq!(n.prefix_child_index(&key!["c"]), 3);
    }

    #[test]
    fn test_split_removes_promoted_key() {
        let mut n = IndexNode::new((0..5_i64).map(|i| key![i]).collect());
        let (promoted, right) = n.split(2);
        assert_eq!(promoted, key![2_i64]);
        assert_eq!(n.keys, vec![key![0_i64], key![1_i64]]);
        assert_eq!(right.keys, vec![key![3_i64], key![4_i64]]);
    }

    #[test]
    fn test_encoding_spans_pages() {
        let schema = KeySchema::new(vec![KeyType::Int64]).expect("schema");
        // 8-byte keys: the first page holds (4096 - 12) / 8 = 510 of them.
        let n = IndexNode::new((0..1200_i64).map(|i| key![i]).collect());
        let bytes = Node::Index(n.clone()).encode(&schema);
        assert_eq!(bytes.len(), 3 * PAGE_SIZE);
        assert_eq!(&bytes[8..12], &510_i32.to_be_bytes());
        assert_eq!(&bytes[PAGE_SIZE..PAGE_SIZE + 4], &511_i32.to_be_bytes());

        let decoded = Node::decode(&bytes, NodeKind::Index, &schema).expect("decode");
        assert_eq!(decoded, Node::Index(n));
    }
}
