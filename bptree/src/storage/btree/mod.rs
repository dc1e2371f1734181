//! Directory-resident B+Tree.
//!
//! # Layout
//!
//! Every node is a directory. Its `keylist` file holds the node's keys in
//! 4096-byte pages, and an index node's children are its numbered
//! subdirectories `0 ..= N`. Leaves hold each key's locator list; all leaves
//! sit at depth `height`.
//!
//! ```text
//! idx/keylist          root (index)
//! idx/0/keylist        first leaf
//! idx/1/keylist        second leaf
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use bptree::{BPlusTree, Locator, TreeConfig, key};
//!
//! let mut tree = BPlusTree::open("/tmp/idx", &TreeConfig::default())?;
//! tree.insert(key![7_i64, "seven"], Locator::new(3, 14))?;
//! assert_eq!(tree.search(&key![7_i64])?, Some(vec![Locator::new(3, 14)]));
//! # Ok::<(), bptree::TreeError>(())
//! ```

mod dump;
mod index_node;
mod leaf_node;
mod node;
mod path;
mod rebalance;
mod relocate;
mod tree;

pub use index_node::IndexNode;
pub use leaf_node::{LeafEntry, LeafNode};
pub use node::{Node, NodeError, NodeKind, read_schema};
pub use path::NodePath;
pub use relocate::Plan;
pub use tree::{BPlusTree, TreeError, measure_height, read_node};
