//! Deletion: underflow repair by redistribution or merge, and root collapse.
//!
//! A non-root node that drops below `order` keys first tries to borrow from
//! an adjacent sibling with keys to spare; otherwise it merges with one. A
//! merge removes one child from the parent, which can cascade upward. When
//! the root index is left with no keys its only child becomes the root.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::constants::COLLAPSE_DIR;
use crate::storage::btree::index_node::IndexNode;
use crate::storage::btree::node::Node;
use crate::storage::btree::path::NodePath;
use crate::storage::btree::relocate::Plan;
use crate::storage::btree::tree::{BPlusTree, TreeError};
use crate::storage::io::NodeStore;
use crate::types::{Key, KeySchema, Locator};

/// Outcome of deleting beneath one node.
struct Removal {
    /// Locators of the removed key, or `None` if the key was absent.
    locators: Option<Vec<Locator>>,
    /// Whether the node itself changed and still needs writing.
    dirty: bool,
    /// The node that absorbed its sibling, when a merge happened directly
    /// beneath this node.
    survivor: Option<Node>,
}

impl Removal {
    const fn unchanged(locators: Option<Vec<Locator>>) -> Self {
        Self {
            locators,
            dirty: false,
            survivor: None,
        }
    }
}

/// Which sibling gives up keys in a redistribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Donor {
    Left,
    Right,
}

impl<S: NodeStore> BPlusTree<S> {
    /// Remove `key` with all of its locators and return them.
    ///
    /// Deleting an absent key returns `None` and writes nothing.
    pub fn delete(&mut self, key: &Key) -> Result<Option<Vec<Locator>>, TreeError> {
        self.ensure_recovered()?;
        let Some(schema) = self.schema.clone() else {
            return Ok(None);
        };
        schema.validate_key(key)?;

        let mut plan = Plan::new();
        let mut root = self.root.clone();
        let removal = self.delete_from(&mut plan, &schema, &NodePath::root(), &mut root, key)?;
        let Some(locators) = removal.locators else {
            return Ok(None);
        };

        let mut height = self.height;
        let collapse = matches!(&root, Node::Index(index) if index.keys.is_empty());
        if removal.dirty {
            match removal.survivor {
                Some(survivor) if collapse => {
                    Self::collapse_root(&mut plan, &schema, &survivor);
                    root = survivor;
                    height -= 1;
                }
                _ => plan.write_at(&NodePath::root(), &root, &schema),
            }
        }

        self.commit(&plan)?;
        self.root = root;
        self.height = height;
        Ok(Some(locators))
    }

    fn delete_from(
        &mut self,
        plan: &mut Plan,
        schema: &KeySchema,
        path: &NodePath,
        node: &mut Node,
        key: &Key,
    ) -> Result<Removal, TreeError> {
        let index = match node {
            Node::Leaf(leaf) => {
                let locators = leaf.remove(key);
                return Ok(Removal {
                    dirty: locators.is_some(),
                    locators,
                    survivor: None,
                });
            }
            Node::Index(index) => index,
        };

        let slot = index.child_index(key);
        let child_path = path.child(slot);
        let mut child = self.load(&child_path, schema)?;
        let removal = self.delete_from(plan, schema, &child_path, &mut child, key)?;
        if removal.locators.is_none() || !removal.dirty {
            return Ok(Removal::unchanged(removal.locators));
        }
        if child.len() >= self.order {
            plan.write_at(&child_path, &child, schema);
            return Ok(Removal::unchanged(removal.locators));
        }

        let survivor = self.rebalance(plan, schema, path, index, slot, child)?;
        Ok(Removal {
            locators: removal.locators,
            dirty: true,
            survivor,
        })
    }

    /// Repair the underflowed child in `slot` of `parent`.
    ///
    /// Returns the merged node if the repair was a merge.
    fn rebalance(
        &mut self,
        plan: &mut Plan,
        schema: &KeySchema,
        parent_path: &NodePath,
        parent: &mut IndexNode,
        slot: usize,
        child: Node,
    ) -> Result<Option<Node>, TreeError> {
        let mut left = None;
        if slot > 0 {
            let sibling = self.load(&parent_path.child(slot - 1), schema)?;
            if sibling.len() > self.order {
                Self::redistribute(
                    plan,
                    schema,
                    parent_path,
                    parent,
                    slot - 1,
                    sibling,
                    child,
                    Donor::Left,
                );
                return Ok(None);
            }
            left = Some(sibling);
        }

        let child = if slot < parent.keys.len() {
            let sibling = self.load(&parent_path.child(slot + 1), schema)?;
            if sibling.len() > self.order {
                Self::redistribute(
                    plan,
                    schema,
                    parent_path,
                    parent,
                    slot,
                    child,
                    sibling,
                    Donor::Right,
                );
                return Ok(None);
            }
            if left.is_none() {
                return Ok(Some(Self::merge(
                    plan,
                    schema,
                    parent_path,
                    parent,
                    slot,
                    child,
                    sibling,
                )));
            }
            child
        } else {
            child
        };

        match left {
            Some(left) => Ok(Some(Self::merge(
                plan,
                schema,
                parent_path,
                parent,
                slot - 1,
                left,
                child,
            ))),
            None => unreachable!("node {} has no siblings", parent_path.child(slot)),
        }
    }

    /// Move keys between the adjacent children `left_slot` and
    /// `left_slot + 1` so the underflowed one ends up with half of their
    /// combined keys, rounded up.
    #[allow(clippy::too_many_arguments)]
    fn redistribute(
        plan: &mut Plan,
        schema: &KeySchema,
        parent_path: &NodePath,
        parent: &mut IndexNode,
        left_slot: usize,
        mut left: Node,
        mut right: Node,
        donor: Donor,
    ) {
        let target = (left.len() + right.len()).div_ceil(2);
        let left_dir = parent_path.child(left_slot).dir();
        let right_dir = parent_path.child(left_slot + 1).dir();

        let moved = match (&mut left, &mut right) {
            (Node::Leaf(left), Node::Leaf(right)) => {
                let moved = match donor {
                    Donor::Left => {
                        let moved = target - right.entries.len();
                        let taken = left.entries.split_off(left.entries.len() - moved);
                        right.entries.splice(0..0, taken);
                        moved
                    }
                    Donor::Right => {
                        let moved = target - left.entries.len();
                        left.entries.extend(right.entries.drain(..moved));
                        moved
                    }
                };
                let Some(first) = right.first_key() else {
                    unreachable!("redistribution left {} empty", parent_path.child(left_slot + 1));
                };
                parent.keys[left_slot] = first.clone();
                moved
            }
            (Node::Index(left), Node::Index(right)) => match donor {
                Donor::Left => {
                    let moved = target - right.keys.len();
                    Self::rotate_right(
                        plan, parent, left_slot, left, right, moved, &left_dir, &right_dir,
                    );
                    moved
                }
                Donor::Right => {
                    let moved = target - left.keys.len();
                    Self::rotate_left(
                        plan, parent, left_slot, left, right, moved, &left_dir, &right_dir,
                    );
                    moved
                }
            },
            _ => unreachable!("siblings under {parent_path} differ in kind"),
        };

        plan.write_node(&left_dir, &left, schema);
        plan.write_node(&right_dir, &right, schema);
        debug!(
            parent = %parent_path,
            left_slot,
            moved,
            ?donor,
            "redistributed keys between siblings"
        );
    }

    /// Move `moved` keys and their children from the end of `left` to the
    /// front of `right`, rotating through the parent's separator.
    #[allow(clippy::too_many_arguments)]
    fn rotate_right(
        plan: &mut Plan,
        parent: &mut IndexNode,
        separator: usize,
        left: &mut IndexNode,
        right: &mut IndexNode,
        moved: usize,
        left_dir: &Path,
        right_dir: &Path,
    ) {
        let left_len = left.keys.len();
        let right_len = right.keys.len();

        let mut taken = left.keys.split_off(left_len - moved);
        let new_separator = taken.remove(0);
        taken.push(std::mem::replace(&mut parent.keys[separator], new_separator));
        right.keys.splice(0..0, taken);

        plan.shift_up(right_dir, 0, right_len, moved);
        plan.move_children(left_dir, left_len - moved + 1, moved, right_dir, 0);
    }

    /// Move `moved` keys and their children from the front of `right` to the
    /// end of `left`, rotating through the parent's separator.
    #[allow(clippy::too_many_arguments)]
    fn rotate_left(
        plan: &mut Plan,
        parent: &mut IndexNode,
        separator: usize,
        left: &mut IndexNode,
        right: &mut IndexNode,
        moved: usize,
        left_dir: &Path,
        right_dir: &Path,
    ) {
        let left_len = left.keys.len();
        let right_len = right.keys.len();

        let mut taken: Vec<Key> = right.keys.drain(..moved).collect();
        let Some(new_separator) = taken.pop() else {
            unreachable!("rotation of zero keys");
        };
        left.keys.push(std::mem::replace(
            &mut parent.keys[separator],
            new_separator,
        ));
        left.keys.extend(taken);

        plan.move_children(right_dir, 0, moved, left_dir, left_len + 1);
        plan.shift_down(right_dir, moved, right_len, moved);
    }

    /// Fold the child at `left_slot + 1` into the child at `left_slot` and
    /// drop it from the parent. Returns the merged node.
    fn merge(
        plan: &mut Plan,
        schema: &KeySchema,
        parent_path: &NodePath,
        parent: &mut IndexNode,
        left_slot: usize,
        mut left: Node,
        right: Node,
    ) -> Node {
        let parent_dir = parent_path.dir();
        let left_dir = parent_path.child(left_slot).dir();
        let right_dir = parent_path.child(left_slot + 1).dir();

        match (&mut left, right) {
            (Node::Leaf(left), Node::Leaf(right)) => left.entries.extend(right.entries),
            (Node::Index(left), Node::Index(right)) => {
                let left_children = left.child_count();
                plan.move_children(&right_dir, 0, right.child_count(), &left_dir, left_children);
                left.keys.push(parent.keys[left_slot].clone());
                left.keys.extend(right.keys);
            }
            _ => unreachable!("siblings under {parent_path} differ in kind"),
        }

        plan.write_node(&left_dir, &left, schema);
        plan.remove_dir(right_dir);
        let last_slot = parent.keys.len();
        plan.shift_down(&parent_dir, left_slot + 2, last_slot, 1);
        parent.keys.remove(left_slot);

        debug!(
            parent = %parent_path,
            left_slot,
            keys = left.len(),
            "merged siblings"
        );
        left
    }

    /// Replace a root index that has no keys left with its only child.
    fn collapse_root(plan: &mut Plan, schema: &KeySchema, survivor: &Node) {
        let root_dir = NodePath::root().dir();
        let staged = PathBuf::from(COLLAPSE_DIR);

        plan.rename(root_dir.join("0"), staged.clone());
        if let Node::Index(index) = survivor {
            plan.move_children(&staged, 0, index.child_count(), &root_dir, 0);
        }
        plan.write_node(&root_dir, survivor, schema);
        plan.remove_dir(staged);
        debug!(kind = ?survivor.kind(), keys = survivor.len(), "collapsed root");
    }
}
