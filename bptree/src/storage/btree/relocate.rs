//! Plans of node writes and directory relocations.
//!
//! Mutations never touch storage while they are being computed. They record
//! every write and rename into a `Plan` in execution order, and the tree hands
//! the finished plan to the journal in one piece.

use std::path::{Path, PathBuf};

use crate::constants::KEY_FILE_NAME;
use crate::storage::btree::node::Node;
use crate::storage::btree::path::NodePath;
use crate::storage::journal::JournalOp;
use crate::types::KeySchema;

/// An ordered list of operations relative to the tree root.
#[derive(Debug, Default)]
pub struct Plan {
    ops: Vec<JournalOp>,
}

impl Plan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ops(&self) -> &[JournalOp] {
        &self.ops
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::is_empty() is not const-stable
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Write `node` as the key file of `dir`.
    pub fn write_node(&mut self, dir: &Path, node: &Node, schema: &KeySchema) {
        self.ops.push(JournalOp::WriteFile {
            path: dir.join(KEY_FILE_NAME),
            bytes: node.encode(schema),
        });
    }

    /// Write `node` at its own position.
    pub fn write_at(&mut self, path: &NodePath, node: &Node, schema: &KeySchema) {
        self.write_node(&path.dir(), node, schema);
    }

    pub fn create_dir(&mut self, dir: PathBuf) {
        self.ops.push(JournalOp::CreateDir(dir));
    }

    pub fn remove_dir(&mut self, dir: PathBuf) {
        self.ops.push(JournalOp::RemoveDir(dir));
    }

    pub fn rename(&mut self, from: PathBuf, to: PathBuf) {
        self.ops.push(JournalOp::Rename { from, to });
    }

    /// Renumber children `first..=last` of `parent` to `slot + by`.
    ///
    /// Processed from the highest slot down so no rename lands on a slot that
    /// is still occupied.
    pub fn shift_up(&mut self, parent: &Path, first: usize, last: usize, by: usize) {
        for slot in (first..=last).rev() {
            self.rename(
                parent.join(slot.to_string()),
                parent.join((slot + by).to_string()),
            );
        }
    }

    /// Renumber children `first..=last` of `parent` to `slot - by`.
    ///
    /// Processed from the lowest slot up.
    pub fn shift_down(&mut self, parent: &Path, first: usize, last: usize, by: usize) {
        debug_assert!(first >= by);
        for slot in first..=last {
            self.rename(
                parent.join(slot.to_string()),
                parent.join((slot - by).to_string()),
            );
        }
    }

    /// Move `count` children of `from`, starting at slot `from_first`, to
    /// consecutive slots of `to` starting at `to_first`.
    ///
    /// The destination slots must be free.
    pub fn move_children(
        &mut self,
        from: &Path,
        from_first: usize,
        count: usize,
        to: &Path,
        to_first: usize,
    ) {
        for i in 0..count {
            self.rename(
                from.join((from_first + i).to_string()),
                to.join((to_first + i).to_string()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renames(plan: &Plan) -> Vec<(String, String)> {
        plan.ops()
            .iter()
            .filter_map(|op| match op {
                JournalOp::Rename { from, to } => Some((
                    from.to_string_lossy().into_owned(),
                    to.to_string_lossy().into_owned(),
                )),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_shift_up_runs_highest_first() {
        let mut plan = Plan::new();
        plan.shift_up(Path::new("3"), 1, 3, 1);
        assert_eq!(
            renames(&plan),
            vec![
                ("3/3".into(), "3/4".into()),
                ("3/2".into(), "3/3".into()),
                ("3/1".into(), "3/2".into()),
            ]
        );
    }

    #[test]
    fn test_shift_down_runs_lowest_first() {
        let mut plan = Plan::new();
        plan.shift_down(Path::new(""), 2, 3, 2);
        assert_eq!(
            renames(&plan),
            vec![("2".into(), "0".into()), ("3".into(), "1".into())]
        );
    }

    #[test]
    fn test_empty_range_is_a_no_op() {
        let mut plan = Plan::new();
        plan.shift_up(Path::new(""), 4, 3, 1);
        plan.move_children(Path::new("a"), 0, 0, Path::new("b"), 0);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_move_children() {
        let mut plan = Plan::new();
        plan.move_children(Path::new("0"), 3, 2, Path::new(".pending"), 0);
        assert_eq!(
            renames(&plan),
            vec![
                ("0/3".into(), ".pending/0".into()),
                ("0/4".into(), ".pending/1".into()),
            ]
        );
    }

    #[test]
    fn test_write_at_targets_key_file() {
        let mut plan = Plan::new();
        let schema = KeySchema::new(vec![crate::types::KeyType::Int64]).expect("schema");
        plan.write_at(&NodePath::root().child(1), &Node::empty_leaf(), &schema);
        match &plan.ops()[0] {
            JournalOp::WriteFile { path, .. } => assert_eq!(path, &PathBuf::from("1/keylist")),
            other => panic!("unexpected op {other:?}"),
        }
    }
}
