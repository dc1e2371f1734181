//! Structural invariant checking for deterministic simulation testing.
//!
//! The checker reads a tree straight from its store, without going through
//! `BPlusTree`, so it sees exactly what a reopen would see.

use std::fmt;
use std::path::Path;

use crate::constants::KEY_FILE_NAME;
use crate::storage::btree::{Node, NodeKind, NodePath, measure_height, read_node, read_schema};
use crate::storage::io::NodeStore;
use crate::storage::journal::journal_path;
use crate::types::{Key, KeySchema};

/// The kind of structural problem found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// A node holds too few or too many keys.
    KeyCount { count: usize, min: usize, max: usize },
    /// Keys are not strictly ascending.
    Unsorted,
    /// A key falls outside the range its parent's separators allow.
    SeparatorRange,
    /// Child directories are not exactly `0 ..= N`, or a leaf has children.
    ChildDirectories {
        expected: Vec<String>,
        found: Vec<String>,
    },
    /// A leaf entry carries no locators.
    EmptyLocators,
    /// The node file is missing or does not decode.
    Unreadable,
    /// A relocation journal was left behind.
    PendingJournal,
    /// The tree answered differently from the simulation's model.
    ModelMismatch,
}

/// An invariant violation detected during simulation.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// What is wrong.
    pub kind: ViolationKind,
    /// The node it was found at.
    pub node: NodePath,
    /// Description of the violation.
    pub description: String,
    /// Operation index where it was detected.
    pub operation_index: usize,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node {} (after operation {}): {}",
            self.node, self.operation_index, self.description
        )
    }
}

/// Checker for tree invariants.
pub struct InvariantChecker {
    order: usize,
    /// Detected violations.
    violations: Vec<InvariantViolation>,
}

/// Key range a node's keys must fall in: `lower <= key < upper`.
#[derive(Clone, Copy)]
struct Bounds<'a> {
    lower: Option<&'a Key>,
    upper: Option<&'a Key>,
}

impl Bounds<'_> {
    fn contains(&self, key: &Key) -> bool {
        self.lower.is_none_or(|lower| lower <= key) && self.upper.is_none_or(|upper| key < upper)
    }
}

impl InvariantChecker {
    /// Create a checker for trees of the given order.
    #[must_use]
    pub const fn new(order: usize) -> Self {
        Self {
            order,
            violations: Vec::new(),
        }
    }

    /// Get all violations.
    #[must_use]
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.violations
    }

    /// Check if any violations were detected.
    #[must_use]
    pub const fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Clear all recorded violations.
    pub fn clear(&mut self) {
        self.violations.clear();
    }

    /// Add a violation.
    pub fn add_violation(&mut self, violation: InvariantViolation) {
        self.violations.push(violation);
    }

    /// Walk the tree rooted at `root` and record every violation.
    ///
    /// Returns the number of violations this walk found.
    pub fn check_tree<S: NodeStore>(
        &mut self,
        store: &mut S,
        root: &Path,
        operation_index: usize,
    ) -> usize {
        let before = self.violations.len();
        let mut walk = Walk {
            checker: self,
            store,
            root,
            operation_index,
            height: 0,
        };
        walk.run();
        self.violations.len() - before
    }
}

/// Check the tree rooted at `root` once.
pub fn check<S: NodeStore>(store: &mut S, root: &Path, order: usize) -> Vec<InvariantViolation> {
    let mut checker = InvariantChecker::new(order);
    checker.check_tree(store, root, 0);
    checker.violations
}

struct Walk<'a, S: NodeStore> {
    checker: &'a mut InvariantChecker,
    store: &'a mut S,
    root: &'a Path,
    operation_index: usize,
    height: usize,
}

impl<S: NodeStore> Walk<'_, S> {
    fn report(&mut self, kind: ViolationKind, node: &NodePath, description: String) {
        self.checker.add_violation(InvariantViolation {
            kind,
            node: node.clone(),
            description,
            operation_index: self.operation_index,
        });
    }

    fn run(&mut self) {
        let root_path = NodePath::root();
        if self.store.exists(&journal_path(self.root)).unwrap_or(true) {
            self.report(
                ViolationKind::PendingJournal,
                &root_path,
                "relocation journal was not cleared".to_string(),
            );
        }

        let key_file = self.root.join(KEY_FILE_NAME);
        if !self.store.exists(&key_file).unwrap_or(false) {
            // An empty tree has no nodes at all.
            self.check_children(&root_path, 0);
            return;
        }
        let schema = match self.store.read_file(&key_file).map(|bytes| read_schema(&bytes)) {
            Ok(Ok(schema)) => schema,
            Ok(Err(e)) => {
                self.report(ViolationKind::Unreadable, &root_path, e.to_string());
                return;
            }
            Err(e) => {
                self.report(ViolationKind::Unreadable, &root_path, e.to_string());
                return;
            }
        };
        match measure_height(&mut *self.store, self.root) {
            Ok(height) => self.height = height,
            Err(e) => {
                self.report(ViolationKind::Unreadable, &root_path, e.to_string());
                return;
            }
        }

        let unbounded = Bounds {
            lower: None,
            upper: None,
        };
        self.visit(&schema, &root_path, unbounded);
    }

    fn visit(&mut self, schema: &KeySchema, path: &NodePath, bounds: Bounds<'_>) {
        let kind = if path.depth() == self.height {
            NodeKind::Leaf
        } else {
            NodeKind::Index
        };
        let node = match read_node(&mut *self.store, self.root, path, kind, schema) {
            Ok(node) => node,
            Err(e) => {
                self.report(ViolationKind::Unreadable, path, e.to_string());
                return;
            }
        };

        let keys: Vec<&Key> = match &node {
            Node::Index(index) => index.keys.iter().collect(),
            Node::Leaf(leaf) => leaf.entries.iter().map(|e| &e.key).collect(),
        };
        self.check_keys(path, &keys, bounds);

        match &node {
            Node::Leaf(leaf) => {
                if let Some(entry) = leaf.entries.iter().find(|e| e.locators.is_empty()) {
                    self.report(
                        ViolationKind::EmptyLocators,
                        path,
                        format!("{} has no locators", entry.key),
                    );
                }
                self.check_children(path, 0);
            }
            Node::Index(index) => {
                let children = self.check_children(path, index.child_count());
                for slot in children {
                    let child_bounds = Bounds {
                        lower: if slot == 0 {
                            bounds.lower
                        } else {
                            Some(&index.keys[slot - 1])
                        },
                        upper: index.keys.get(slot).or(bounds.upper),
                    };
                    self.visit(schema, &path.child(slot), child_bounds);
                }
            }
        }
    }

    fn check_keys(&mut self, path: &NodePath, keys: &[&Key], bounds: Bounds<'_>) {
        let order = self.checker.order;
        let min = if path.is_root() { 0 } else { order };
        let max = 2 * order;
        if keys.len() < min || keys.len() > max {
            self.report(
                ViolationKind::KeyCount {
                    count: keys.len(),
                    min,
                    max,
                },
                path,
                format!("{} keys, expected {min}..={max}", keys.len()),
            );
        }

        if let Some(pair) = keys.windows(2).find(|pair| pair[0] >= pair[1]) {
            self.report(
                ViolationKind::Unsorted,
                path,
                format!("{} is not below {}", pair[0], pair[1]),
            );
        }

        if let Some(key) = keys.iter().find(|key| !bounds.contains(key)) {
            let lower = bounds.lower.map_or_else(|| "-inf".to_string(), ToString::to_string);
            let upper = bounds.upper.map_or_else(|| "+inf".to_string(), ToString::to_string);
            self.report(
                ViolationKind::SeparatorRange,
                path,
                format!("{key} outside [{lower}, {upper})"),
            );
        }
    }

    /// Compare the node's subdirectories with `0 .. count` and return the
    /// slots that exist.
    fn check_children(&mut self, path: &NodePath, count: usize) -> Vec<usize> {
        let found = match self.store.list_dirs(&path.resolve(self.root)) {
            Ok(found) => found,
            Err(e) => {
                self.report(ViolationKind::Unreadable, path, e.to_string());
                return Vec::new();
            }
        };
        let mut expected: Vec<String> = (0..count).map(|slot| slot.to_string()).collect();
        expected.sort();
        if found != expected {
            self.report(
                ViolationKind::ChildDirectories {
                    expected: expected.clone(),
                    found: found.clone(),
                },
                path,
                format!("children {found:?}, expected {count} numbered children"),
            );
        }
        (0..count)
            .filter(|slot| found.contains(&slot.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::DirectoryStore;
    use crate::testing::{int_key, loc, open_tree};
    use tempfile::tempdir;

    fn build(dir: &Path, count: i64) {
        let mut tree = open_tree(dir, 2);
        for i in 0..count {
            tree.insert(int_key(i), loc(i)).expect("insert");
        }
    }

    #[test]
    fn test_healthy_tree_has_no_violations() {
        let dir = tempdir().expect("create temp dir");
        build(dir.path(), 60);
        let violations = check(&mut DirectoryStore::default(), dir.path(), 2);
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_empty_directory_is_healthy() {
        let dir = tempdir().expect("create temp dir");
        assert!(check(&mut DirectoryStore::default(), dir.path(), 2).is_empty());
    }

    #[test]
    fn test_stray_directory_reported() {
        let dir = tempdir().expect("create temp dir");
        build(dir.path(), 10);
        std::fs::create_dir(dir.path().join(".pending")).expect("mkdir");

        let violations = check(&mut DirectoryStore::default(), dir.path(), 2);
        assert!(
            violations
                .iter()
                .any(|v| matches!(v.kind, ViolationKind::ChildDirectories { .. }) && v.node.is_root())
        );
    }

    #[test]
    fn test_gap_in_numbering_reported() {
        let dir = tempdir().expect("create temp dir");
        build(dir.path(), 10);
        std::fs::rename(dir.path().join("1"), dir.path().join("7")).expect("rename");

        let violations = check(&mut DirectoryStore::default(), dir.path(), 2);
        assert!(
            violations
                .iter()
                .any(|v| matches!(v.kind, ViolationKind::ChildDirectories { .. }))
        );
    }

    #[test]
    fn test_order_bounds_checked() {
        let dir = tempdir().expect("create temp dir");
        build(dir.path(), 10);
        // The same tree read with a larger order has underfull nodes.
        let violations = check(&mut DirectoryStore::default(), dir.path(), 3);
        assert!(
            violations
                .iter()
                .any(|v| matches!(v.kind, ViolationKind::KeyCount { .. }))
        );
    }

    #[test]
    fn test_swapped_leaves_break_separator_range() {
        let dir = tempdir().expect("create temp dir");
        build(dir.path(), 10);
        let first = std::fs::read(dir.path().join("0/keylist")).expect("read");
        let last = std::fs::read(dir.path().join("1/keylist")).expect("read");
        std::fs::write(dir.path().join("0/keylist"), last).expect("write");
        std::fs::write(dir.path().join("1/keylist"), first).expect("write");

        let violations = check(&mut DirectoryStore::default(), dir.path(), 2);
        assert!(
            violations
                .iter()
                .any(|v| v.kind == ViolationKind::SeparatorRange)
        );
    }

    #[test]
    fn test_corrupt_node_reported_unreadable() {
        let dir = tempdir().expect("create temp dir");
        build(dir.path(), 10);
        std::fs::write(dir.path().join("0/keylist"), b"short").expect("write");

        let violations = check(&mut DirectoryStore::default(), dir.path(), 2);
        assert!(violations.iter().any(|v| v.kind == ViolationKind::Unreadable));
    }

    #[test]
    fn test_leftover_journal_reported() {
        let dir = tempdir().expect("create temp dir");
        build(dir.path(), 3);
        std::fs::write(journal_path(dir.path()), b"junk").expect("write");

        let violations = check(&mut DirectoryStore::default(), dir.path(), 2);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::PendingJournal);
    }
}
