//! Node addressing by child slot.
//!
//! A node's identity is the sequence of child slots taken from the root. Its
//! directory is the tree root joined with one numeric component per slot.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::constants::KEY_FILE_NAME;

/// Position of a node relative to the tree root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath {
    slots: Vec<usize>,
}

impl NodePath {
    /// The root node.
    #[must_use]
    pub const fn root() -> Self {
        Self { slots: Vec::new() }
    }

    #[must_use]
    pub fn from_slots(slots: Vec<usize>) -> Self {
        Self { slots }
    }

    #[must_use]
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    /// Levels below the root.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.slots.is_empty()
    }

    /// The node's child in `slot`.
    #[must_use]
    pub fn child(&self, slot: usize) -> Self {
        let mut slots = self.slots.clone();
        slots.push(slot);
        Self { slots }
    }

    /// The node's parent, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.slots.split_last()?;
        Some(Self {
            slots: rest.to_vec(),
        })
    }

    /// The node's own slot within its parent.
    #[must_use]
    pub fn last_slot(&self) -> Option<usize> {
        self.slots.last().copied()
    }

    /// Directory relative to the tree root.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.slots.iter().map(ToString::to_string).collect()
    }

    /// Key file relative to the tree root.
    #[must_use]
    pub fn key_file(&self) -> PathBuf {
        self.dir().join(KEY_FILE_NAME)
    }

    /// Absolute directory under `root`.
    #[must_use]
    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(self.dir())
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{slot}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation() {
        let root = NodePath::root();
        assert!(root.is_root());
        assert_eq!(root.parent(), None);

        let node = root.child(2).child(0);
        assert_eq!(node.depth(), 2);
        assert_eq!(node.slots(), &[2, 0]);
        assert_eq!(node.last_slot(), Some(0));
        assert_eq!(node.parent(), Some(root.child(2)));
        assert_eq!(node.to_string(), "/2/0");
        assert_eq!(root.to_string(), "/");
    }

    #[test]
    fn test_paths() {
        let node = NodePath::from_slots(vec![1, 12]);
        assert_eq!(node.dir(), PathBuf::from("1/12"));
        assert_eq!(node.key_file(), PathBuf::from("1/12/keylist"));
        assert_eq!(NodePath::root().key_file(), PathBuf::from("keylist"));
        assert_eq!(
            node.resolve(Path::new("/data/idx")),
            PathBuf::from("/data/idx/1/12")
        );
    }
}
