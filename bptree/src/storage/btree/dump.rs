//! Pre-order text rendering of a tree for debugging.

use crate::storage::btree::node::Node;
use crate::storage::btree::path::NodePath;
use crate::storage::btree::tree::{BPlusTree, TreeError};
use crate::storage::io::NodeStore;
use crate::types::KeySchema;

impl<S: NodeStore> BPlusTree<S> {
    /// Render every node in pre-order, one `-` of indent per level.
    ///
    /// Index nodes print their separator keys on one line; leaves print one
    /// line per entry with its locators.
    ///
    /// ```text
    /// (3)
    /// -(1) -> [1,0]
    /// -(2) -> [2,0] [2,1]
    /// -(3) -> [3,0]
    /// ```
    pub fn dump(&mut self) -> Result<String, TreeError> {
        self.ensure_recovered()?;
        let mut out = String::new();
        let Some(schema) = self.schema.clone() else {
            return Ok(out);
        };
        let root = self.root.clone();
        self.dump_node(&schema, &NodePath::root(), &root, &mut out)?;
        Ok(out)
    }

    fn dump_node(
        &mut self,
        schema: &KeySchema,
        path: &NodePath,
        node: &Node,
        out: &mut String,
    ) -> Result<(), TreeError> {
        let indent = "-".repeat(path.depth());
        match node {
            Node::Index(index) => {
                let keys: Vec<String> = index.keys.iter().map(ToString::to_string).collect();
                out.push_str(&indent);
                out.push_str(&keys.join(" "));
                out.push('\n');
                for slot in 0..index.child_count() {
                    let child_path = path.child(slot);
                    let child = self.load(&child_path, schema)?;
                    self.dump_node(schema, &child_path, &child, out)?;
                }
            }
            Node::Leaf(leaf) => {
                for entry in &leaf.entries {
                    let locators: Vec<String> =
                        entry.locators.iter().map(ToString::to_string).collect();
                    out.push_str(&format!("{indent}{} -> {}\n", entry.key, locators.join(" ")));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{int_key, open_tree};
    use crate::types::Locator;
    use tempfile::tempdir;

    #[test]
    fn test_dump_empty_tree() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = open_tree(dir.path(), 2);
        assert_eq!(tree.dump().expect("dump"), "");
    }

    #[test]
    fn test_dump_after_split() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = open_tree(dir.path(), 2);
        for i in 1..=5 {
            tree.insert(int_key(i), Locator::new(i as i32, 0)).expect("insert");
        }
        tree.insert(int_key(2), Locator::new(2, 1)).expect("insert");

        let expected = "\
(3)
-(1) -> [1,0]
-(2) -> [2,0] [2,1]
-(3) -> [3,0]
-(4) -> [4,0]
-(5) -> [5,0]
";
        assert_eq!(tree.dump().expect("dump"), expected);
    }
}
