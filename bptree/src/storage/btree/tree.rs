//! B+Tree operations over node directories.
//!
//! Every node lives in its own directory: `<dir>/keylist` holds the node's
//! keys and an index node's children are the numbered subdirectories
//! `<dir>/0 ..= <dir>/N`. Leaves are all at depth `height`.
//!
//! Mutations are computed against in-memory copies of the nodes they touch
//! and recorded into a `Plan`; the plan is committed through the relocation
//! journal and only then is the cached root replaced.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{ConfigError, TreeConfig};
use crate::constants::{KEY_FILE_NAME, PENDING_DIR, ROOT_LEFT_DIR, ROOT_RIGHT_DIR};
use crate::storage::btree::index_node::IndexNode;
use crate::storage::btree::leaf_node::LeafNode;
use crate::storage::btree::node::{Node, NodeError, NodeKind, read_schema};
use crate::storage::btree::path::NodePath;
use crate::storage::btree::relocate::Plan;
use crate::storage::file::DirectoryStore;
use crate::storage::io::{NodeStore, StorageError};
use crate::storage::journal::{self, JournalError};
use crate::types::{Key, KeySchema, Locator, SchemaError};

/// A disk-resident B+Tree mapping composite keys to tuple locators.
pub struct BPlusTree<S: NodeStore = DirectoryStore> {
    pub(super) store: S,
    pub(super) location: PathBuf,
    pub(super) order: usize,
    pub(super) height: usize,
    pub(super) schema: Option<KeySchema>,
    pub(super) root: Node,
    /// Set when a commit failed part way; the next call replays the journal
    /// and reloads the root before doing anything else.
    needs_recovery: bool,
}

impl BPlusTree<DirectoryStore> {
    /// Open the tree stored under `location`, creating the directory if
    /// needed. A tree with no root key file is empty and takes its schema
    /// from the first inserted key.
    pub fn open(location: impl AsRef<Path>, config: &TreeConfig) -> Result<Self, TreeError> {
        Self::open_with_store(DirectoryStore::new(config.sync_writes), location, config)
    }

    /// Open the tree under `location`, initializing an empty root leaf with
    /// `schema` if the tree does not exist yet.
    pub fn create(
        location: impl AsRef<Path>,
        schema: KeySchema,
        config: &TreeConfig,
    ) -> Result<Self, TreeError> {
        Self::create_with_store(
            DirectoryStore::new(config.sync_writes),
            location,
            schema,
            config,
        )
    }
}

impl<S: NodeStore> BPlusTree<S> {
    /// Open a tree through an arbitrary store.
    pub fn open_with_store(
        mut store: S,
        location: impl AsRef<Path>,
        config: &TreeConfig,
    ) -> Result<Self, TreeError> {
        config.validate()?;
        let location = location.as_ref().to_path_buf();
        store.create_dir_all(&location)?;
        let mut tree = Self {
            store,
            location,
            order: config.order,
            height: 0,
            schema: None,
            root: Node::empty_leaf(),
            needs_recovery: true,
        };
        tree.recover()?;
        Ok(tree)
    }

    /// Create a tree through an arbitrary store.
    pub fn create_with_store(
        store: S,
        location: impl AsRef<Path>,
        schema: KeySchema,
        config: &TreeConfig,
    ) -> Result<Self, TreeError> {
        let mut tree = Self::open_with_store(store, location, config)?;
        match &tree.schema {
            Some(existing) if *existing != schema => {
                return Err(TreeError::Node {
                    path: tree.location.join(KEY_FILE_NAME),
                    source: NodeError::SchemaMismatch {
                        expected: schema,
                        found: existing.clone(),
                    },
                });
            }
            Some(_) => {}
            None => {
                let mut plan = Plan::new();
                plan.write_at(&NodePath::root(), &Node::empty_leaf(), &schema);
                tree.commit(&plan)?;
                tree.schema = Some(schema);
            }
        }
        Ok(tree)
    }

    /// Number of index levels above the leaves.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Directory of the root node.
    #[must_use]
    pub fn root_location(&self) -> &Path {
        &self.location
    }

    /// The key schema, once the tree has one.
    #[must_use]
    pub const fn schema(&self) -> Option<&KeySchema> {
        self.schema.as_ref()
    }

    #[must_use]
    pub const fn order(&self) -> usize {
        self.order
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Look up a full key or a key prefix.
    ///
    /// A full key returns its locators in insertion order. A prefix returns
    /// the locators of every key that starts with it, in key order. `None`
    /// means nothing matched.
    pub fn search(&mut self, key: &Key) -> Result<Option<Vec<Locator>>, TreeError> {
        self.ensure_recovered()?;
        let Some(schema) = self.schema.clone() else {
            return Ok(None);
        };
        schema.validate_probe(key)?;

        if key.arity() == schema.arity() {
            let (_, leaf) = self.find_leaf(&schema, |index| index.child_index(key))?;
            return Ok(leaf.get(key).map(<[Locator]>::to_vec));
        }
        self.prefix_search(&schema, key)
    }

    fn prefix_search(
        &mut self,
        schema: &KeySchema,
        prefix: &Key,
    ) -> Result<Option<Vec<Locator>>, TreeError> {
        let (mut path, mut leaf) =
            self.find_leaf(schema, |index| index.prefix_child_index(prefix))?;
        let mut start = leaf.prefix_start(prefix);
        let mut found = Vec::new();
        let mut matched = false;
        loop {
            let mut run_ended = false;
            for entry in &leaf.entries[start..] {
                if !entry.key.starts_with(prefix) {
                    run_ended = true;
                    break;
                }
                matched = true;
                found.extend_from_slice(&entry.locators);
            }
            if run_ended {
                break;
            }
            match self.next_leaf(&path, schema)? {
                Some((next_path, next_leaf)) => {
                    path = next_path;
                    leaf = next_leaf;
                    start = 0;
                }
                None => break,
            }
        }
        Ok(matched.then_some(found))
    }

    /// Insert a locator under `key`. Inserting an existing key appends the
    /// locator to its list.
    pub fn insert(&mut self, key: Key, locator: Locator) -> Result<(), TreeError> {
        self.ensure_recovered()?;
        let schema = match &self.schema {
            Some(schema) => {
                schema.validate_key(&key)?;
                schema.clone()
            }
            None => KeySchema::of_key(&key)?,
        };

        let mut plan = Plan::new();
        let mut root = self.root.clone();
        let mut height = self.height;
        if let Some((promoted, right)) =
            self.insert_into(&mut plan, &schema, &NodePath::root(), &mut root, key, locator)?
        {
            root = Self::promote_root(&mut plan, &schema, &root, promoted, &right);
            height += 1;
        }

        self.commit(&plan)?;
        self.root = root;
        self.height = height;
        self.schema = Some(schema);
        Ok(())
    }

    /// Insert beneath `node`, which lives at `path`.
    ///
    /// Returns the promoted key and new right sibling if `node` split; `node`
    /// is then the left half and is written by the caller. Otherwise `node`
    /// has been written, if it changed.
    fn insert_into(
        &mut self,
        plan: &mut Plan,
        schema: &KeySchema,
        path: &NodePath,
        node: &mut Node,
        key: Key,
        locator: Locator,
    ) -> Result<Option<(Key, Node)>, TreeError> {
        match node {
            Node::Leaf(leaf) => leaf.insert(key, locator),
            Node::Index(index) => {
                let slot = index.child_index(&key);
                let child_path = path.child(slot);
                let mut child = self.load(&child_path, schema)?;
                let Some((promoted, right)) =
                    self.insert_into(plan, schema, &child_path, &mut child, key, locator)?
                else {
                    return Ok(None);
                };
                Self::place_split(plan, schema, path, index, slot, &child, promoted, &right);
            }
        }

        if node.len() > 2 * self.order {
            return Ok(Some(self.split(path, node)));
        }
        plan.write_at(path, node, schema);
        Ok(None)
    }

    fn split(&self, path: &NodePath, node: &mut Node) -> (Key, Node) {
        let (promoted, right) = match node {
            Node::Leaf(leaf) => {
                let (promoted, right) = leaf.split(self.order);
                (promoted, Node::Leaf(right))
            }
            Node::Index(index) => {
                let (promoted, right) = index.split(self.order);
                (promoted, Node::Index(right))
            }
        };
        debug!(
            node = %path,
            kind = ?node.kind(),
            left = node.len(),
            right = right.len(),
            promoted = %promoted,
            "split node"
        );
        (promoted, right)
    }

    /// Install a split child's right half in the slot after the child.
    ///
    /// The right half is staged in the parent's pending directory, later
    /// siblings are renumbered from the highest slot down, and the staged
    /// directory is renamed into the freed slot.
    #[allow(clippy::too_many_arguments)]
    fn place_split(
        plan: &mut Plan,
        schema: &KeySchema,
        parent_path: &NodePath,
        parent: &mut IndexNode,
        slot: usize,
        left: &Node,
        promoted: Key,
        right: &Node,
    ) {
        let parent_dir = parent_path.dir();
        let left_dir = parent_path.child(slot).dir();
        let pending = parent_dir.join(PENDING_DIR);

        plan.create_dir(pending.clone());
        if let Node::Index(left_index) = left {
            plan.move_children(
                &left_dir,
                left_index.child_count(),
                right.len() + 1,
                &pending,
                0,
            );
        }
        plan.write_node(&pending, right, schema);
        plan.write_node(&left_dir, left, schema);

        let last_slot = parent.keys.len();
        plan.shift_up(&parent_dir, slot + 1, last_slot, 1);
        plan.rename(pending, parent_dir.join((slot + 1).to_string()));
        parent.keys.insert(slot, promoted);
    }

    /// Turn a split root into an index root over its two halves.
    fn promote_root(
        plan: &mut Plan,
        schema: &KeySchema,
        left: &Node,
        promoted: Key,
        right: &Node,
    ) -> Node {
        let root_dir = NodePath::root().dir();
        let left_dir = PathBuf::from(ROOT_LEFT_DIR);
        let right_dir = PathBuf::from(ROOT_RIGHT_DIR);

        plan.create_dir(left_dir.clone());
        plan.create_dir(right_dir.clone());
        if let Node::Index(left_index) = left {
            let left_children = left_index.child_count();
            plan.move_children(&root_dir, 0, left_children, &left_dir, 0);
            plan.move_children(&root_dir, left_children, right.len() + 1, &right_dir, 0);
        }
        plan.write_node(&left_dir, left, schema);
        plan.write_node(&right_dir, right, schema);
        plan.rename(left_dir, root_dir.join("0"));
        plan.rename(right_dir, root_dir.join("1"));

        debug!(promoted = %promoted, "promoted new root");
        let root = Node::Index(IndexNode::new(vec![promoted]));
        plan.write_node(&root_dir, &root, schema);
        root
    }

    /// Descend from the root to a leaf, choosing the child slot at each
    /// index node with `route`.
    pub(super) fn find_leaf(
        &mut self,
        schema: &KeySchema,
        route: impl Fn(&IndexNode) -> usize,
    ) -> Result<(NodePath, LeafNode), TreeError> {
        let mut path = NodePath::root();
        let mut node = self.root.clone();
        loop {
            match node {
                Node::Leaf(leaf) => return Ok((path, leaf)),
                Node::Index(index) => {
                    path = path.child(route(&index));
                    node = self.load(&path, schema)?;
                }
            }
        }
    }

    /// The leaf after the one at `path`, found by trying the next slot at
    /// each level upward and then following slot 0 back down.
    pub(super) fn next_leaf(
        &mut self,
        path: &NodePath,
        schema: &KeySchema,
    ) -> Result<Option<(NodePath, LeafNode)>, TreeError> {
        let mut current = path.clone();
        while let (Some(slot), Some(parent)) = (current.last_slot(), current.parent()) {
            let sibling = parent.child(slot + 1);
            if self.store.exists(&sibling.resolve(&self.location))? {
                let mut leaf_path = sibling;
                while leaf_path.depth() < self.height {
                    leaf_path = leaf_path.child(0);
                }
                return match self.load(&leaf_path, schema)? {
                    Node::Leaf(leaf) => Ok(Some((leaf_path, leaf))),
                    Node::Index(_) => unreachable!("node {leaf_path} at leaf depth is an index"),
                };
            }
            current = parent;
        }
        Ok(None)
    }

    /// Load the node at `path`. Its kind follows from its depth.
    pub(super) fn load(&mut self, path: &NodePath, schema: &KeySchema) -> Result<Node, TreeError> {
        if path.is_root() {
            return Ok(self.root.clone());
        }
        let kind = if path.depth() == self.height {
            NodeKind::Leaf
        } else {
            NodeKind::Index
        };
        read_node(&mut self.store, &self.location, path, kind, schema)
    }

    /// Apply a plan. On failure the on-disk tree may be part way through the
    /// plan, so the tree replays the journal before its next operation.
    pub(super) fn commit(&mut self, plan: &Plan) -> Result<(), TreeError> {
        if let Err(e) = journal::commit(&mut self.store, &self.location, plan.ops()) {
            self.needs_recovery = true;
            return Err(e.into());
        }
        Ok(())
    }

    pub(super) fn ensure_recovered(&mut self) -> Result<(), TreeError> {
        if self.needs_recovery {
            self.recover()?;
        }
        Ok(())
    }

    /// Replay any interrupted plan, then reload the root, schema and height.
    fn recover(&mut self) -> Result<(), TreeError> {
        journal::recover(&mut self.store, &self.location)?;

        let key_file = self.location.join(KEY_FILE_NAME);
        if self.store.exists(&key_file)? {
            let bytes = self.store.read_file(&key_file)?;
            let schema = read_schema(&bytes).map_err(|source| TreeError::Node {
                path: key_file.clone(),
                source,
            })?;
            let height = measure_height(&mut self.store, &self.location)?;
            let kind = if height == 0 {
                NodeKind::Leaf
            } else {
                NodeKind::Index
            };
            self.root = Node::decode(&bytes, kind, &schema).map_err(|source| TreeError::Node {
                path: key_file,
                source,
            })?;
            self.height = height;
            self.schema = Some(schema);
        } else {
            self.root = Node::empty_leaf();
            self.height = 0;
            self.schema = None;
        }
        self.needs_recovery = false;
        Ok(())
    }
}

/// Count index levels by following child `0` directories down from `root`.
pub fn measure_height<S: NodeStore>(store: &mut S, root: &Path) -> Result<usize, StorageError> {
    let mut dir = root.to_path_buf();
    let mut height = 0;
    loop {
        dir.push("0");
        if !store.exists(&dir)? {
            return Ok(height);
        }
        height += 1;
    }
}

/// Read and decode the node at `path` of the tree rooted at `root`.
pub fn read_node<S: NodeStore>(
    store: &mut S,
    root: &Path,
    path: &NodePath,
    kind: NodeKind,
    schema: &KeySchema,
) -> Result<Node, TreeError> {
    let key_file = root.join(path.key_file());
    let bytes = store.read_file(&key_file)?;
    Node::decode(&bytes, kind, schema).map_err(|source| TreeError::Node {
        path: key_file,
        source,
    })
}

/// Errors that can occur during tree operations.
#[derive(Debug)]
pub enum TreeError {
    /// Reading or relocating node storage failed.
    Storage(StorageError),
    /// A node file could not be decoded.
    Node { path: PathBuf, source: NodeError },
    /// The relocation journal could not be written or replayed.
    Journal(JournalError),
    /// A key does not fit the tree's schema.
    Schema(SchemaError),
    /// Invalid configuration.
    Config(ConfigError),
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Node { path, source } => {
                write!(f, "corrupt node {}: {source}", path.display())
            }
            Self::Journal(e) => write!(f, "{e}"),
            Self::Schema(e) => write!(f, "schema mismatch: {e}"),
            Self::Config(e) => write!(f, "configuration error: {e}"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Node { source, .. } => Some(source),
            Self::Journal(e) => Some(e),
            Self::Schema(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<StorageError> for TreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<JournalError> for TreeError {
    fn from(e: JournalError) -> Self {
        match e {
            JournalError::Storage(e) => Self::Storage(e),
            other => Self::Journal(other),
        }
    }
}

impl From<SchemaError> for TreeError {
    fn from(e: SchemaError) -> Self {
        Self::Schema(e)
    }
}

impl From<ConfigError> for TreeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
