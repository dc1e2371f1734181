//! Page-framed node codec shared by index and leaf nodes.
//!
//! A node's `keylist` file is a whole number of 4KB pages:
//!
//! ```text
//! first page:  | attr count (i32) | tag (i32) * n | record count (i32) | records ... |
//! later pages: | record count (i32) | records ... |
//! ```
//!
//! A record never straddles a page boundary. For index nodes a record is one
//! key. For leaf nodes a record is either an entry head (locator count plus
//! key) or a single `(page_id, slot_id)` locator pair; an entry's locators
//! follow its head and may continue onto later pages. Decoding is driven by
//! the per-page record counts.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::constants::PAGE_SIZE;
use crate::storage::btree::index_node::IndexNode;
use crate::storage::btree::leaf_node::LeafNode;
use crate::storage::page::{Page, pages_to_bytes};
use crate::types::{Key, KeySchema, KeyType, MAX_KEY_ATTRIBUTES, TypedKey};

/// Size of a page's record count.
const COUNT_SIZE: usize = 4;

/// Which kind of node a directory holds. Not recorded on disk: a node is a
/// leaf exactly when it sits at depth `height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Index,
    Leaf,
}

/// A decoded node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Index(IndexNode),
    Leaf(LeafNode),
}

impl Node {
    /// An empty leaf, the shape of a fresh root.
    #[must_use]
    pub fn empty_leaf() -> Self {
        Self::Leaf(LeafNode::default())
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Index(_) => NodeKind::Index,
            Self::Leaf(_) => NodeKind::Leaf,
        }
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Index(node) => node.keys.len(),
            Self::Leaf(node) => node.entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize into the bytes of a `keylist` file.
    #[must_use]
    pub fn encode(&self, schema: &KeySchema) -> Vec<u8> {
        match self {
            Self::Index(node) => node.encode(schema),
            Self::Leaf(node) => node.encode(schema),
        }
    }

    /// Decode a `keylist` file, checking its header against `schema`.
    pub fn decode(bytes: &[u8], kind: NodeKind, schema: &KeySchema) -> Result<Self, NodeError> {
        let found = read_schema(bytes)?;
        if found != *schema {
            return Err(NodeError::SchemaMismatch {
                expected: schema.clone(),
                found,
            });
        }
        let mut reader = PageReader::new(bytes, schema)?;
        match kind {
            NodeKind::Index => IndexNode::decode(&mut reader).map(Self::Index),
            NodeKind::Leaf => LeafNode::decode(&mut reader).map(Self::Leaf),
        }
    }
}

/// Errors that can occur while decoding a node file.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeError {
    /// File has no pages.
    EmptyFile,
    /// File length is not a whole number of pages.
    Misaligned(usize),
    /// Header attribute count out of range.
    InvalidAttributeCount(i32),
    /// Header names a type tag outside {1, 2, 5}.
    UnknownTypeTag(i32),
    /// Page record count is negative.
    InvalidRecordCount { page: usize, count: i32 },
    /// A record runs past the end of its page.
    RecordOverrun { page: usize },
    /// Text attribute is not valid UTF-8.
    InvalidText { page: usize },
    /// A leaf entry claims zero or fewer locators.
    InvalidLocatorCount(i32),
    /// The file ends before an entry's locators do.
    TruncatedLocators,
    /// Header schema differs from the tree's schema.
    SchemaMismatch {
        expected: KeySchema,
        found: KeySchema,
    },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFile => write!(f, "node file is empty"),
            Self::Misaligned(len) => {
                write!(f, "node file is {len} bytes, not a multiple of {PAGE_SIZE}")
            }
            Self::InvalidAttributeCount(n) => write!(f, "invalid attribute count {n}"),
            Self::UnknownTypeTag(tag) => write!(f, "unknown type tag {tag}"),
            Self::InvalidRecordCount { page, count } => {
                write!(f, "page {page} has invalid record count {count}")
            }
            Self::RecordOverrun { page } => write!(f, "record overruns page {page}"),
            Self::InvalidText { page } => write!(f, "invalid UTF-8 text on page {page}"),
            Self::InvalidLocatorCount(n) => write!(f, "invalid locator count {n}"),
            Self::TruncatedLocators => write!(f, "locator list truncated"),
            Self::SchemaMismatch { expected, found } => write!(
                f,
                "node schema {:?} differs from tree schema {:?}",
                found.types(),
                expected.types()
            ),
        }
    }
}

impl std::error::Error for NodeError {}

/// Read the key schema from a node file's header.
pub fn read_schema(bytes: &[u8]) -> Result<KeySchema, NodeError> {
    check_length(bytes)?;
    let page = Page::from_slice(&bytes[..PAGE_SIZE]).ok_or(NodeError::EmptyFile)?;
    let count = page.read_i32(0);
    if count < 1 || count as usize > MAX_KEY_ATTRIBUTES {
        return Err(NodeError::InvalidAttributeCount(count));
    }
    let mut types = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let tag = page.read_i32(4 + 4 * i);
        types.push(KeyType::try_from(tag).map_err(NodeError::UnknownTypeTag)?);
    }
    KeySchema::new(types).map_err(|_| NodeError::InvalidAttributeCount(count))
}

fn check_length(bytes: &[u8]) -> Result<(), NodeError> {
    if bytes.is_empty() {
        return Err(NodeError::EmptyFile);
    }
    if bytes.len() % PAGE_SIZE != 0 {
        return Err(NodeError::Misaligned(bytes.len()));
    }
    Ok(())
}

/// Lays records out across pages, starting a fresh page whenever the next
/// record would not fit in the current one.
pub(super) struct PageWriter {
    pages: Vec<Page>,
    offset: usize,
    count_offset: usize,
    count: i32,
}

impl PageWriter {
    /// Start a file with the schema header on its first page.
    pub(super) fn new(schema: &KeySchema) -> Self {
        let mut first = Page::new();
        first.write_i32(0, schema.arity() as i32);
        for (i, key_type) in schema.types().iter().enumerate() {
            first.write_i32(4 + 4 * i, key_type.tag());
        }
        let count_offset = schema.header_len();
        Self {
            pages: vec![first],
            offset: count_offset + COUNT_SIZE,
            count_offset,
            count: 0,
        }
    }

    /// Append one record.
    pub(super) fn push_record(&mut self, record: &[u8]) {
        assert!(
            record.len() <= PAGE_SIZE - COUNT_SIZE,
            "record of {} bytes cannot fit in a page",
            record.len()
        );
        if self.offset + record.len() > PAGE_SIZE {
            self.seal();
            self.pages.push(Page::new());
            self.count_offset = 0;
            self.offset = COUNT_SIZE;
            self.count = 0;
        }
        if let Some(page) = self.pages.last_mut() {
            page.write_bytes(self.offset, record);
        }
        self.offset += record.len();
        self.count += 1;
    }

    fn seal(&mut self) {
        let (offset, count) = (self.count_offset, self.count);
        if let Some(page) = self.pages.last_mut() {
            page.write_i32(offset, count);
        }
    }

    /// Finish the last page and return the file contents.
    pub(super) fn finish(mut self) -> Vec<u8> {
        self.seal();
        pages_to_bytes(&self.pages)
    }
}

/// Walks the records of a node file in order.
pub(super) struct PageReader<'a> {
    bytes: &'a [u8],
    schema: &'a KeySchema,
    page_index: usize,
    page: Page,
    offset: usize,
    remaining: usize,
}

impl<'a> PageReader<'a> {
    pub(super) fn new(bytes: &'a [u8], schema: &'a KeySchema) -> Result<Self, NodeError> {
        check_length(bytes)?;
        let page = Page::from_slice(&bytes[..PAGE_SIZE]).ok_or(NodeError::EmptyFile)?;
        let mut reader = Self {
            bytes,
            schema,
            page_index: 0,
            page,
            offset: schema.header_len(),
            remaining: 0,
        };
        reader.remaining = reader.read_count()?;
        Ok(reader)
    }

    fn read_count(&mut self) -> Result<usize, NodeError> {
        let count = self.page.read_i32(self.offset);
        self.offset += COUNT_SIZE;
        if count < 0 {
            return Err(NodeError::InvalidRecordCount {
                page: self.page_index,
                count,
            });
        }
        Ok(count as usize)
    }

    /// Position at the start of the next record. Returns `false` once every
    /// page's records have been consumed.
    pub(super) fn next_record(&mut self) -> Result<bool, NodeError> {
        while self.remaining == 0 {
            let next = self.page_index + 1;
            let start = next * PAGE_SIZE;
            if start >= self.bytes.len() {
                return Ok(false);
            }
            self.page = Page::from_slice(&self.bytes[start..start + PAGE_SIZE])
                .ok_or(NodeError::Misaligned(self.bytes.len()))?;
            self.page_index = next;
            self.offset = 0;
            self.remaining = self.read_count()?;
        }
        self.remaining -= 1;
        Ok(true)
    }

    fn claim(&mut self, len: usize) -> Result<usize, NodeError> {
        if self.offset + len > PAGE_SIZE {
            return Err(NodeError::RecordOverrun {
                page: self.page_index,
            });
        }
        let at = self.offset;
        self.offset += len;
        Ok(at)
    }

    pub(super) fn read_i32(&mut self) -> Result<i32, NodeError> {
        let at = self.claim(4)?;
        Ok(self.page.read_i32(at))
    }

    /// Read one key laid out according to the schema.
    pub(super) fn read_key(&mut self) -> Result<Key, NodeError> {
        let mut attributes = Vec::with_capacity(self.schema.arity());
        for key_type in self.schema.types() {
            let attribute = match key_type {
                KeyType::Int64 => {
                    let at = self.claim(8)?;
                    TypedKey::Int64(self.page.read_i64(at))
                }
                KeyType::Float64 => {
                    let at = self.claim(8)?;
                    TypedKey::Float64(self.page.read_f64(at))
                }
                KeyType::Text => {
                    let at = self.claim(1)?;
                    let len = self.page.read_u8(at) as usize;
                    let at = self.claim(len)?;
                    let text = std::str::from_utf8(self.page.read_bytes(at, len)).map_err(|_| {
                        NodeError::InvalidText {
                            page: self.page_index,
                        }
                    })?;
                    TypedKey::Text(text.to_string())
                }
            };
            attributes.push(attribute);
        }
        Ok(Key::new(attributes))
    }
}
