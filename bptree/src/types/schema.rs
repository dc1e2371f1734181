//! Key schema and key validation.
//!
//! Every node header records the schema so key files are self-describing.
//! The tree validates keys here before any mutation is attempted.

use std::fmt;

use crate::constants::{MAX_TEXT_LENGTH, PAGE_SIZE};
use crate::types::key::Key;
use crate::types::typed_key::{KeyType, TypedKey};

/// Widest encoded key: a leaf entry head (locator count plus key) must fit on
/// a page after that page's record count.
pub const MAX_KEY_WIDTH: usize = PAGE_SIZE - 8;

/// Most attributes a header can describe while leaving room for a record
/// count on the first page.
pub const MAX_KEY_ATTRIBUTES: usize = (PAGE_SIZE - 8) / 4;

/// Per-attribute types of every key in a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    types: Vec<KeyType>,
}

/// Reasons a key does not fit a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Keys need at least one attribute.
    Empty,
    /// More attributes than a header page can describe.
    TooManyAttributes(usize),
    /// Wrong number of attributes.
    ArityMismatch { expected: usize, actual: usize },
    /// Attribute type differs from the schema.
    TypeMismatch {
        position: usize,
        expected: KeyType,
        actual: KeyType,
    },
    /// Text attribute longer than its one-byte length prefix allows.
    TextTooLong { position: usize, len: usize },
    /// Key would not fit in a single page.
    KeyTooWide(usize),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "key has no attributes"),
            Self::TooManyAttributes(n) => {
                write!(f, "{n} attributes exceed the limit of {MAX_KEY_ATTRIBUTES}")
            }
            Self::ArityMismatch { expected, actual } => {
                write!(f, "expected {expected} attributes, got {actual}")
            }
            Self::TypeMismatch {
                position,
                expected,
                actual,
            } => write!(
                f,
                "attribute {position} has type {actual}, schema requires {expected}"
            ),
            Self::TextTooLong { position, len } => write!(
                f,
                "attribute {position} is {len} bytes, text is limited to {MAX_TEXT_LENGTH}"
            ),
            Self::KeyTooWide(width) => {
                write!(f, "key encodes to {width} bytes, limit is {MAX_KEY_WIDTH}")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

impl KeySchema {
    /// Create a schema from attribute types.
    pub fn new(types: Vec<KeyType>) -> Result<Self, SchemaError> {
        if types.is_empty() {
            return Err(SchemaError::Empty);
        }
        if types.len() > MAX_KEY_ATTRIBUTES {
            return Err(SchemaError::TooManyAttributes(types.len()));
        }
        Ok(Self { types })
    }

    /// Derive the schema from the attributes of a key.
    pub fn of_key(key: &Key) -> Result<Self, SchemaError> {
        let schema = Self::new(key.attributes().iter().map(TypedKey::key_type).collect())?;
        schema.validate_key(key)?;
        Ok(schema)
    }

    #[must_use]
    pub fn types(&self) -> &[KeyType] {
        &self.types
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn arity(&self) -> usize {
        self.types.len()
    }

    /// Size of the header on a node file's first page: attribute count plus
    /// one tag per attribute.
    #[must_use]
    pub fn header_len(&self) -> usize {
        4 + 4 * self.types.len()
    }

    /// Validate a full-arity key (insert, delete).
    pub fn validate_key(&self, key: &Key) -> Result<(), SchemaError> {
        if key.arity() != self.arity() {
            return Err(SchemaError::ArityMismatch {
                expected: self.arity(),
                actual: key.arity(),
            });
        }
        self.validate_attributes(key)
    }

    /// Validate a search probe: either a full key or a non-empty prefix.
    pub fn validate_probe(&self, key: &Key) -> Result<(), SchemaError> {
        if key.arity() == 0 || key.arity() > self.arity() {
            return Err(SchemaError::ArityMismatch {
                expected: self.arity(),
                actual: key.arity(),
            });
        }
        self.validate_attributes(key)
    }

    fn validate_attributes(&self, key: &Key) -> Result<(), SchemaError> {
        for (position, (attribute, expected)) in
            key.attributes().iter().zip(self.types.iter()).enumerate()
        {
            let actual = attribute.key_type();
            if actual != *expected {
                return Err(SchemaError::TypeMismatch {
                    position,
                    expected: *expected,
                    actual,
                });
            }
            if let TypedKey::Text(s) = attribute {
                if s.len() > MAX_TEXT_LENGTH {
                    return Err(SchemaError::TextTooLong {
                        position,
                        len: s.len(),
                    });
                }
            }
        }
        let width = key.encoded_len();
        if width > MAX_KEY_WIDTH {
            return Err(SchemaError::KeyTooWide(width));
        }
        Ok(())
    }
}
