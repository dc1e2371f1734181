//! Typed key attributes.
//!
//! Provides the `TypedKey` sum type and its `KeyType` discriminant, along with
//! the ordering and byte encoding the node codec relies on.

use std::cmp::Ordering;
use std::fmt;

use crate::constants::MAX_TEXT_LENGTH;

/// Attribute type tags as persisted in every node header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum KeyType {
    Int64 = 1,
    Text = 2,
    Float64 = 5,
}

impl TryFrom<i32> for KeyType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Int64),
            2 => Ok(Self::Text),
            5 => Ok(Self::Float64),
            _ => Err(value),
        }
    }
}

impl KeyType {
    /// The tag written to disk.
    #[must_use]
    pub const fn tag(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64 => write!(f, "int64"),
            Self::Text => write!(f, "text"),
            Self::Float64 => write!(f, "float64"),
        }
    }
}

/// A single key attribute.
///
/// Text values are limited to `MAX_TEXT_LENGTH` bytes on disk; the limit is
/// enforced by `KeySchema` validation rather than at construction.
#[derive(Debug, Clone)]
pub enum TypedKey {
    Int64(i64),
    Text(String),
    Float64(f64),
}

impl TypedKey {
    /// Get the type discriminant.
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        match self {
            Self::Int64(_) => KeyType::Int64,
            Self::Text(_) => KeyType::Text,
            Self::Float64(_) => KeyType::Float64,
        }
    }

    /// Number of bytes this attribute occupies in a key file.
    ///
    /// Numbers are a fixed 8 bytes; text is a length byte plus the raw bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Int64(_) | Self::Float64(_) => 8,
            Self::Text(s) => 1 + s.len(),
        }
    }

    /// Append the on-disk encoding to `buf`.
    ///
    /// # Panics
    /// Panics if a text value is longer than `MAX_TEXT_LENGTH`; callers
    /// validate keys against the schema first.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Int64(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Self::Float64(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Self::Text(s) => {
                let len = u8::try_from(s.len()).unwrap_or_else(|_| {
                    panic!("text attribute of {} bytes exceeds {MAX_TEXT_LENGTH}", s.len())
                });
                buf.push(len);
                buf.extend_from_slice(s.as_bytes());
            }
        }
    }
}

impl Ord for TypedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            // Mixed types never share a schema position; order by tag so the
            // relation stays total.
            _ => self.key_type().tag().cmp(&other.key_type().tag()),
        }
    }
}

impl PartialOrd for TypedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TypedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TypedKey {}

impl fmt::Display for TypedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v:?}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for TypedKey {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for TypedKey {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for TypedKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TypedKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_type_conversion() {
        assert_eq!(KeyType::try_from(1), Ok(KeyType::Int64));
        assert_eq!(KeyType::try_from(2), Ok(KeyType::Text));
        assert_eq!(KeyType::try_from(5), Ok(KeyType::Float64));
        assert_eq!(KeyType::try_from(3), Err(3));
        assert_eq!(KeyType::Float64.tag(), 5);
    }

    #[test]
    fn test_ordering_within_type() {
        assert!(TypedKey::Int64(-3) < TypedKey::Int64(2));
        assert!(TypedKey::Float64(1.5) < TypedKey::Float64(2.25));
        assert!(TypedKey::from("apple") < TypedKey::from("banana"));
        assert!(TypedKey::from("ab") < TypedKey::from("abc"));
        assert_eq!(TypedKey::Float64(0.5), TypedKey::Float64(0.5));
    }

    #[test]
    fn test_encoding_layout() {
        let mut buf = Vec::new();
        TypedKey::Int64(1).encode_into(&mut buf);
        assert_eq!(buf, vec![0, 0, 0, 0, 0, 0, 0, 1]);

        buf.clear();
        TypedKey::from("hey").encode_into(&mut buf);
        assert_eq!(buf, vec![3, b'h', b'e', b'y']);
        assert_eq!(TypedKey::from("hey").encoded_len(), 4);

        buf.clear();
        TypedKey::Float64(2.0).encode_into(&mut buf);
        assert_eq!(buf, 2.0f64.to_be_bytes().to_vec());
    }

    #[test]
    fn test_empty_text_encodes_length_only() {
        let mut buf = Vec::new();
        TypedKey::from("").encode_into(&mut buf);
        assert_eq!(buf, vec![0]);
    }
}
