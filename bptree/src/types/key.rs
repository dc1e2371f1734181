//! Composite keys and the key comparator.

use std::cmp::Ordering;
use std::fmt;

use crate::types::typed_key::TypedKey;

/// An ordered tuple of typed attributes.
///
/// Keys order lexicographically by attribute; on a shared prefix the shorter
/// tuple sorts first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key(Vec<TypedKey>);

impl Key {
    #[must_use]
    pub const fn new(attributes: Vec<TypedKey>) -> Self {
        Self(attributes)
    }

    #[must_use]
    pub fn attributes(&self) -> &[TypedKey] {
        &self.0
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Encoded width of the whole tuple in a key file.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.0.iter().map(TypedKey::encoded_len).sum()
    }

    /// Append every attribute's encoding to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        for attribute in &self.0 {
            attribute.encode_into(buf);
        }
    }

    /// Whether `self` has `prefix` as its leading attributes.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        compare_prefix(prefix, self) == Ordering::Equal
    }
}

impl From<Vec<TypedKey>> for Key {
    fn from(attributes: Vec<TypedKey>) -> Self {
        Self(attributes)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, attribute) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{attribute}")?;
        }
        write!(f, ")")
    }
}

/// Compare two keys attribute by attribute.
///
/// The first non-equal attribute decides; equal-length equal tuples are equal.
#[must_use]
pub fn compare_keys(a: &Key, b: &Key) -> Ordering {
    a.cmp(b)
}

/// Compare `key` against `prefix` using only the prefix's attributes.
///
/// Returns how `prefix` orders relative to the leading part of `key`, so
/// `Greater` means every key sharing the prefix sorts after `key`.
#[must_use]
pub fn compare_prefix(prefix: &Key, key: &Key) -> Ordering {
    for (p, k) in prefix.0.iter().zip(key.0.iter()) {
        match p.cmp(k) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    // A key shorter than the prefix sorts before everything that extends it.
    if key.0.len() < prefix.0.len() {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// Build a key from anything convertible into attributes.
///
/// ```
/// use bptree::key;
/// let k = key![7_i64, "seven"];
/// assert_eq!(k.arity(), 2);
/// ```
#[macro_export]
macro_rules! key {
    ($($attribute:expr),* $(,)?) => {
        $crate::types::Key::new(vec![$($crate::types::TypedKey::from($attribute)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;

    #[test]
    fn test_first_unequal_attribute_decides() {
        assert_eq!(compare_keys(&key![1_i64, "z"], &key![2_i64, "a"]), Ordering::Less);
        assert_eq!(
            compare_keys(&key![1_i64, "b"], &key![1_i64, "a"]),
            Ordering::Greater
        );
        assert_eq!(compare_keys(&key![1_i64, "a"], &key![1_i64, "a"]), Ordering::Equal);
    }

    #[test]
    fn test_shorter_tuple_sorts_first_on_shared_prefix() {
        assert_eq!(compare_keys(&key!["a"], &key!["a", 1_i64]), Ordering::Less);
    }

    #[test]
    fn test_compare_prefix() {
        let prefix = key!["b"];
        assert_eq!(compare_prefix(&prefix, &key!["a", 9_i64]), Ordering::Greater);
        assert_eq!(compare_prefix(&prefix, &key!["b", 1_i64]), Ordering::Equal);
        assert_eq!(compare_prefix(&prefix, &key!["b", 99_i64]), Ordering::Equal);
        assert_eq!(compare_prefix(&prefix, &key!["c", 0_i64]), Ordering::Less);
        assert!(key!["b", 3_i64].starts_with(&prefix));
        assert!(!key!["bb", 3_i64].starts_with(&prefix));
    }

    #[test]
    fn test_display() {
        assert_eq!(key![1_i64, "x", 2.5].to_string(), "(1, \"x\", 2.5)");
    }

    #[test]
    fn test_encoded_len_sums_attributes() {
        let k = key![1_i64, "abc", 0.5];
        assert_eq!(k.encoded_len(), 8 + 4 + 8);
        let mut buf = Vec::new();
        k.encode_into(&mut buf);
        assert_eq!(buf.len(), k.encoded_len());
    }
}
