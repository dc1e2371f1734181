//! Tuple locators stored in leaf entries.

use std::fmt;

/// Physical address of one tuple: the page it lives on and its slot.
///
/// Opaque to the tree; stored and returned in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Locator {
    pub page_id: i32,
    pub slot_id: i32,
}

impl Locator {
    /// Encoded size of one locator pair.
    pub const SIZE: usize = 8;

    #[must_use]
    pub const fn new(page_id: i32, slot_id: i32) -> Self {
        Self { page_id, slot_id }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.page_id, self.slot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Locator::new(3, 14).to_string(), "[3,14]");
    }
}
