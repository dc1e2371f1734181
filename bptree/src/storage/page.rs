//! Fixed-size pages of a node's key file.
//!
//! Key files are sequences of 4KB pages. All multi-byte values are stored
//! big-endian.

pub use crate::constants::PAGE_SIZE;

/// A raw page buffer.
#[derive(Clone)]
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Create a new zeroed page.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_SIZE]),
        }
    }

    /// Create a page from a slice of exactly `PAGE_SIZE` bytes.
    ///
    /// Returns `None` if the slice has the wrong length.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let data: Box<[u8; PAGE_SIZE]> = bytes.to_vec().into_boxed_slice().try_into().ok()?;
        Some(Self { data })
    }

    /// Get the raw page data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Read bytes at a specific offset.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Write bytes at a specific offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Read a u8 at the given offset.
    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    /// Read an i32 (big-endian) at the given offset.
    #[must_use]
    pub fn read_i32(&self, offset: usize) -> i32 {
        i32::from_be_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    /// Write an i32 (big-endian) at the given offset.
    pub fn write_i32(&mut self, offset: usize, value: i32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Read 8 raw bytes at the given offset.
    #[must_use]
    pub fn read_array8(&self, offset: usize) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[offset..offset + 8]);
        buf
    }

    /// Read an i64 (big-endian) at the given offset.
    #[must_use]
    pub fn read_i64(&self, offset: usize) -> i64 {
        i64::from_be_bytes(self.read_array8(offset))
    }

    /// Read an f64 (big-endian) at the given offset.
    #[must_use]
    pub fn read_f64(&self, offset: usize) -> f64 {
        f64::from_be_bytes(self.read_array8(offset))
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("first_16_bytes", &&self.data[..16])
            .finish_non_exhaustive()
    }
}

/// Concatenate pages into the bytes of a key file.
#[must_use]
pub fn pages_to_bytes(pages: &[Page]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pages.len() * PAGE_SIZE);
    for page in pages {
        bytes.extend_from_slice(page.as_bytes());
    }
    bytes
}
