//! On-disk layout constants shared by the codec, the tree and the journal.

/// Size of one page of a node's key file, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Fan-out bound: non-root nodes hold between `ORDER` and `2 * ORDER` keys.
pub const DEFAULT_ORDER: usize = 100;

/// Name of the file holding a node's page-framed key list.
pub const KEY_FILE_NAME: &str = "keylist";

/// Name of the relocation journal kept in the root directory.
pub const JOURNAL_FILE_NAME: &str = "relocation.journal";

/// Longest text attribute, bounded by its one-byte length prefix.
pub const MAX_TEXT_LENGTH: usize = 255;

/// Staging directory for the right half of a non-root split.
pub const PENDING_DIR: &str = ".pending";

/// Staging directories for the two halves of a root split.
pub const ROOT_LEFT_DIR: &str = ".left";
pub const ROOT_RIGHT_DIR: &str = ".right";

/// Staging directory for the child being promoted during root collapse.
pub const COLLAPSE_DIR: &str = ".collapse";
