//! Node storage for the directory B+Tree.
//!
//! - `page`: fixed 4096-byte pages with big-endian accessors
//! - `io`: the `NodeStore` capability the tree reads and writes through
//! - `file`: `NodeStore` over the local filesystem
//! - `journal`: crash-safe application of multi-step relocations
//! - `btree`: the tree itself

pub mod btree;
pub mod file;
pub mod io;
pub mod journal;
pub mod page;

pub use btree::{BPlusTree, TreeError};
pub use file::DirectoryStore;
pub use io::{NodeStore, StorageError};
pub use journal::{JournalError, JournalOp};
pub use page::{PAGE_SIZE, Page, pages_to_bytes};
