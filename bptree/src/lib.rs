// A B+Tree index whose nodes are directories:
// 1. Every node is a directory with a page-framed `keylist` file
// 2. Index nodes own numbered child directories `0 ..= N`
// 3. Leaves map composite keys to tuple locators
//
// Mutations:
//  - Compute the new nodes and directory moves in memory
//  - Record them as a plan in the relocation journal
//  - Apply the plan; a crash part way is finished on the next open
//
// System components:
//  - Key domain (`types`)
//  - Node storage and the journal (`storage`)
//  - The tree (`storage::btree`)
//  - Simulation harness (`simulation`)

pub mod config;
pub mod constants;
pub mod simulation;
pub mod storage;
#[cfg(test)]
mod testing;
pub mod types;

pub use config::{ConfigError, TreeConfig};
pub use storage::btree::{BPlusTree, NodeError, TreeError};
pub use storage::{DirectoryStore, NodeStore, StorageError};
pub use types::{Key, KeySchema, KeyType, Locator, SchemaError, TypedKey};
