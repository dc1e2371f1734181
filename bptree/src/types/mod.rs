//! Key domain consumed by the tree: typed attributes, composite keys, the
//! per-tree schema, and tuple locators.

mod key;
mod locator;
mod schema;
mod typed_key;

pub use key::{Key, compare_keys, compare_prefix};
pub use locator::Locator;
pub use schema::{KeySchema, MAX_KEY_ATTRIBUTES, MAX_KEY_WIDTH, SchemaError};
pub use typed_key::{KeyType, TypedKey};
