//! Local persistence: a key/value backend, the username registry and the
//! per-user item collection.

mod accounts;
mod items;
mod kv;

use platelog_types::PlatelogError;

pub use accounts::UserRegistry;
pub use items::{ItemQuery, ItemStore};
pub use kv::{JsonFileStore, KeyValueStore, MemoryStore};

pub const USERS_KEY: &str = "platelog:users";
pub const CURRENT_USER_KEY: &str = "platelog:current-user";

pub fn items_key(username: &str) -> String {
    format!("platelog:items:{username}")
}

pub fn store_error(message: impl Into<String>) -> PlatelogError {
    PlatelogError::Storage(message.into())
}
