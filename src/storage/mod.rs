//! Persistence contract for items.
//!
//! Implementations may block, so the HTTP layer calls them from tokio's
//! blocking pool. `create` must fail with [`StoreError::AlreadyExists`] when
//! the key is taken; clients rely on that to resend creates safely.

pub mod memory;

use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;

/// A stored key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub key: String,
    pub value: String,
}

/// One slice of items in insertion order plus the total count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub total: usize,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Key exists")]
    AlreadyExists,
    #[error("Key not found")]
    NotFound,
    #[error("Store backend failed: {0}")]
    Backend(String),
}

pub trait ItemStore: Send + Sync + 'static {
    fn create(&self, key: &str, value: &str) -> Result<Item, StoreError>;

    fn get(&self, key: &str) -> Result<Item, StoreError>;

    fn update(&self, key: &str, value: &str) -> Result<Item, StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Items `offset..offset + limit` in insertion order.
    fn list(&self, offset: usize, limit: usize) -> Result<Page, StoreError>;
}
