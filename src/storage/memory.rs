//! In-process item store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::storage::{Item, ItemStore, Page, StoreError};

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    /// Insertion id → item, so listing is ordered by creation.
    rows: BTreeMap<u64, Item>,
    /// Unique key index.
    keys: HashMap<String, u64>,
}

/// Mutex-guarded map with a unique key index.
///
/// Existence check and insert happen under one lock, so two racing creates
/// of the same key store exactly one row.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("item store mutex poisoned").rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ItemStore for MemoryStore {
    fn create(&self, key: &str, value: &str) -> Result<Item, StoreError> {
        let mut inner = self.inner.lock().expect("item store mutex poisoned");
        if inner.keys.contains_key(key) {
            return Err(StoreError::AlreadyExists);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let item = Item {
            key: key.to_string(),
            value: value.to_string(),
        };
        inner.keys.insert(item.key.clone(), id);
        inner.rows.insert(id, item.clone());
        Ok(item)
    }

    fn get(&self, key: &str) -> Result<Item, StoreError> {
        let inner = self.inner.lock().expect("item store mutex poisoned");
        inner
            .keys
            .get(key)
            .and_then(|id| inner.rows.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn update(&self, key: &str, value: &str) -> Result<Item, StoreError> {
        let mut inner = self.inner.lock().expect("item store mutex poisoned");
        let id = *inner.keys.get(key).ok_or(StoreError::NotFound)?;
        let row = inner.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        row.value = value.to_string();
        Ok(row.clone())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("item store mutex poisoned");
        let id = inner.keys.remove(key).ok_or(StoreError::NotFound)?;
        inner.rows.remove(&id);
        Ok(())
    }

    fn list(&self, offset: usize, limit: usize) -> Result<Page, StoreError> {
        let inner = self.inner.lock().expect("item store mutex poisoned");
        Ok(Page {
            total: inner.rows.len(),
            items: inner.rows.values().skip(offset).take(limit).cloned().collect(),
        })
    }
}
