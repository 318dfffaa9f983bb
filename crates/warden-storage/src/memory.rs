//! In-memory flag store backend.

use crate::{FlagStore, StorageResult};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory flag store.
///
/// Durable only for the lifetime of the process; used in tests and for
/// ephemeral sessions that must not leave state on disk.
#[derive(Default)]
pub struct MemoryFlagStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryFlagStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryFlagStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap();
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self.data.lock().unwrap();
        Ok(data.get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.lock().unwrap();
        Ok(data.remove(key).is_some())
    }
}
