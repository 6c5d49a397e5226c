use crate::cache::traits::{CacheResult, ResponseCache};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process cache, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, digest: &str) -> CacheResult<Option<Value>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(digest).cloned())
    }

    fn put(&self, digest: &str, payload: &Value) -> CacheResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(digest.to_string(), payload.clone());
        Ok(())
    }
}
