use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// String key/value cache for slow-changing lookups (facet option lists).
/// Get-or-populate only: there is no invalidation here, and two callers
/// missing at once will both compute. Callers receive the client explicitly
/// rather than reaching for process-global state.
pub trait Cache {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
    }
}

/// Fetch a typed value from the cache, computing and storing it on a miss.
/// Entries that no longer decode (the shape changed between releases) are
/// recomputed rather than surfaced as errors.
pub fn get_or_cache<T, F>(cache: &dyn Cache, key: &str, compute: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    if let Some(raw) = cache.get(key) {
        if let Ok(value) = serde_json::from_str(&raw) {
            return Ok(value);
        }
    }
    let value = compute()?;
    cache.set(key, serde_json::to_string(&value)?);
    Ok(value)
}
