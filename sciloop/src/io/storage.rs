//! Opaque storage handed to agents at initialization.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use serde_json::Value;

/// Key/value bookkeeping store. The loop never depends on what is stored.
pub trait Storage: Send + Sync {
    fn put(&self, key: &str, value: Value) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Value>>;
}

/// Process-local storage backed by a map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Storage for MemoryStorage {
    fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get() {
        let storage = MemoryStorage::new();
        storage.put("agents/x", json!({"ready": true})).expect("put");
        assert_eq!(
            storage.get("agents/x").expect("get"),
            Some(json!({"ready": true}))
        );
        assert_eq!(storage.get("missing").expect("get"), None);
        assert_eq!(storage.keys(), vec!["agents/x"]);
    }
}
