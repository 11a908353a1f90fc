//! In-memory record store for native builds and tests.

use std::collections::BTreeMap;

use super::RecordStore;
use crate::error::StoreError;

/// `BTreeMap`-backed store. Ordered, so snapshots compare byte-for-byte.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, String>,
    /// Max bytes for a single value, mimicking a browser quota error.
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose writes fail once a single value exceeds `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            quota: Some(bytes),
        }
    }

    /// Copy of every record, for before/after comparisons.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.records.clone()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.records.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(quota) = self.quota {
            if value.len() > quota {
                return Err(StoreError::WriteRejected {
                    key: key.to_string(),
                    reason: format!("{} bytes exceeds quota of {}", value.len(), quota),
                });
            }
        }
        self.records.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) {
        self.records.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let mut store = MemoryStore::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").as_deref(), Some("1"));
        store.delete("a");
        assert!(!store.contains("a"));
    }

    #[test]
    fn quota_rejects_large_values() {
        let mut store = MemoryStore::with_quota(3);
        assert!(store.set("a", "123").is_ok());
        assert!(store.set("b", "1234").is_err());
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["a"]);
    }
}
