//! Record store: the flat string-keyed storage primitive the roster sits on.
//!
//! In the browser this is `localStorage`; natively (and in tests) it is an
//! in-memory map. Values are JSON text. There are no transactions: each
//! `set` is an independent single-key write.
//!
//! The JSON helpers here implement the read/write failure policy shared by
//! every caller: unreadable or unparsable records are treated as absent, and
//! failed writes are logged and dropped.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

#[cfg(target_arch = "wasm32")]
mod local;
mod memory;

#[cfg(target_arch = "wasm32")]
pub use local::LocalStorage;
pub use memory::MemoryStore;

/// Minimal key-value contract: get, set and delete over string keys.
pub trait RecordStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&mut self, key: &str);

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Read and parse a JSON record. Missing or corrupt data yields `None`.
pub fn read_json<T: DeserializeOwned>(store: &dyn RecordStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring unreadable record `{}`: {}", key, e);
            None
        }
    }
}

/// Serialize and write a JSON record. Returns whether the write landed.
pub fn write_json<T: Serialize>(store: &mut dyn RecordStore, key: &str, value: &T) -> bool {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            log::warn!("Could not serialize `{}`: {}", key, e);
            return false;
        }
    };
    match store.set(key, &json) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Storage write failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn read_missing_key_is_none() {
        let store = MemoryStore::new();
        let value: Option<BTreeMap<String, i32>> = read_json(&store, "nope");
        assert!(value.is_none());
    }

    #[test]
    fn read_corrupt_record_is_none() {
        let mut store = MemoryStore::new();
        store.set("k", "not valid json {{{").unwrap();
        let value: Option<BTreeMap<String, i32>> = read_json(&store, "k");
        assert!(value.is_none());
    }

    #[test]
    fn write_then_read() {
        let mut store = MemoryStore::new();
        let data = BTreeMap::from([("hp".to_string(), 10)]);
        assert!(write_json(&mut store, "k", &data));
        let back: BTreeMap<String, i32> = read_json(&store, "k").unwrap();
        assert_eq!(back["hp"], 10);
    }

    #[test]
    fn rejected_write_reports_false() {
        let mut store = MemoryStore::with_quota(4);
        let data = BTreeMap::from([("hp".to_string(), 10)]);
        assert!(!write_json(&mut store, "k", &data));
        assert!(!store.contains("k"));
    }
}
