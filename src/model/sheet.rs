//! Creature sheets and their compound storage keys.
//!
//! Sheets live in one JSON object under the sheet store key, separate from
//! the roster, so large sheets never ride along with roster writes. Three
//! key shapes exist:
//!
//! ```text
//! {ownerId}_pokemon_{token}   current, identity-addressed
//! {ownerId}_slot{n}           legacy, position-addressed (read + migrate)
//! {speciesId}                 oldest, species-addressed (read + migrate, never deleted)
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::store::{RecordStore, read_json, write_json};

const CURRENT_MARKER: &str = "_pokemon_";
const SLOT_MARKER: &str = "_slot";

/// Parsed sheet store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SheetKey {
    Current { owner_id: String, token: String },
    SlotPosition { owner_id: String, slot: usize },
    Species(String),
}

impl SheetKey {
    pub fn current(owner_id: &str, token: &str) -> Self {
        SheetKey::Current {
            owner_id: owner_id.to_string(),
            token: token.to_string(),
        }
    }

    pub fn slot_position(owner_id: &str, slot: usize) -> Self {
        SheetKey::SlotPosition {
            owner_id: owner_id.to_string(),
            slot,
        }
    }

    pub fn species(species: impl fmt::Display) -> Self {
        SheetKey::Species(species.to_string())
    }

    /// Classify a raw key. Anything that is not one of the owner-scoped
    /// shapes is treated as a species key.
    pub fn parse(raw: &str) -> Self {
        if let Some((owner_id, token)) = raw.split_once(CURRENT_MARKER) {
            if !owner_id.is_empty() && !token.is_empty() {
                return SheetKey::current(owner_id, token);
            }
        }
        if let Some((owner_id, slot)) = raw.rsplit_once(SLOT_MARKER) {
            if let Ok(slot) = slot.parse::<usize>() {
                if !owner_id.is_empty() {
                    return SheetKey::slot_position(owner_id, slot);
                }
            }
        }
        SheetKey::Species(raw.to_string())
    }

    pub fn owner_id(&self) -> Option<&str> {
        match self {
            SheetKey::Current { owner_id, .. } | SheetKey::SlotPosition { owner_id, .. } => {
                Some(owner_id.as_str())
            }
            SheetKey::Species(_) => None,
        }
    }
}

impl fmt::Display for SheetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetKey::Current { owner_id, token } => {
                write!(f, "{}{}{}", owner_id, CURRENT_MARKER, token)
            }
            SheetKey::SlotPosition { owner_id, slot } => {
                write!(f, "{}{}{}", owner_id, SLOT_MARKER, slot)
            }
            SheetKey::Species(id) => f.write_str(id),
        }
    }
}

/// Stamp the identity token into a sheet copied to a new key.
pub fn tag_with_token(mut sheet: Value, token: &str) -> Value {
    if let Value::Object(map) = &mut sheet {
        map.insert("pokemonUuid".to_string(), Value::String(token.to_string()));
    }
    sheet
}

/// Point a copied sheet's own `pokemonUuid` field (if it has one) at the
/// copy's token. Sheets without the field are copied verbatim.
pub fn retag(mut sheet: Value, token: &str) -> Value {
    if let Some(field) = sheet.get_mut("pokemonUuid") {
        *field = Value::String(token.to_string());
    }
    sheet
}

// ── Sheet store ────────────────────────────────────────────────────

/// In-memory view of the sheet store record.
///
/// Mutations mark the view dirty; `flush` writes the whole object back in
/// one store write. Callers batch several changes and flush once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetStore {
    sheets: BTreeMap<String, Value>,
    dirty: bool,
}

impl SheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the store. A missing or corrupt record is an empty store.
    pub fn load(store: &dyn RecordStore, key: &str) -> Self {
        Self {
            sheets: read_json(store, key).unwrap_or_default(),
            dirty: false,
        }
    }

    /// Write back if anything changed since the last load or flush.
    pub fn flush(&mut self, store: &mut dyn RecordStore, key: &str) -> bool {
        if !self.dirty {
            return true;
        }
        let ok = write_json(store, key, &self.sheets);
        if ok {
            self.dirty = false;
        }
        ok
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn get(&self, key: &SheetKey) -> Option<&Value> {
        self.sheets.get(&key.to_string())
    }

    pub fn contains(&self, key: &SheetKey) -> bool {
        self.sheets.contains_key(&key.to_string())
    }

    pub fn put(&mut self, key: &SheetKey, sheet: Value) {
        self.sheets.insert(key.to_string(), sheet);
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &SheetKey) -> Option<Value> {
        let removed = self.sheets.remove(&key.to_string());
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.sheets
    }

    /// Replace every sheet (import in replace mode).
    pub fn replace_all(&mut self, sheets: BTreeMap<String, Value>) {
        self.sheets = sheets;
        self.dirty = true;
    }
}
