//! Roster configuration: storage key names and new-record defaults.
//!
//! Hosts normally use `RosterConfig::default()`. Every field is optional when
//! deserialized, so a host can override just the keys (e.g. to namespace a
//! test profile) with `{"rosterKey": "qa-trainers"}`.

use serde::{Deserialize, Serialize};

/// Versioned multi-trainer roster key.
pub const ROSTER_KEY: &str = "pokemon-trainers-v3";
/// Legacy single-trainer key. Read during migration, never written.
pub const LEGACY_TRAINER_KEY: &str = "pokemon-trainer-data";
/// Sheet store key: one JSON object of compound key → sheet.
pub const SHEET_STORE_KEY: &str = "pokemon-sheets";
/// Version tag written into roster and export documents.
pub const FORMAT_VERSION: &str = "3.0";
/// Slots a freshly created trainer starts with.
pub const DEFAULT_SLOT_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RosterConfig {
    pub roster_key: String,
    pub legacy_trainer_key: String,
    pub sheet_store_key: String,
    pub initial_slots: usize,
    pub default_trainer_name: String,
    /// Category id that can never be removed from inventory or notes.
    pub default_category_id: String,
    pub default_category_name: String,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            roster_key: ROSTER_KEY.to_string(),
            legacy_trainer_key: LEGACY_TRAINER_KEY.to_string(),
            sheet_store_key: SHEET_STORE_KEY.to_string(),
            initial_slots: DEFAULT_SLOT_COUNT,
            default_trainer_name: "New Trainer".to_string(),
            default_category_id: "general".to_string(),
            default_category_name: "General".to_string(),
        }
    }
}

impl RosterConfig {
    /// Parse a host-supplied JSON override. Missing or invalid input falls
    /// back to defaults.
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str(json) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring invalid roster config: {}", e);
                Self::default()
            }
        }
    }
}
