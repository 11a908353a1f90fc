//! On-disk schema generations and the loaders for each.
//!
//! | version | roster                           | sheet keys                  |
//! |---------|----------------------------------|-----------------------------|
//! | V1      | one trainer under the legacy key | `{speciesId}`               |
//! | V2      | versioned multi-trainer key      | `{ownerId}_slot{n}`         |
//! | V3      | versioned multi-trainer key      | `{ownerId}_pokemon_{token}` |
//!
//! `classify` looks only at which keys exist. The loaders turn whatever they
//! find into a `RosterDocument`; the migration pass does the rest.

use serde::{Deserialize, Serialize};

use crate::config::FORMAT_VERSION;
use crate::model::{SheetKey, Trainer, lenient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
    V3,
}

/// Decide which generation a store holds. `None` means nothing usable is
/// stored at all.
pub fn classify<'a>(
    has_roster: bool,
    has_legacy_trainer: bool,
    sheet_keys: impl IntoIterator<Item = &'a str>,
) -> Option<SchemaVersion> {
    if has_roster {
        let position_keyed = sheet_keys
            .into_iter()
            .any(|key| matches!(SheetKey::parse(key), SheetKey::SlotPosition { .. }));
        Some(if position_keyed {
            SchemaVersion::V2
        } else {
            SchemaVersion::V3
        })
    } else if has_legacy_trainer {
        Some(SchemaVersion::V1)
    } else {
        None
    }
}

/// Roster key payload. A trainer entry that is not a record at all is
/// skipped; every other oddity is absorbed field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterDocument {
    #[serde(default, alias = "activeOwnerIndex", deserialize_with = "lenient::index")]
    pub active_trainer_index: usize,
    #[serde(default, alias = "owners", deserialize_with = "lenient::list")]
    pub trainers: Vec<Trainer>,
    #[serde(default = "default_version", deserialize_with = "lenient::text")]
    pub version: String,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub timestamp: Option<String>,
}

fn default_version() -> String {
    FORMAT_VERSION.to_string()
}

/// Load a V2/V3 roster. An empty trainer list counts as no roster.
pub fn load_multi(document: Option<RosterDocument>) -> Option<RosterDocument> {
    document.filter(|doc| !doc.trainers.is_empty())
}

/// Wrap a V1 single trainer into a roster document.
pub fn load_single(trainer: Trainer) -> RosterDocument {
    RosterDocument {
        active_trainer_index: 0,
        trainers: vec![trainer],
        version: default_version(),
        timestamp: None,
    }
}
