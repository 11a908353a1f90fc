//! Export / import documents.
//!
//! Export always writes the full multi-trainer shape. Import accepts that
//! shape plus the older ones:
//!
//! ```text
//! { trainers, activeTrainerIndex, pokemonSheets, exportDate, version }   roster
//! { trainer, pokemonSheets? }                                          single trainer
//! { id, name, pokemonSlots | inventory | ... }                        single trainer, unwrapped
//! { pokemonId | id, name, ... }                                        one creature sheet
//! ```
//!
//! The shape is decided up front by `ImportPayload::detect`, before the
//! roster is touched. Backups can also travel as URL-safe base64 text, the
//! same encoding used for persisted player data.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RosterError;
use crate::identity::IdSource;
use crate::model::sheet::retag;
use crate::model::{SheetKey, SheetStore, SpeciesId, Trainer, lenient};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub trainers: Vec<Trainer>,
    #[serde(default, deserialize_with = "lenient::index")]
    pub active_trainer_index: usize,
    #[serde(default)]
    pub pokemon_sheets: BTreeMap<String, Value>,
    #[serde(default)]
    pub export_date: String,
    #[serde(default)]
    pub version: String,
}

/// Whether a multi-trainer import overwrites or appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    #[default]
    Replace,
    Merge,
}

impl ImportMode {
    pub fn parse(input: &str) -> Option<Self> {
        match input.to_lowercase().as_str() {
            "replace" => Some(ImportMode::Replace),
            "merge" => Some(ImportMode::Merge),
            _ => None,
        }
    }
}

/// A recognized import document.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportPayload {
    Roster(ExportDocument),
    SingleTrainer {
        trainer: Trainer,
        sheets: BTreeMap<String, Value>,
    },
    LegacyCreature {
        species: SpeciesId,
        sheet: Map<String, Value>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SingleTrainerDocument {
    trainer: Trainer,
    #[serde(default)]
    pokemon_sheets: BTreeMap<String, Value>,
}

impl ImportPayload {
    /// Work out which shape `value` is. Fails without side effects on
    /// anything unrecognized.
    pub fn detect(value: Value) -> Result<Self, RosterError> {
        let Value::Object(map) = value else {
            return Err(RosterError::UnrecognizedImport(
                "expected a JSON object".to_string(),
            ));
        };

        if map.get("trainers").is_some_and(Value::is_array) {
            let doc: ExportDocument = serde_json::from_value(Value::Object(map))?;
            if doc.trainers.is_empty() {
                return Err(RosterError::UnrecognizedImport(
                    "roster contains no trainers".to_string(),
                ));
            }
            return Ok(ImportPayload::Roster(doc));
        }

        if map.get("trainer").is_some_and(Value::is_object) {
            let doc: SingleTrainerDocument = serde_json::from_value(Value::Object(map))?;
            return Ok(ImportPayload::SingleTrainer {
                trainer: doc.trainer,
                sheets: doc.pokemon_sheets,
            });
        }

        // An unwrapped trainer, as stored under the legacy single-trainer key
        if looks_like_trainer(&map) {
            let trainer: Trainer = serde_json::from_value(Value::Object(map))?;
            return Ok(ImportPayload::SingleTrainer {
                trainer,
                sheets: BTreeMap::new(),
            });
        }

        let species = map
            .get("pokemonId")
            .or_else(|| map.get("id"))
            .and_then(SpeciesId::from_value);
        let named = map.get("name").is_some_and(Value::is_string)
            || map.get("pokemonName").is_some_and(Value::is_string);
        match species {
            Some(species) if named => Ok(ImportPayload::LegacyCreature { species, sheet: map }),
            _ => Err(RosterError::UnrecognizedImport(
                "expected `trainers`, `trainer`, or a creature with an id and name".to_string(),
            )),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ImportPayload::Roster(_) => "roster",
            ImportPayload::SingleTrainer { .. } => "single trainer",
            ImportPayload::LegacyCreature { .. } => "legacy creature",
        }
    }
}

/// Record-valued fields only a trainer carries. A creature sheet may have a
/// plain-text `notes` or its own `level`, so neither alone counts.
const TRAINER_RECORDS: [&str; 4] = ["inventory", "notes", "skillValues", "customSkills"];

fn looks_like_trainer(map: &Map<String, Value>) -> bool {
    if map.contains_key("pokemonId") {
        return false;
    }
    map.get("pokemonSlots").is_some_and(Value::is_array)
        || TRAINER_RECORDS
            .iter()
            .any(|field| map.get(*field).is_some_and(Value::is_object))
        || map.contains_key("money")
        || map
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| id.starts_with("trainer_"))
}

/// Parse import text: raw JSON, or base64-encoded JSON from `encode_backup`.
pub fn decode_backup(text: &str) -> Result<Value, RosterError> {
    let text = text.trim();
    if text.starts_with('{') || text.starts_with('[') {
        return Ok(serde_json::from_str(text)?);
    }
    let bytes = URL_SAFE_NO_PAD.decode(text)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn encode_backup(doc: &ExportDocument) -> Result<String, RosterError> {
    let json = serde_json::to_vec(doc)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

// ── Sheet relocation ───────────────────────────────────────────────

/// Give `trainer` a fresh id and fresh creature tokens, copying each
/// creature's sheet from `source` into `target` under the new keys.
///
/// The source sheet is looked up under the trainer's original identity key,
/// then its position key, then the species key. Source data is never
/// modified. Used by both duplication and merge-import, so a copied trainer
/// can never share a key with the original.
pub fn relocate_trainer(
    trainer: &mut Trainer,
    source: &BTreeMap<String, Value>,
    target: &mut SheetStore,
    ids: &mut dyn IdSource,
) -> usize {
    let old_id = std::mem::replace(&mut trainer.id, ids.trainer_id());
    let mut copied = 0;

    for slot in trainer.pokemon_slots.iter_mut() {
        let Some(species) = slot.pokemon_id.as_ref() else {
            slot.pokemon_uuid = None;
            continue;
        };

        let mut candidates = Vec::with_capacity(3);
        if let Some(token) = &slot.pokemon_uuid {
            candidates.push(SheetKey::current(&old_id, token));
        }
        candidates.push(SheetKey::slot_position(&old_id, slot.index));
        candidates.push(SheetKey::species(species));

        let new_token = ids.creature_token();
        let sheet = candidates
            .iter()
            .find_map(|key| source.get(&key.to_string()))
            .cloned();
        if let Some(sheet) = sheet {
            target.put(
                &SheetKey::current(&trainer.id, &new_token),
                retag(sheet, &new_token),
            );
            copied += 1;
        }
        slot.pokemon_uuid = Some(new_token);
    }

    copied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RosterConfig;
    use crate::identity::SeededIds;
    use serde_json::json;

    #[test]
    fn detects_roster_shape() {
        let payload = ImportPayload::detect(json!({
            "trainers": [{"id": "trainer_a", "name": "Ash"}],
            "activeTrainerIndex": 0,
            "pokemonSheets": {},
            "version": "3.0"
        }))
        .unwrap();
        assert!(matches!(payload, ImportPayload::Roster(ref doc) if doc.trainers.len() == 1));
    }

    #[test]
    fn detects_single_trainer_shape() {
        let payload = ImportPayload::detect(json!({"trainer": {"name": "Brock"}})).unwrap();
        match payload {
            ImportPayload::SingleTrainer { trainer, sheets } => {
                assert_eq!(trainer.name, "Brock");
                assert!(sheets.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn detects_legacy_creature() {
        let payload = ImportPayload::detect(json!({"id": 25, "name": "Pikachu", "hp": 20})).unwrap();
        assert_eq!(payload.describe(), "legacy creature");
    }

    #[test]
    fn detects_unwrapped_trainer() {
        let payload =
            ImportPayload::detect(json!({"id": "trainer_x", "name": "Misty", "pokemonSlots": []}))
                .unwrap();
        assert_eq!(payload.describe(), "single trainer");
    }

    #[test]
    fn detects_bare_trainer_without_slots() {
        let payload = ImportPayload::detect(json!({"id": "trainer_x", "name": "Misty"})).unwrap();
        match payload {
            ImportPayload::SingleTrainer { trainer, .. } => assert_eq!(trainer.name, "Misty"),
            other => panic!("unexpected {:?}", other),
        }
        let payload = ImportPayload::detect(json!({"id": 7, "name": "Brock", "inventory": {}})).unwrap();
        assert_eq!(payload.describe(), "single trainer");
        // a creature sheet with a level or text notes is still a creature
        let payload = ImportPayload::detect(
            json!({"id": 25, "name": "Pikachu", "level": 12, "notes": "caught at dawn"}),
        )
        .unwrap();
        assert_eq!(payload.describe(), "legacy creature");
    }

    #[test]
    fn rejects_empty_roster() {
        let result = ImportPayload::detect(json!({"trainers": []}));
        assert!(matches!(result, Err(RosterError::UnrecognizedImport(_))));
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(matches!(
            ImportPayload::detect(json!({"hello": "world"})),
            Err(RosterError::UnrecognizedImport(_))
        ));
        assert!(ImportPayload::detect(json!([1, 2, 3])).is_err());
        assert!(ImportPayload::detect(json!({"id": 25})).is_err());
    }

    #[test]
    fn malformed_roster_is_json_error() {
        let result = ImportPayload::detect(json!({"trainers": ["nope"]}));
        assert!(matches!(result, Err(RosterError::InvalidJson(_))));
    }

    #[test]
    fn backup_base64_round_trip() {
        let doc = ExportDocument {
            trainers: Vec::new(),
            active_trainer_index: 0,
            pokemon_sheets: BTreeMap::new(),
            export_date: "2026-01-01T00:00:00Z".to_string(),
            version: "3.0".to_string(),
        };
        let encoded = encode_backup(&doc).unwrap();
        assert!(!encoded.contains('{'));
        let decoded = decode_backup(&encoded).unwrap();
        assert_eq!(decoded["version"], "3.0");
        assert_eq!(decode_backup(r#" {"a": 1} "#).unwrap()["a"], 1);
        assert!(decode_backup("!!!").is_err());
    }

    #[test]
    fn relocate_mints_new_identities() {
        let mut trainer = Trainer::new("T1".to_string(), 0, "Ash", &RosterConfig::default());
        trainer.pokemon_slots[0].pokemon_id = Some(SpeciesId::Number(1));
        trainer.pokemon_slots[0].pokemon_uuid = Some("U1".to_string());
        trainer.pokemon_slots[1].pokemon_id = Some(SpeciesId::Number(2));
        let source = BTreeMap::from([
            ("T1_pokemon_U1".to_string(), json!({"hp": 10})),
            ("T1_slot1".to_string(), json!({"hp": 3})),
        ]);
        let mut target = SheetStore::new();
        let mut ids = SeededIds::new(3);

        let copied = relocate_trainer(&mut trainer, &source, &mut target, &mut ids);

        assert_eq!(copied, 2);
        assert_ne!(trainer.id, "T1");
        let first = trainer.sheet_key(0).unwrap();
        assert_ne!(trainer.pokemon_slots[0].pokemon_uuid.as_deref(), Some("U1"));
        assert_eq!(target.get(&first).unwrap()["hp"], 10);
        assert_eq!(target.get(&trainer.sheet_key(1).unwrap()).unwrap()["hp"], 3);
        assert!(trainer.pokemon_slots[2].pokemon_uuid.is_none());
    }
}
