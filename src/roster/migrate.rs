//! Identity-key migration.
//!
//! Runs on every load and after every import. Each step first checks
//! whether there is work to do, so running it on migrated data changes
//! nothing. Per slot:
//!
//! 1. occupied but no token → mint one
//! 2. current key present   → drop the stale `{owner}_slot{n}` key, done
//! 3. position key present  → move it to the current key, stamped with the
//!    token, done
//! 4. species key present   → copy it to the current key (the species key
//!    stays; other trainers may still resolve through it)
//!
//! Position keys still left after that belong to no creature (an empty slot,
//! a slot past the end, an owner no longer in the roster) and are removed,
//! so a migrated store never classifies as V2 again.
//!
//! The pass only edits in-memory state. The caller writes the roster and
//! the sheet store once afterwards.

use crate::identity::IdSource;
use crate::model::sheet::tag_with_token;
use crate::model::{SheetKey, SheetStore, Trainer};

/// What one migration pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub tokens_minted: usize,
    pub sheets_copied: usize,
    pub stale_keys_removed: usize,
}

impl MigrationReport {
    pub fn roster_changed(&self) -> bool {
        self.tokens_minted > 0
    }

    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

pub fn migrate_to_identity_keys(
    trainers: &mut [Trainer],
    sheets: &mut SheetStore,
    ids: &mut dyn IdSource,
) -> MigrationReport {
    let mut report = MigrationReport::default();

    for trainer in trainers.iter_mut() {
        for slot in trainer.pokemon_slots.iter_mut() {
            let Some(species) = slot.pokemon_id.clone() else {
                continue;
            };
            let token = match &slot.pokemon_uuid {
                Some(token) => token.clone(),
                None => {
                    let token = ids.creature_token();
                    slot.pokemon_uuid = Some(token.clone());
                    report.tokens_minted += 1;
                    token
                }
            };

            let current = SheetKey::current(&trainer.id, &token);
            let by_position = SheetKey::slot_position(&trainer.id, slot.index);

            if sheets.contains(&current) {
                if sheets.remove(&by_position).is_some() {
                    report.stale_keys_removed += 1;
                }
                continue;
            }

            if let Some(sheet) = sheets.remove(&by_position) {
                sheets.put(&current, tag_with_token(sheet, &token));
                report.sheets_copied += 1;
                continue;
            }

            if let Some(sheet) = sheets.get(&SheetKey::species(&species)).cloned() {
                sheets.put(&current, sheet);
                report.sheets_copied += 1;
            }
        }
    }

    let unclaimed: Vec<SheetKey> = sheets
        .keys()
        .map(SheetKey::parse)
        .filter(|key| matches!(key, SheetKey::SlotPosition { .. }))
        .collect();
    for key in &unclaimed {
        log::debug!("Dropping unclaimed position-keyed sheet {}", key);
        sheets.remove(key);
    }
    report.stale_keys_removed += unclaimed.len();

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RosterConfig;
    use crate::identity::SeededIds;
    use crate::model::SpeciesId;
    use serde_json::json;

    fn trainer(id: &str) -> Trainer {
        Trainer::new(id.to_string(), 0, "T", &RosterConfig::default())
    }

    #[test]
    fn species_keyed_sheet_is_copied_and_kept() {
        let mut trainers = vec![trainer("T1")];
        trainers[0].pokemon_slots[0].pokemon_id = Some(SpeciesId::Number(1));
        let mut sheets = SheetStore::new();
        sheets.put(&SheetKey::species(1), json!({"hp": 5}));
        let mut ids = SeededIds::new(9);

        let report = migrate_to_identity_keys(&mut trainers, &mut sheets, &mut ids);

        let token = trainers[0].pokemon_slots[0].pokemon_uuid.clone().unwrap();
        let migrated = sheets.get(&SheetKey::current("T1", &token)).unwrap();
        assert_eq!(migrated, &json!({"hp": 5}));
        assert!(sheets.contains(&SheetKey::species(1)));
        assert_eq!(report.tokens_minted, 1);
        assert_eq!(report.sheets_copied, 1);
    }

    #[test]
    fn position_keyed_sheet_moves_to_identity_key() {
        let mut trainers = vec![trainer("T1")];
        trainers[0].pokemon_slots[2].pokemon_id = Some(SpeciesId::Number(4));
        let mut sheets = SheetStore::new();
        sheets.put(&SheetKey::slot_position("T1", 2), json!({"hp": 8}));
        let mut ids = SeededIds::new(9);

        migrate_to_identity_keys(&mut trainers, &mut sheets, &mut ids);

        let token = trainers[0].pokemon_slots[2].pokemon_uuid.clone().unwrap();
        let migrated = sheets.get(&SheetKey::current("T1", &token)).unwrap();
        assert_eq!(migrated["hp"], 8);
        assert_eq!(migrated["pokemonUuid"], token.as_str());
        assert!(!sheets.contains(&SheetKey::slot_position("T1", 2)));
    }

    #[test]
    fn position_key_wins_over_species_key() {
        let mut trainers = vec![trainer("T1")];
        trainers[0].pokemon_slots[0].pokemon_id = Some(SpeciesId::Number(4));
        let mut sheets = SheetStore::new();
        sheets.put(&SheetKey::slot_position("T1", 0), json!({"hp": 8}));
        sheets.put(&SheetKey::species(4), json!({"hp": 1}));
        let mut ids = SeededIds::new(9);

        migrate_to_identity_keys(&mut trainers, &mut sheets, &mut ids);

        let key = trainers[0].sheet_key(0).unwrap();
        assert_eq!(sheets.get(&key).unwrap()["hp"], 8);
    }

    #[test]
    fn stale_position_key_is_cleaned_up() {
        let mut trainers = vec![trainer("T1")];
        trainers[0].pokemon_slots[0].pokemon_id = Some(SpeciesId::Number(4));
        trainers[0].pokemon_slots[0].pokemon_uuid = Some("u1".to_string());
        let mut sheets = SheetStore::new();
        sheets.put(&SheetKey::current("T1", "u1"), json!({"hp": 9}));
        sheets.put(&SheetKey::slot_position("T1", 0), json!({"hp": 2}));
        let mut ids = SeededIds::new(9);

        let report = migrate_to_identity_keys(&mut trainers, &mut sheets, &mut ids);

        assert_eq!(report.stale_keys_removed, 1);
        assert_eq!(sheets.get(&SheetKey::current("T1", "u1")).unwrap()["hp"], 9);
        assert!(!sheets.contains(&SheetKey::slot_position("T1", 0)));
    }

    #[test]
    fn empty_slots_get_no_token_and_lose_position_keys() {
        let mut trainers = vec![trainer("T1")];
        let mut sheets = SheetStore::new();
        sheets.put(&SheetKey::slot_position("T1", 0), json!({"hp": 2}));
        sheets.put(&SheetKey::slot_position("T1", 9), json!({"hp": 3}));
        sheets.put(&SheetKey::slot_position("gone", 1), json!({"hp": 4}));
        sheets.put(&SheetKey::species(7), json!({"hp": 5}));
        let mut ids = SeededIds::new(9);

        let report = migrate_to_identity_keys(&mut trainers, &mut sheets, &mut ids);
        assert_eq!(report.stale_keys_removed, 3);
        assert_eq!(report.tokens_minted, 0);
        assert!(!report.roster_changed());
        assert!(trainers[0].pokemon_slots[0].pokemon_uuid.is_none());
        assert_eq!(sheets.keys().collect::<Vec<_>>(), vec!["7"]);
        assert!(migrate_to_identity_keys(&mut trainers, &mut sheets, &mut ids).is_noop());
    }

    #[test]
    fn second_pass_is_noop() {
        let mut trainers = vec![trainer("T1"), trainer("T2")];
        trainers[0].pokemon_slots[0].pokemon_id = Some(SpeciesId::Number(1));
        trainers[1].pokemon_slots[3].pokemon_id = Some(SpeciesId::Number(1));
        let mut sheets = SheetStore::new();
        sheets.put(&SheetKey::species(1), json!({"hp": 5}));
        sheets.put(&SheetKey::slot_position("T2", 3), json!({"hp": 7}));
        let mut ids = SeededIds::new(9);

        migrate_to_identity_keys(&mut trainers, &mut sheets, &mut ids);
        let trainers_after_first = trainers.clone();
        let sheets_after_first = sheets.as_map().clone();

        let report = migrate_to_identity_keys(&mut trainers, &mut sheets, &mut ids);
        assert!(report.is_noop());
        assert_eq!(trainers, trainers_after_first);
        assert_eq!(sheets.as_map(), &sheets_after_first);
    }
}
