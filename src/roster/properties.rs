//! Property tests: identity survives reordering, migration converges.

use proptest::prelude::*;
use serde_json::json;

use super::RosterManager;
use super::migrate::migrate_to_identity_keys;
use crate::config::RosterConfig;
use crate::identity::{FixedClock, SeededIds};
use crate::model::{SheetKey, SheetStore, SlotDisplay, SpeciesId, Trainer};
use crate::store::MemoryStore;

#[derive(Debug, Clone)]
enum SlotOp {
    Swap(usize, usize),
    Move(usize, usize),
}

fn slot_op() -> impl Strategy<Value = SlotOp> {
    prop_oneof![
        (0..6usize, 0..6usize).prop_map(|(a, b)| SlotOp::Swap(a, b)),
        (0..6usize, 0..6usize).prop_map(|(a, b)| SlotOp::Move(a, b)),
    ]
}

fn roster(seed: u64) -> RosterManager<MemoryStore> {
    RosterManager::new(
        MemoryStore::new(),
        RosterConfig::default(),
        Box::new(SeededIds::new(seed)),
        Box::new(FixedClock("2026-10-17T00:00:00Z".to_string())),
    )
}

proptest! {
    #[test]
    fn sheets_follow_creatures_through_reordering(
        seed in any::<u64>(),
        occupied in proptest::collection::vec(any::<bool>(), 6),
        ops in proptest::collection::vec(slot_op(), 0..20),
    ) {
        let mut roster = roster(seed);
        for (slot, filled) in occupied.iter().enumerate() {
            if *filled {
                roster.assign_creature(0, slot, SpeciesId::Number(slot as u64 + 1), SlotDisplay::default());
                roster.save_sheet(0, slot, json!({"marker": slot}));
            }
        }

        for op in ops {
            match op {
                SlotOp::Swap(a, b) => { roster.swap_slots(0, a, b); }
                SlotOp::Move(a, b) => { roster.move_slot(0, a, b); }
            }
        }

        let trainer = roster.active_trainer().clone();
        for (i, slot) in trainer.pokemon_slots.iter().enumerate() {
            prop_assert_eq!(slot.index, i);
            match &slot.pokemon_id {
                Some(SpeciesId::Number(n)) => {
                    let sheet = roster.sheet(0, i).expect("occupied slot has a sheet");
                    prop_assert_eq!(&sheet["marker"], &json!(*n - 1));
                }
                Some(other) => prop_assert!(false, "unexpected species {}", other),
                None => prop_assert!(slot.pokemon_uuid.is_none()),
            }
        }
    }

    #[test]
    fn migration_reaches_a_fixed_point(
        seed in any::<u64>(),
        species in proptest::collection::vec(proptest::option::of(1u64..5), 6),
        position_sheets in proptest::collection::vec(any::<bool>(), 6),
        species_sheets in proptest::collection::vec(any::<bool>(), 4),
    ) {
        let mut trainer = Trainer::new("T1".to_string(), 0, "Ash", &RosterConfig::default());
        let mut sheets = SheetStore::new();
        for (i, id) in species.iter().enumerate() {
            trainer.pokemon_slots[i].pokemon_id = id.map(SpeciesId::Number);
            if position_sheets[i] {
                sheets.put(&SheetKey::slot_position("T1", i), json!({"slot": i}));
            }
        }
        for (i, present) in species_sheets.iter().enumerate() {
            if *present {
                sheets.put(&SheetKey::species(i + 1), json!({"species": i + 1}));
            }
        }
        let mut trainers = vec![trainer];
        let mut ids = SeededIds::new(seed);

        migrate_to_identity_keys(&mut trainers, &mut sheets, &mut ids);
        let settled_trainers = trainers.clone();
        let settled_sheets = sheets.as_map().clone();

        let report = migrate_to_identity_keys(&mut trainers, &mut sheets, &mut ids);
        prop_assert!(report.is_noop());
        prop_assert_eq!(&trainers, &settled_trainers);
        prop_assert_eq!(sheets.as_map(), &settled_sheets);

        for slot in &trainers[0].pokemon_slots {
            prop_assert_eq!(slot.pokemon_id.is_some(), slot.pokemon_uuid.is_some());
        }
        prop_assert!(
            sheets
                .keys()
                .all(|key| !matches!(SheetKey::parse(key), SheetKey::SlotPosition { .. })),
            "a slot-position sheet key survived migration"
        );
    }
}
