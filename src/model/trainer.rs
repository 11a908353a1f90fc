//! Trainer record: attributes, skills, creature slots, inventory and notes.
//!
//! Slot operations that end a creature's life (`clear_slot`, `remove_slot`)
//! take the sheet store and delete the sheet by identity token. Position is
//! never used to find a sheet here; only migration reads position keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::RosterConfig;
use crate::identity::IdSource;
use crate::model::category::{Inventory, Notes, move_within};
use crate::model::lenient;
use crate::model::sheet::{SheetKey, SheetStore};
use crate::model::slot::{CreatureSlot, SlotDisplay, SpeciesId};

/// A user-defined skill row. The value is whatever the sheet UI stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSkill {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default = "zero")]
    pub value: Value,
}

fn default_level() -> Value {
    Value::from(1)
}

fn zero() -> Value {
    Value::from(0)
}

/// Attributes the sheet UI edits freely (`level`, `money`, `wounds`, skill
/// values) are kept as raw JSON, so a stored `12.5` or `"7"` is carried
/// through as written rather than failing the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trainer {
    /// Assigned at creation, never reassigned. Empty only on legacy data
    /// that has not been normalized yet.
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::index")]
    pub index: usize,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default = "default_level")]
    pub level: Value,
    #[serde(default = "zero")]
    pub money: Value,
    #[serde(default = "zero")]
    pub wounds: Value,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub skill_values: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub custom_skills: BTreeMap<String, Vec<CustomSkill>>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub pokemon_slots: Vec<CreatureSlot>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub inventory: Inventory,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub notes: Notes,
    /// Stats, combat values and anything else the sheet UI stores.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trainer {
    pub fn new(id: String, index: usize, name: &str, config: &RosterConfig) -> Self {
        Self {
            id,
            index,
            name: name.to_string(),
            level: default_level(),
            money: zero(),
            wounds: zero(),
            skill_values: BTreeMap::new(),
            custom_skills: BTreeMap::new(),
            pokemon_slots: (0..config.initial_slots).map(CreatureSlot::empty).collect(),
            inventory: Inventory::with_default(
                &config.default_category_id,
                &config.default_category_name,
            ),
            notes: Notes::with_default(&config.default_category_id, &config.default_category_name),
            extra: Map::new(),
        }
    }

    /// Repair stored data: slot positions, the token invariant and both
    /// category systems. Returns whether anything changed.
    pub fn normalize(&mut self, config: &RosterConfig) -> bool {
        let mut changed = false;
        for (i, slot) in self.pokemon_slots.iter_mut().enumerate() {
            changed |= slot.normalize(i);
        }
        changed |= self
            .inventory
            .repair(&config.default_category_id, &config.default_category_name);
        changed |= self
            .notes
            .repair(&config.default_category_id, &config.default_category_name);
        changed
    }

    pub fn slot(&self, index: usize) -> Option<&CreatureSlot> {
        self.pokemon_slots.get(index)
    }

    pub fn slot_count(&self) -> usize {
        self.pokemon_slots.len()
    }

    /// Current-format sheet key of the creature in `slot`, if occupied.
    pub fn sheet_key(&self, slot: usize) -> Option<SheetKey> {
        let token = self.pokemon_slots.get(slot)?.pokemon_uuid.as_deref()?;
        Some(SheetKey::current(&self.id, token))
    }

    pub fn first_free_slot(&self) -> Option<usize> {
        self.pokemon_slots.iter().position(CreatureSlot::is_empty)
    }

    pub fn occupied_slots(&self) -> impl Iterator<Item = &CreatureSlot> {
        self.pokemon_slots.iter().filter(|s| !s.is_empty())
    }

    // ── Slot structure ─────────────────────────────────────────────

    /// Append an empty slot. Returns its index.
    pub fn add_slot(&mut self) -> usize {
        let index = self.pokemon_slots.len();
        self.pokemon_slots.push(CreatureSlot::empty(index));
        index
    }

    /// Remove a slot and its creature's sheet. Later slots shift down; only
    /// their positions change.
    pub fn remove_slot(&mut self, index: usize, sheets: &mut SheetStore) -> bool {
        if index >= self.pokemon_slots.len() {
            return false;
        }
        if let Some(key) = self.sheet_key(index) {
            sheets.remove(&key);
        }
        self.pokemon_slots.remove(index);
        self.renumber_slots(index);
        true
    }

    /// Exchange the creatures in two slots. Identity tokens travel with the
    /// creature; only the `index` fields stay put.
    pub fn swap_slots(&mut self, a: usize, b: usize) -> bool {
        let len = self.pokemon_slots.len();
        if a == b || a >= len || b >= len {
            return false;
        }
        let moved_to_a = self.pokemon_slots[b].at(a);
        let moved_to_b = self.pokemon_slots[a].at(b);
        self.pokemon_slots[a] = moved_to_a;
        self.pokemon_slots[b] = moved_to_b;
        true
    }

    /// Move a slot to another position, shifting those in between.
    pub fn move_slot(&mut self, from: usize, to: usize) -> bool {
        if !move_within(&mut self.pokemon_slots, from, to) {
            return false;
        }
        self.renumber_slots(from.min(to));
        true
    }

    fn renumber_slots(&mut self, start: usize) {
        for (i, slot) in self.pokemon_slots.iter_mut().enumerate().skip(start) {
            slot.index = i;
        }
    }

    // ── Slot contents ──────────────────────────────────────────────

    /// Put a creature of `species` into a slot and return its token.
    ///
    /// An empty slot, or one holding a different species, gets a new token:
    /// replacing the species makes a new creature. The previous creature's
    /// sheet is left in storage, unreferenced, until a sweep collects it.
    pub fn assign_creature(
        &mut self,
        index: usize,
        species: SpeciesId,
        display: SlotDisplay,
        ids: &mut dyn IdSource,
    ) -> Option<String> {
        let slot = self.pokemon_slots.get_mut(index)?;
        let same_creature = slot.pokemon_id.as_ref() == Some(&species) && slot.pokemon_uuid.is_some();
        if !same_creature {
            slot.pokemon_uuid = Some(ids.creature_token());
        }
        slot.pokemon_id = Some(species);
        slot.apply_display(display);
        slot.pokemon_uuid.clone()
    }

    /// Empty a slot and delete its sheet.
    pub fn clear_slot(&mut self, index: usize, sheets: &mut SheetStore) -> bool {
        if index >= self.pokemon_slots.len() {
            return false;
        }
        if let Some(key) = self.sheet_key(index) {
            sheets.remove(&key);
        }
        self.pokemon_slots[index] = CreatureSlot::empty(index);
        true
    }

    /// Refresh a slot's display cache from its sheet.
    pub fn sync_slot_from_sheet(&mut self, index: usize, sheets: &SheetStore) -> bool {
        let Some(key) = self.sheet_key(index) else {
            return false;
        };
        let Some(sheet) = sheets.get(&key) else {
            return false;
        };
        let display = SlotDisplay::from_sheet(sheet);
        self.pokemon_slots[index].apply_display(display);
        true
    }

    // ── Attributes ─────────────────────────────────────────────────

    /// Set a free-form attribute (`level`, `money`, `wounds` or any sheet
    /// field kept in `extra`). Fields with their own operations are refused.
    pub fn set_attribute(&mut self, key: &str, value: Value) -> bool {
        match key {
            "level" => self.level = value,
            "money" => self.money = value,
            "wounds" => self.wounds = value,
            "" | "id" | "index" | "name" | "skillValues" | "customSkills" | "pokemonSlots"
            | "inventory" | "notes" => return false,
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
        true
    }

    // ── Skills ─────────────────────────────────────────────────────

    pub fn set_skill(&mut self, name: &str, value: impl Into<Value>) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.skill_values.insert(name.to_string(), value.into());
        true
    }

    pub fn add_custom_skill(
        &mut self,
        category: &str,
        name: &str,
        value: impl Into<Value>,
    ) -> Option<usize> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let list = self.custom_skills.entry(category.to_string()).or_default();
        list.push(CustomSkill {
            name: name.to_string(),
            value: value.into(),
        });
        Some(list.len() - 1)
    }

    pub fn update_custom_skill(
        &mut self,
        category: &str,
        index: usize,
        name: &str,
        value: impl Into<Value>,
    ) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        match self
            .custom_skills
            .get_mut(category)
            .and_then(|list| list.get_mut(index))
        {
            Some(skill) => {
                skill.name = name.to_string();
                skill.value = value.into();
                true
            }
            None => false,
        }
    }

    pub fn remove_custom_skill(&mut self, category: &str, index: usize) -> Option<CustomSkill> {
        let list = self.custom_skills.get_mut(category)?;
        if index >= list.len() {
            return None;
        }
        Some(list.remove(index))
    }
}
