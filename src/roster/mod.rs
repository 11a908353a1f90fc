//! Roster manager. Owns the trainer list, the active trainer and the
//! sheet store, and is the only writer of the roster key.
//!
//! ## Lifecycle
//!
//! - **Construct:** `RosterManager::new` loads, classifies the schema,
//!   repairs and migrates. Nothing is written unless something changed.
//! - **Mutate:** every successful structural change ends in
//!   `notify_change` (roster key) plus a sheet flush when sheets changed.
//! - **Refuse:** invalid indices and last-trainer removal return
//!   `false`/`None` before any field is touched.
//!
//! Storage reads never fail: corrupt records are treated as absent. Failed
//! writes are logged; the next successful write carries the change.

pub mod migrate;
pub mod schema;
pub mod transfer;

#[cfg(test)]
mod properties;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::{FORMAT_VERSION, RosterConfig};
use crate::error::RosterError;
use crate::identity::{Clock, IdSource, RandomIds, SystemClock};
use crate::model::category::move_within;
use crate::model::sheet::tag_with_token;
use crate::model::{
    CategoryEntry, CategorySystem, CustomSkill, SheetKey, SheetStore, SlotDisplay, SpeciesId,
    Trainer,
};
use crate::store::{RecordStore, read_json, write_json};

use migrate::{MigrationReport, migrate_to_identity_keys};
use schema::{RosterDocument, SchemaVersion};
use transfer::{ExportDocument, ImportMode, ImportPayload, relocate_trainer};

type ListObserver = Box<dyn FnMut(usize)>;
type SwitchObserver = Box<dyn FnMut(usize)>;

/// What an import did, for the caller's confirmation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub format: &'static str,
    pub replaced: bool,
    pub trainers_added: usize,
    /// Slot that received a legacy single-creature import.
    pub slot: Option<usize>,
}

pub struct RosterManager<S: RecordStore> {
    store: S,
    config: RosterConfig,
    ids: Box<dyn IdSource>,
    clock: Box<dyn Clock>,
    trainers: Vec<Trainer>,
    active: usize,
    sheets: SheetStore,
    schema: Option<SchemaVersion>,
    list_observers: Vec<ListObserver>,
    switch_observers: Vec<SwitchObserver>,
}

impl<S: RecordStore> RosterManager<S> {
    /// Build a manager over `store` and load whatever it holds.
    pub fn new(
        store: S,
        config: RosterConfig,
        ids: Box<dyn IdSource>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let mut roster = Self {
            store,
            config,
            ids,
            clock,
            trainers: Vec::new(),
            active: 0,
            sheets: SheetStore::new(),
            schema: None,
            list_observers: Vec::new(),
            switch_observers: Vec::new(),
        };
        roster.load();
        roster
    }

    /// Default config, random ids, system clock.
    pub fn open(store: S) -> Self {
        Self::new(
            store,
            RosterConfig::default(),
            Box::new(RandomIds),
            Box::new(SystemClock),
        )
    }

    // ── Load ───────────────────────────────────────────────────────

    /// (Re)load from storage. Never fails: with no usable data the roster
    /// starts with one empty trainer.
    pub fn load(&mut self) -> Option<SchemaVersion> {
        let roster = schema::load_multi(read_json(&self.store, &self.config.roster_key));
        let legacy: Option<Trainer> = if roster.is_none() {
            read_json(&self.store, &self.config.legacy_trainer_key)
        } else {
            None
        };
        self.sheets = SheetStore::load(&self.store, &self.config.sheet_store_key);

        let version = schema::classify(roster.is_some(), legacy.is_some(), self.sheets.keys());
        let loaded = match version {
            Some(SchemaVersion::V2 | SchemaVersion::V3) => roster,
            Some(SchemaVersion::V1) => legacy.map(schema::load_single),
            None => None,
        };
        let (document, mut roster_dirty) = match loaded {
            Some(document) => (document, version == Some(SchemaVersion::V1)),
            None => (self.fresh_document(), true),
        };

        self.schema = version;
        self.trainers = document.trainers;
        self.active = document.active_trainer_index;
        roster_dirty |= self.normalize();

        let report = migrate_to_identity_keys(&mut self.trainers, &mut self.sheets, self.ids.as_mut());
        roster_dirty |= report.roster_changed();
        log::info!(
            "Loaded roster: schema {:?}, {} trainer(s), {} sheet(s)",
            version,
            self.trainers.len(),
            self.sheets.len()
        );
        log_migration(&report);

        if roster_dirty {
            self.notify_change();
        }
        self.flush_sheets();
        version
    }

    fn fresh_document(&mut self) -> RosterDocument {
        let trainer = Trainer::new(
            self.ids.trainer_id(),
            0,
            &self.config.default_trainer_name,
            &self.config,
        );
        schema::load_single(trainer)
    }

    /// Repair ids, positions and category invariants; clamp the active
    /// index. Returns whether anything changed.
    fn normalize(&mut self) -> bool {
        let mut changed = false;
        if self.trainers.is_empty() {
            let document = self.fresh_document();
            self.trainers = document.trainers;
            changed = true;
        }
        for (i, trainer) in self.trainers.iter_mut().enumerate() {
            if trainer.id.is_empty() {
                trainer.id = self.ids.trainer_id();
                changed = true;
            }
            if trainer.index != i {
                trainer.index = i;
                changed = true;
            }
            changed |= trainer.normalize(&self.config);
        }
        if self.active >= self.trainers.len() {
            self.active = self.trainers.len() - 1;
            changed = true;
        }
        changed
    }

    // ── Persistence ────────────────────────────────────────────────

    /// Serialize the roster to the roster key. Sheets are not written here.
    pub fn notify_change(&mut self) -> bool {
        let document = RosterDocument {
            active_trainer_index: self.active,
            trainers: self.trainers.clone(),
            version: FORMAT_VERSION.to_string(),
            timestamp: Some(self.clock.now_iso()),
        };
        write_json(&mut self.store, &self.config.roster_key, &document)
    }

    fn flush_sheets(&mut self) -> bool {
        self.sheets
            .flush(&mut self.store, &self.config.sheet_store_key)
    }

    fn persist(&mut self) {
        self.notify_change();
        self.flush_sheets();
    }

    /// Detect-then-act identity migration; safe to call at any time.
    /// Writes the roster and sheet store at most once each.
    pub fn migrate_all_to_uuid_format(&mut self) -> MigrationReport {
        let report = migrate_to_identity_keys(&mut self.trainers, &mut self.sheets, self.ids.as_mut());
        log_migration(&report);
        if report.roster_changed() {
            self.notify_change();
        }
        self.flush_sheets();
        report
    }

    // ── Observers ──────────────────────────────────────────────────

    /// Called with the new trainer count after the list changes.
    pub fn on_list_changed(&mut self, observer: impl FnMut(usize) + 'static) {
        self.list_observers.push(Box::new(observer));
    }

    /// Called with the new active index after the active trainer changes.
    pub fn on_switch(&mut self, observer: impl FnMut(usize) + 'static) {
        self.switch_observers.push(Box::new(observer));
    }

    fn fire_list_changed(&mut self) {
        let count = self.trainers.len();
        for observer in self.list_observers.iter_mut() {
            observer(count);
        }
    }

    fn fire_switch(&mut self) {
        let active = self.active;
        for observer in self.switch_observers.iter_mut() {
            observer(active);
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_trainer(&self) -> &Trainer {
        &self.trainers[self.active]
    }

    pub fn trainers(&self) -> &[Trainer] {
        &self.trainers
    }

    pub fn trainer(&self, index: usize) -> Option<&Trainer> {
        self.trainers.get(index)
    }

    pub fn trainer_count(&self) -> usize {
        self.trainers.len()
    }

    pub fn sheets(&self) -> &SheetStore {
        &self.sheets
    }

    pub fn config(&self) -> &RosterConfig {
        &self.config
    }

    /// Schema generation found by the last load.
    pub fn schema_version(&self) -> Option<SchemaVersion> {
        self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Trainer list ───────────────────────────────────────────────

    pub fn switch_active(&mut self, index: usize) -> bool {
        if index >= self.trainers.len() {
            return false;
        }
        self.active = index;
        self.notify_change();
        self.fire_switch();
        true
    }

    /// Append a trainer with six empty slots. Returns its index.
    pub fn add_trainer(&mut self, name: Option<&str>) -> usize {
        let index = self.trainers.len();
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(self.config.default_trainer_name.as_str())
            .to_string();
        let trainer = Trainer::new(self.ids.trainer_id(), index, &name, &self.config);
        log::info!("Added trainer {} at {}", trainer.id, index);
        self.trainers.push(trainer);
        self.notify_change();
        self.fire_list_changed();
        index
    }

    /// Remove a trainer and every sheet it owns. The last trainer cannot be
    /// removed.
    pub fn remove_trainer(&mut self, index: usize) -> bool {
        if self.trainers.len() <= 1 || index >= self.trainers.len() {
            return false;
        }

        let removed = self.trainers.remove(index);
        for slot in removed.occupied_slots() {
            if let Some(token) = &slot.pokemon_uuid {
                self.sheets.remove(&SheetKey::current(&removed.id, token));
            }
        }
        // Orphans from species replacement and stale position keys
        let leftovers: Vec<SheetKey> = self
            .sheets
            .keys()
            .map(SheetKey::parse)
            .filter(|key| key.owner_id() == Some(removed.id.as_str()))
            .collect();
        for key in &leftovers {
            self.sheets.remove(key);
        }

        for (i, trainer) in self.trainers.iter_mut().enumerate().skip(index) {
            trainer.index = i;
        }
        if index < self.active {
            self.active -= 1;
        }
        self.active = self.active.min(self.trainers.len() - 1);

        log::info!("Removed trainer {} ({} sheet key(s) swept)", removed.id, leftovers.len());
        self.persist();
        self.fire_list_changed();
        self.fire_switch();
        true
    }

    /// Copy a trainer. Every creature in the copy gets a new token and its
    /// own copy of the sheet; the original's sheets are untouched.
    pub fn duplicate_trainer(&mut self, index: usize) -> Option<usize> {
        let mut copy = self.trainers.get(index)?.clone();
        let new_index = self.trainers.len();
        copy.index = new_index;
        copy.name = format!("{} (Copy)", copy.name);

        let source = self.sheets.as_map().clone();
        let copied = relocate_trainer(&mut copy, &source, &mut self.sheets, self.ids.as_mut());
        log::info!("Duplicated trainer {} as {} ({} sheet(s))", index, copy.id, copied);

        self.trainers.push(copy);
        self.persist();
        self.fire_list_changed();
        Some(new_index)
    }

    /// Reorder trainers. The active trainer stays active wherever it lands.
    pub fn move_trainer(&mut self, from: usize, to: usize) -> bool {
        let active_id = self.active_trainer().id.clone();
        if !move_within(&mut self.trainers, from, to) {
            return false;
        }
        for (i, trainer) in self.trainers.iter_mut().enumerate() {
            trainer.index = i;
        }
        self.active = self
            .trainers
            .iter()
            .position(|t| t.id == active_id)
            .unwrap_or(0);
        self.notify_change();
        self.fire_list_changed();
        true
    }

    pub fn rename_trainer(&mut self, index: usize, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.with_trainer_mut(index, |trainer, _, _| {
            trainer.name = name.to_string();
            Some(())
        })
        .is_some()
    }

    // ── Trainer edits ──────────────────────────────────────────────

    /// Run an edit against one trainer. The edit returns `None` to refuse;
    /// on `Some` the roster is persisted (and sheets, if touched).
    pub(crate) fn with_trainer_mut<R>(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut Trainer, &mut SheetStore, &mut dyn IdSource) -> Option<R>,
    ) -> Option<R> {
        let trainer = self.trainers.get_mut(index)?;
        let result = edit(trainer, &mut self.sheets, self.ids.as_mut())?;
        self.persist();
        Some(result)
    }

    pub fn add_slot(&mut self, trainer: usize) -> Option<usize> {
        self.with_trainer_mut(trainer, |t, _, _| Some(t.add_slot()))
    }

    pub fn remove_slot(&mut self, trainer: usize, slot: usize) -> bool {
        self.with_trainer_mut(trainer, |t, sheets, _| t.remove_slot(slot, sheets).then_some(()))
            .is_some()
    }

    pub fn swap_slots(&mut self, trainer: usize, a: usize, b: usize) -> bool {
        self.with_trainer_mut(trainer, |t, _, _| t.swap_slots(a, b).then_some(()))
            .is_some()
    }

    pub fn move_slot(&mut self, trainer: usize, from: usize, to: usize) -> bool {
        self.with_trainer_mut(trainer, |t, _, _| t.move_slot(from, to).then_some(()))
            .is_some()
    }

    pub fn clear_slot(&mut self, trainer: usize, slot: usize) -> bool {
        self.with_trainer_mut(trainer, |t, sheets, _| t.clear_slot(slot, sheets).then_some(()))
            .is_some()
    }

    /// Assign a creature and return its token. A creature new to this slot
    /// gets a starter sheet built from the display data.
    pub fn assign_creature(
        &mut self,
        trainer: usize,
        slot: usize,
        species: SpeciesId,
        display: SlotDisplay,
    ) -> Option<String> {
        self.with_trainer_mut(trainer, |t, sheets, ids| {
            let token = t.assign_creature(slot, species.clone(), display, ids)?;
            let key = SheetKey::current(&t.id, &token);
            if !sheets.contains(&key) {
                sheets.put(&key, starter_sheet(&species, &token, &t.pokemon_slots[slot].display()));
            }
            Some(token)
        })
    }

    pub fn sync_slot_from_sheet(&mut self, trainer: usize, slot: usize) -> bool {
        self.with_trainer_mut(trainer, |t, sheets, _| {
            t.sync_slot_from_sheet(slot, sheets).then_some(())
        })
        .is_some()
    }

    // ── Attributes and skills ──────────────────────────────────────

    pub fn set_attribute(&mut self, trainer: usize, key: &str, value: Value) -> bool {
        self.with_trainer_mut(trainer, |t, _, _| t.set_attribute(key, value).then_some(()))
            .is_some()
    }

    pub fn set_skill(&mut self, trainer: usize, name: &str, value: impl Into<Value>) -> bool {
        self.with_trainer_mut(trainer, |t, _, _| t.set_skill(name, value).then_some(()))
            .is_some()
    }

    pub fn add_custom_skill(
        &mut self,
        trainer: usize,
        category: &str,
        name: &str,
        value: impl Into<Value>,
    ) -> Option<usize> {
        self.with_trainer_mut(trainer, |t, _, _| t.add_custom_skill(category, name, value))
    }

    pub fn update_custom_skill(
        &mut self,
        trainer: usize,
        category: &str,
        index: usize,
        name: &str,
        value: impl Into<Value>,
    ) -> bool {
        self.with_trainer_mut(trainer, |t, _, _| {
            t.update_custom_skill(category, index, name, value).then_some(())
        })
        .is_some()
    }

    pub fn remove_custom_skill(
        &mut self,
        trainer: usize,
        category: &str,
        index: usize,
    ) -> Option<CustomSkill> {
        self.with_trainer_mut(trainer, |t, _, _| t.remove_custom_skill(category, index))
    }

    // ── Inventory and notes ────────────────────────────────────────
    //
    // `E` picks the system: `InventoryItem` for inventory, `Note` for notes.

    fn with_categories<E: CategoryEntry, R>(
        &mut self,
        trainer: usize,
        edit: impl FnOnce(&mut CategorySystem<E>) -> Option<R>,
    ) -> Option<R> {
        self.with_trainer_mut(trainer, |t, _, _| edit(E::system(t)))
    }

    pub fn add_category<E: CategoryEntry>(&mut self, trainer: usize, name: &str) -> Option<String> {
        self.with_categories::<E, _>(trainer, |c| c.add_category(name))
    }

    /// Remove a category. The default category is never removed.
    pub fn remove_category<E: CategoryEntry>(
        &mut self,
        trainer: usize,
        id: &str,
        move_to_default: bool,
    ) -> bool {
        self.with_categories::<E, _>(trainer, |c| c.remove_category(id, move_to_default).then_some(()))
            .is_some()
    }

    pub fn rename_category<E: CategoryEntry>(&mut self, trainer: usize, id: &str, name: &str) -> bool {
        self.with_categories::<E, _>(trainer, |c| c.rename_category(id, name).then_some(()))
            .is_some()
    }

    pub fn reorder_categories<E: CategoryEntry>(&mut self, trainer: usize, from: usize, to: usize) -> bool {
        self.with_categories::<E, _>(trainer, |c| c.reorder_categories(from, to).then_some(()))
            .is_some()
    }

    pub fn add_entry<E: CategoryEntry>(&mut self, trainer: usize, category: &str, entry: E) -> Option<usize> {
        self.with_categories::<E, _>(trainer, |c| c.add_entry(category, entry))
    }

    pub fn remove_entry<E: CategoryEntry>(
        &mut self,
        trainer: usize,
        category: &str,
        index: usize,
    ) -> Option<E> {
        self.with_categories::<E, _>(trainer, |c| c.remove_entry(category, index))
    }

    pub fn update_entry<E: CategoryEntry>(
        &mut self,
        trainer: usize,
        category: &str,
        index: usize,
        entry: E,
    ) -> bool {
        self.with_categories::<E, _>(trainer, |c| c.update_entry(category, index, entry).then_some(()))
            .is_some()
    }

    pub fn reorder_entries<E: CategoryEntry>(
        &mut self,
        trainer: usize,
        category: &str,
        from: usize,
        to: usize,
    ) -> bool {
        self.with_categories::<E, _>(trainer, |c| c.reorder_entries(category, from, to).then_some(()))
            .is_some()
    }

    // ── Sheets ─────────────────────────────────────────────────────

    pub fn sheet(&self, trainer: usize, slot: usize) -> Option<&Value> {
        let key = self.trainers.get(trainer)?.sheet_key(slot)?;
        self.sheets.get(&key)
    }

    /// Store a creature's sheet. Refused for empty slots.
    pub fn save_sheet(&mut self, trainer: usize, slot: usize, sheet: Value) -> bool {
        let Some(key) = self.trainers.get(trainer).and_then(|t| t.sheet_key(slot)) else {
            return false;
        };
        self.sheets.put(&key, sheet);
        self.flush_sheets()
    }

    /// Delete identity-keyed sheets no slot references any more (left
    /// behind by species replacement). Legacy keys are never touched.
    /// Returns the removed keys.
    pub fn collect_orphaned_sheets(&mut self) -> Vec<String> {
        let live: BTreeSet<String> = self
            .trainers
            .iter()
            .flat_map(|t| {
                t.occupied_slots()
                    .filter_map(|s| s.pokemon_uuid.as_deref())
                    .map(|token| SheetKey::current(&t.id, token).to_string())
            })
            .collect();
        let orphans: Vec<String> = self
            .sheets
            .keys()
            .filter(|key| matches!(SheetKey::parse(key), SheetKey::Current { .. }))
            .filter(|key| !live.contains(*key))
            .map(str::to_string)
            .collect();
        for key in &orphans {
            self.sheets.remove(&SheetKey::parse(key));
        }
        if !orphans.is_empty() {
            log::info!("Collected {} orphaned sheet(s)", orphans.len());
            self.flush_sheets();
        }
        orphans
    }

    // ── Export / import ────────────────────────────────────────────

    pub fn export_all(&self) -> ExportDocument {
        ExportDocument {
            trainers: self.trainers.clone(),
            active_trainer_index: self.active,
            pokemon_sheets: self.sheets.as_map().clone(),
            export_date: self.clock.now_iso(),
            version: FORMAT_VERSION.to_string(),
        }
    }

    /// Import a document in any accepted shape. The shape is validated
    /// before anything changes; migration runs afterwards.
    pub fn import_all(&mut self, data: Value, mode: ImportMode) -> Result<ImportSummary, RosterError> {
        let payload = ImportPayload::detect(data)?;
        let format = payload.describe();
        let mut summary = ImportSummary {
            format,
            replaced: false,
            trainers_added: 0,
            slot: None,
        };

        match payload {
            ImportPayload::Roster(document) => match mode {
                ImportMode::Replace => {
                    summary.trainers_added = document.trainers.len();
                    summary.replaced = true;
                    self.trainers = document.trainers;
                    self.active = document.active_trainer_index;
                    self.sheets.replace_all(document.pokemon_sheets);
                }
                ImportMode::Merge => {
                    for trainer in document.trainers {
                        self.append_relocated(trainer, &document.pokemon_sheets);
                        summary.trainers_added += 1;
                    }
                }
            },
            ImportPayload::SingleTrainer { trainer, sheets } => {
                self.append_relocated(trainer, &sheets);
                summary.trainers_added = 1;
            }
            ImportPayload::LegacyCreature { species, sheet } => {
                summary.slot = Some(self.import_creature(species, sheet));
            }
        }

        self.normalize();
        let report = migrate_to_identity_keys(&mut self.trainers, &mut self.sheets, self.ids.as_mut());
        log_migration(&report);
        log::info!(
            "Imported {} ({:?}): {} trainer(s) added",
            format,
            mode,
            summary.trainers_added
        );

        self.persist();
        self.fire_list_changed();
        if summary.replaced {
            self.fire_switch();
        }
        Ok(summary)
    }

    fn append_relocated(&mut self, mut trainer: Trainer, source: &BTreeMap<String, Value>) {
        trainer.index = self.trainers.len();
        // Stored data may not carry positions yet; the position-key lookup needs them
        for (i, slot) in trainer.pokemon_slots.iter_mut().enumerate() {
            slot.index = i;
        }
        relocate_trainer(&mut trainer, source, &mut self.sheets, self.ids.as_mut());
        self.trainers.push(trainer);
    }

    /// Place a single legacy creature into the active trainer's first free
    /// slot, adding a slot when all are taken.
    fn import_creature(&mut self, species: SpeciesId, sheet: Map<String, Value>) -> usize {
        let sheet = Value::Object(sheet);
        let display = SlotDisplay::from_sheet(&sheet);
        let trainer = &mut self.trainers[self.active];
        let slot = match trainer.first_free_slot() {
            Some(slot) => slot,
            None => trainer.add_slot(),
        };
        if let Some(token) = trainer.assign_creature(slot, species, display, self.ids.as_mut()) {
            let key = SheetKey::current(&trainer.id, &token);
            self.sheets.put(&key, tag_with_token(sheet, &token));
        }
        slot
    }
}

fn starter_sheet(species: &SpeciesId, token: &str, display: &SlotDisplay) -> Value {
    let mut sheet = serde_json::to_value(display).unwrap_or_else(|_| Value::Object(Map::new()));
    if let Value::Object(map) = &mut sheet {
        map.insert("pokemonId".to_string(), json!(species));
        map.insert("pokemonUuid".to_string(), json!(token));
    }
    sheet
}

fn log_migration(report: &MigrationReport) {
    if report.is_noop() {
        log::debug!("Identity migration: nothing to do");
    } else {
        log::info!(
            "Identity migration: {} token(s) minted, {} sheet(s) copied, {} stale key(s) removed",
            report.tokens_minted,
            report.sheets_copied,
            report.stale_keys_removed
        );
    }
}
