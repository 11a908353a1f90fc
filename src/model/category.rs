//! Dynamic category systems used by a trainer's inventory and notes.
//!
//! ```text
//! CategorySystem
//! ├── categories     ["general", "berries", ...]    display order
//! ├── categoryNames  { "general": "General", ... }  id → label
//! └── entries        { "general": [entry, ...] }    id → ordered entries
//! ```
//!
//! Every id in `categories` has exactly one name and one entry list, and the
//! default category is never removed. The system remembers its default id
//! from `with_default` or `repair`; until one of those has run, no category
//! can be removed. All operations validate before
//! touching any field, so a refused call leaves the system unchanged.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::lenient;
use crate::model::trainer::Trainer;

/// One inventory line. `quantity` is kept as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default = "zero")]
    pub quantity: Value,
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn zero() -> Value {
    Value::from(0)
}

impl Default for InventoryItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            quantity: zero(),
            description: String::new(),
            extra: Map::new(),
        }
    }
}

/// One free-form note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The entry type of one category system.
pub trait CategoryEntry: Clone {
    fn system(trainer: &mut Trainer) -> &mut CategorySystem<Self>;
}

impl CategoryEntry for InventoryItem {
    fn system(trainer: &mut Trainer) -> &mut CategorySystem<Self> {
        &mut trainer.inventory
    }
}

impl CategoryEntry for Note {
    fn system(trainer: &mut Trainer) -> &mut CategorySystem<Self> {
        &mut trainer.notes
    }
}

pub type Inventory = CategorySystem<InventoryItem>;
pub type Notes = CategorySystem<Note>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "E: DeserializeOwned"))]
pub struct CategorySystem<E> {
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub categories: Vec<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub category_names: BTreeMap<String, String>,
    #[serde(default = "BTreeMap::new", deserialize_with = "lenient::list_map")]
    pub entries: BTreeMap<String, Vec<E>>,
    #[serde(skip)]
    default_id: String,
}

impl<E> Default for CategorySystem<E> {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            category_names: BTreeMap::new(),
            entries: BTreeMap::new(),
            default_id: String::new(),
        }
    }
}

// Equality is over stored content; the remembered default id is not stored.
impl<E: PartialEq> PartialEq for CategorySystem<E> {
    fn eq(&self, other: &Self) -> bool {
        self.categories == other.categories
            && self.category_names == other.category_names
            && self.entries == other.entries
    }
}

impl<E: Clone> CategorySystem<E> {
    /// A system holding only the default category.
    pub fn with_default(default_id: &str, default_name: &str) -> Self {
        let mut system = Self::default();
        system.default_id = default_id.to_string();
        system.categories.push(default_id.to_string());
        system
            .category_names
            .insert(default_id.to_string(), default_name.to_string());
        system.entries.insert(default_id.to_string(), Vec::new());
        system
    }

    /// Re-establish the id/name/entries invariant on stored data.
    /// Returns whether anything had to change.
    pub fn repair(&mut self, default_id: &str, default_name: &str) -> bool {
        self.default_id = default_id.to_string();
        let mut changed = false;

        let mut seen = Vec::with_capacity(self.categories.len());
        for id in self.categories.drain(..) {
            if seen.contains(&id) {
                changed = true;
            } else {
                seen.push(id);
            }
        }
        self.categories = seen;

        // Lists without a category id become categories at the end
        let orphan_lists: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !self.categories.contains(id))
            .cloned()
            .collect();
        if !orphan_lists.is_empty() {
            changed = true;
            self.categories.extend(orphan_lists);
        }

        if !self.categories.iter().any(|id| id == default_id) {
            self.categories.insert(0, default_id.to_string());
            self.category_names
                .entry(default_id.to_string())
                .or_insert_with(|| default_name.to_string());
            changed = true;
        }

        for id in &self.categories {
            if !self.category_names.contains_key(id) {
                self.category_names.insert(id.clone(), id.clone());
                changed = true;
            }
            if !self.entries.contains_key(id) {
                self.entries.insert(id.clone(), Vec::new());
                changed = true;
            }
        }

        let before = self.category_names.len();
        let categories = &self.categories;
        self.category_names.retain(|id, _| categories.contains(id));
        changed |= before != self.category_names.len();

        changed
    }

    /// Whether every id has one name and one list and nothing is dangling.
    pub fn is_consistent(&self) -> bool {
        self.categories.len() == self.category_names.len()
            && self.categories.len() == self.entries.len()
            && self
                .categories
                .iter()
                .all(|id| self.category_names.contains_key(id) && self.entries.contains_key(id))
    }

    /// The category that can never be removed. Empty until `with_default`
    /// or `repair` has run.
    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn has_category(&self, id: &str) -> bool {
        self.categories.iter().any(|c| c == id)
    }

    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.category_names.get(id).map(String::as_str)
    }

    pub fn entries_in(&self, id: &str) -> &[E] {
        self.entries.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    // ── Category operations ────────────────────────────────────────

    /// Add a category labelled `name`. The id is a slug of the name, made
    /// unique with a numeric suffix. Returns the new id.
    pub fn add_category(&mut self, name: &str) -> Option<String> {
        let name = name.trim();
        let base = slugify(name);
        if base.is_empty() {
            return None;
        }
        let mut id = base.clone();
        let mut n = 2;
        while self.has_category(&id) {
            id = format!("{}_{}", base, n);
            n += 1;
        }
        self.categories.push(id.clone());
        self.category_names.insert(id.clone(), name.to_string());
        self.entries.insert(id.clone(), Vec::new());
        Some(id)
    }

    /// Remove a category. Its entries are appended to the default category
    /// when `move_to_default` is set, otherwise discarded. Refused for the
    /// default category, for the last remaining category, and on a system
    /// that does not know its default yet.
    pub fn remove_category(&mut self, id: &str, move_to_default: bool) -> bool {
        let default_id = self.default_id.clone();
        if default_id.is_empty()
            || id == default_id
            || self.categories.len() <= 1
            || !self.has_category(id)
        {
            return false;
        }
        if move_to_default && !self.has_category(&default_id) {
            return false;
        }
        self.categories.retain(|c| c != id);
        self.category_names.remove(id);
        let moved = self.entries.remove(id).unwrap_or_default();
        if move_to_default {
            self.entries.entry(default_id).or_default().extend(moved);
        }
        true
    }

    pub fn rename_category(&mut self, id: &str, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || !self.has_category(id) {
            return false;
        }
        self.category_names.insert(id.to_string(), name.to_string());
        true
    }

    /// Move the category at `from` to position `to`.
    pub fn reorder_categories(&mut self, from: usize, to: usize) -> bool {
        move_within(&mut self.categories, from, to)
    }

    // ── Entry operations ───────────────────────────────────────────

    /// Append an entry. Returns its position in the category.
    pub fn add_entry(&mut self, category: &str, entry: E) -> Option<usize> {
        let list = self.entries.get_mut(category)?;
        list.push(entry);
        Some(list.len() - 1)
    }

    pub fn remove_entry(&mut self, category: &str, index: usize) -> Option<E> {
        let list = self.entries.get_mut(category)?;
        if index >= list.len() {
            return None;
        }
        Some(list.remove(index))
    }

    pub fn update_entry(&mut self, category: &str, index: usize, entry: E) -> bool {
        match self.entries.get_mut(category).and_then(|list| list.get_mut(index)) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }

    pub fn reorder_entries(&mut self, category: &str, from: usize, to: usize) -> bool {
        match self.entries.get_mut(category) {
            Some(list) => move_within(list, from, to),
            None => false,
        }
    }
}

/// Move one element of a list; false when either index is out of range or
/// they are equal.
pub(crate) fn move_within<T>(list: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from == to || from >= list.len() || to >= list.len() {
        return false;
    }
    let item = list.remove(from);
    list.insert(to, item);
    true
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}
