//! Data model: trainers, their creature slots, and creature sheets.
//!
//! Trainers and sheets are stored under separate keys. A slot points at its
//! sheet through `(trainer id, identity token)`; see `sheet::SheetKey`.

pub mod category;
pub mod lenient;
pub mod sheet;
pub mod slot;
pub mod trainer;

pub use category::{CategoryEntry, CategorySystem, Inventory, InventoryItem, Note, Notes};
pub use sheet::{SheetKey, SheetStore};
pub use slot::{CreatureSlot, SlotDisplay, SpeciesId};
pub use trainer::{CustomSkill, Trainer};
