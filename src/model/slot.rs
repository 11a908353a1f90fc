//! Creature slots: fixed positions inside a trainer that reference at most
//! one creature.
//!
//! A slot carries the creature's identity token plus a small display cache
//! (name, nickname, sprites, types). The cache duplicates fields of the
//! creature's sheet; the sheet is the source of truth and
//! `SlotDisplay::from_sheet` is the one place that copies it over.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::model::lenient;

/// Species reference id. Older data stores it as a number, newer data may
/// use a string; both compare by their text form.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SpeciesId {
    Number(u64),
    Name(String),
}

impl SpeciesId {
    /// Read a species id out of a loose JSON value. Whole numbers (even as
    /// floats) are `Number`; any other number keeps its text as a `Name`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(match n.as_u64() {
                Some(id) => SpeciesId::Number(id),
                None => match n.as_f64() {
                    Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                        SpeciesId::Number(f as u64)
                    }
                    _ => SpeciesId::Name(n.to_string()),
                },
            }),
            Value::String(s) if !s.trim().is_empty() => Some(SpeciesId::Name(s.trim().to_string())),
            _ => None,
        }
    }

    /// Parse form input: digits become `Number`, anything else `Name`.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        Some(match input.parse::<u64>() {
            Ok(n) => SpeciesId::Number(n),
            Err(_) => SpeciesId::Name(input.to_string()),
        })
    }
}

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeciesId::Number(n) => write!(f, "{}", n),
            SpeciesId::Name(s) => f.write_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for SpeciesId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(d)?;
        SpeciesId::from_value(&value)
            .ok_or_else(|| D::Error::custom(format!("not a species id: {}", value)))
    }
}

impl PartialEq for SpeciesId {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for SpeciesId {}

impl Hash for SpeciesId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

/// Display metadata cached on a slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlotDisplay {
    pub pokemon_name: Option<String>,
    pub nickname: Option<String>,
    pub sprite: Option<String>,
    pub shiny_sprite: Option<String>,
    pub types: Vec<String>,
}

impl SlotDisplay {
    /// Pull the cached fields out of a sheet. Accepts both `pokemonName`
    /// and the older `name` field.
    pub fn from_sheet(sheet: &Value) -> Self {
        let text = |key: &str| {
            sheet
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let types = sheet
            .get("types")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            pokemon_name: text("pokemonName").or_else(|| text("name")),
            nickname: text("nickname"),
            sprite: text("sprite"),
            shiny_sprite: text("shinySprite"),
            types,
        }
    }
}

/// One position in a trainer's creature list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatureSlot {
    #[serde(default, deserialize_with = "lenient::index")]
    pub index: usize,
    #[serde(default, deserialize_with = "lenient::species")]
    pub pokemon_id: Option<SpeciesId>,
    /// Identity token. Null exactly when the slot is empty.
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub pokemon_uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub pokemon_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub nickname: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub sprite: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub shiny_sprite: Option<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub types: Vec<String>,
    /// Fields written by other tools that we carry through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CreatureSlot {
    pub fn empty(index: usize) -> Self {
        Self {
            index,
            pokemon_id: None,
            pokemon_uuid: None,
            pokemon_name: None,
            nickname: None,
            sprite: None,
            shiny_sprite: None,
            types: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pokemon_id.is_none()
    }

    /// The same creature at a different position.
    pub fn at(&self, index: usize) -> Self {
        Self {
            index,
            ..self.clone()
        }
    }

    pub fn display(&self) -> SlotDisplay {
        SlotDisplay {
            pokemon_name: self.pokemon_name.clone(),
            nickname: self.nickname.clone(),
            sprite: self.sprite.clone(),
            shiny_sprite: self.shiny_sprite.clone(),
            types: self.types.clone(),
        }
    }

    pub fn apply_display(&mut self, display: SlotDisplay) {
        self.pokemon_name = display.pokemon_name;
        self.nickname = display.nickname;
        self.sprite = display.sprite;
        self.shiny_sprite = display.shiny_sprite;
        self.types = display.types;
    }

    /// Restore the token/species invariant on data read from storage.
    /// A token without a species is dropped. Returns whether anything changed.
    pub fn normalize(&mut self, index: usize) -> bool {
        let mut changed = self.index != index;
        self.index = index;
        if self.pokemon_id.is_none() && self.pokemon_uuid.is_some() {
            self.pokemon_uuid = None;
            changed = true;
        }
        changed
    }
}
