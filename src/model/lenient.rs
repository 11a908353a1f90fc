//! Forgiving field deserializers for stored records.
//!
//! Stored data comes from older builds, other tools and hand-edited backups.
//! A field holding an unexpected type falls back to a default instead of
//! failing the whole record; one odd value must never make a roster
//! unreadable. Attributes the roster does not interpret are kept as raw
//! `Value`s and need none of this.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::model::slot::SpeciesId;

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Strings, with numbers and booleans taken as their text.
pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?).unwrap_or_default())
}

pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?))
}

/// A list of strings; non-scalar items are dropped.
pub fn text_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
        _ => Vec::new(),
    })
}

/// Non-negative positions: integers, whole floats or digit strings.
pub fn index<'de, D: Deserializer<'de>>(d: D) -> Result<usize, D::Error> {
    let value = Value::deserialize(d)?;
    let n = match &value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(n.and_then(|n| usize::try_from(n).ok()).unwrap_or(0))
}

pub fn species<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SpeciesId>, D::Error> {
    Ok(SpeciesId::from_value(&Value::deserialize(d)?))
}

/// Any structured field: unreadable content becomes `T::default()`.
pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(d)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        log::warn!("Replacing unreadable field with its default: {}", e);
        T::default()
    }))
}

/// A list whose unreadable items are skipped.
pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(items) = Value::deserialize(d)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(item) => Some(item),
            Err(e) => {
                log::warn!("Skipping unreadable list item: {}", e);
                None
            }
        })
        .collect())
}

/// A map of lists, read with `list` semantics per key. A non-object
/// becomes an empty map.
pub fn list_map<'de, D, T>(d: D) -> Result<BTreeMap<String, Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Object(map) = Value::deserialize(d)? else {
        return Ok(BTreeMap::new());
    };
    Ok(map
        .into_iter()
        .map(|(key, items)| {
            let items = list(items).unwrap_or_default();
            (key, items)
        })
        .collect())
}
