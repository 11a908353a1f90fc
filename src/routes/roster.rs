//! `/api/roster/*` handlers.
//!
//! The roster lives in a `thread_local!` for the life of the worker, opened
//! lazily on the first request. In the browser it sits on `localStorage`;
//! natively it sits on an in-memory store, so each test thread gets its own.
//!
//! Every handler returns a JSON string. Refused mutations and errors come
//! back as `{"error": "..."}`.

use std::cell::RefCell;

use serde_json::{Value, json};

use super::util::{get_param, get_usize, json_error, json_ok, parse_form_body, parse_query};
use crate::config::RosterConfig;
use crate::error::RosterError;
use crate::identity::{RandomIds, SystemClock};
use crate::model::{SlotDisplay, SpeciesId};
use crate::roster::RosterManager;
use crate::roster::transfer::{ImportMode, decode_backup, encode_backup};

#[cfg(target_arch = "wasm32")]
pub type SessionStore = crate::store::LocalStorage;
#[cfg(not(target_arch = "wasm32"))]
pub type SessionStore = crate::store::MemoryStore;

thread_local! {
    static ROSTER: RefCell<Option<RosterManager<SessionStore>>> = const { RefCell::new(None) };
}

fn open_session() -> RosterManager<SessionStore> {
    RosterManager::open(SessionStore::default())
}

/// Execute a closure with mutable access to the session roster.
pub fn with_roster<F, R>(f: F) -> R
where
    F: FnOnce(&mut RosterManager<SessionStore>) -> R,
{
    ROSTER.with(|cell| {
        let mut session = cell.borrow_mut();
        f(session.get_or_insert_with(open_session))
    })
}

/// Replace the session roster (tests, or a host that builds its own).
pub fn replace_session(roster: RosterManager<SessionStore>) {
    ROSTER.with(|cell| {
        *cell.borrow_mut() = Some(roster);
    });
}

/// Reopen the session with a host-supplied config, e.g. storage keys
/// namespaced for a test profile. Invalid JSON falls back to defaults.
pub fn configure_session(config_json: &str) {
    let config = RosterConfig::from_json(config_json);
    log::info!("Opening roster session on key {}", config.roster_key);
    replace_session(RosterManager::new(
        SessionStore::default(),
        config,
        Box::new(RandomIds),
        Box::new(SystemClock),
    ));
}

/// Drop the session; the next request reloads from storage.
pub fn reset_session() {
    ROSTER.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

fn refused(what: &str) -> String {
    json_error(&format!("{} refused", what))
}

fn summary(roster: &RosterManager<SessionStore>) -> Value {
    let trainers: Vec<Value> = roster
        .trainers()
        .iter()
        .map(|t| {
            json!({
                "id": t.id,
                "index": t.index,
                "name": t.name,
                "slots": t.slot_count(),
                "creatures": t.occupied_slots().count(),
            })
        })
        .collect();
    json!({
        "activeTrainerIndex": roster.active_index(),
        "schema": roster.schema_version().map(|v| format!("{:?}", v)),
        "trainers": trainers,
    })
}

// ── Roster ─────────────────────────────────────────────────────────

/// GET /api/roster
pub fn handle_roster_get(_query: &str) -> String {
    with_roster(|roster| json_ok(&summary(roster)))
}

/// GET /api/roster/active
pub fn handle_active_get(_query: &str) -> String {
    with_roster(|roster| json_ok(roster.active_trainer()))
}

/// POST /api/roster/active (`index=N`)
pub fn handle_active_post(body: &str) -> String {
    let params = parse_form_body(body);
    let Some(index) = get_usize(&params, "index") else {
        return json_error("missing index");
    };
    with_roster(|roster| {
        if roster.switch_active(index) {
            json_ok(&summary(roster))
        } else {
            json_error(&RosterError::NoSuchTrainer(index).to_string())
        }
    })
}

/// POST /api/roster/trainers
///
/// `action=add&name=`, `action=remove&index=`, `action=duplicate&index=`,
/// `action=move&index=&to=`, `action=rename&index=&name=`
pub fn handle_trainers_post(body: &str) -> String {
    let params = parse_form_body(body);
    let index = get_usize(&params, "index");
    let to = get_usize(&params, "to");
    let name = get_param(&params, "name");

    with_roster(|roster| {
        let done = match (get_param(&params, "action"), index) {
            (Some("add"), _) => {
                roster.add_trainer(name);
                true
            }
            (Some("remove"), Some(i)) => roster.remove_trainer(i),
            (Some("duplicate"), Some(i)) => roster.duplicate_trainer(i).is_some(),
            (Some("move"), Some(i)) => to.is_some_and(|to| roster.move_trainer(i, to)),
            (Some("rename"), Some(i)) => name.is_some_and(|n| roster.rename_trainer(i, n)),
            (Some(_), None) => return json_error("missing index"),
            _ => return json_error("unknown action"),
        };
        if done {
            json_ok(&summary(roster))
        } else {
            refused("trainer change")
        }
    })
}

fn display_from(params: &[(String, String)]) -> SlotDisplay {
    let text = |key: &str| {
        get_param(params, key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    SlotDisplay {
        pokemon_name: text("name"),
        nickname: text("nickname"),
        sprite: text("sprite"),
        shiny_sprite: text("shinySprite"),
        types: get_param(params, "types")
            .map(|t| {
                t.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// POST /api/roster/slots
///
/// `trainer` defaults to the active trainer. Actions: `add`, `remove&slot=`,
/// `swap&slot=&to=`, `move&slot=&to=`, `clear&slot=`, `sync&slot=`,
/// `assign&slot=&species=&name=&nickname=&sprite=&shinySprite=&types=a,b`.
pub fn handle_slots_post(body: &str) -> String {
    let params = parse_form_body(body);
    let slot = get_usize(&params, "slot");
    let to = get_usize(&params, "to");

    with_roster(|roster| {
        let trainer = get_usize(&params, "trainer").unwrap_or(roster.active_index());
        if roster.trainer(trainer).is_none() {
            return json_error(&RosterError::NoSuchTrainer(trainer).to_string());
        }
        let done = match (get_param(&params, "action"), slot) {
            (Some("add"), _) => roster.add_slot(trainer).is_some(),
            (Some("remove"), Some(s)) => roster.remove_slot(trainer, s),
            (Some("swap"), Some(s)) => to.is_some_and(|to| roster.swap_slots(trainer, s, to)),
            (Some("move"), Some(s)) => to.is_some_and(|to| roster.move_slot(trainer, s, to)),
            (Some("clear"), Some(s)) => roster.clear_slot(trainer, s),
            (Some("sync"), Some(s)) => roster.sync_slot_from_sheet(trainer, s),
            (Some("assign"), Some(s)) => {
                let Some(species) = get_param(&params, "species").and_then(SpeciesId::parse) else {
                    return json_error("missing species");
                };
                roster
                    .assign_creature(trainer, s, species, display_from(&params))
                    .is_some()
            }
            (Some(_), None) => return json_error("missing slot"),
            _ => return json_error("unknown action"),
        };
        match (done, roster.trainer(trainer)) {
            (true, Some(t)) => json_ok(t),
            _ => refused("slot change"),
        }
    })
}

// ── Sheets ─────────────────────────────────────────────────────────

/// GET /api/roster/sheet?trainer=&slot=
pub fn handle_sheet_get(query: &str) -> String {
    let params = parse_query(query);
    let Some(slot) = get_usize(&params, "slot") else {
        return json_error("missing slot");
    };
    with_roster(|roster| {
        let trainer = get_usize(&params, "trainer").unwrap_or(roster.active_index());
        match roster.sheet(trainer, slot) {
            Some(sheet) => json_ok(sheet),
            None => json_error("no sheet for that slot"),
        }
    })
}

/// POST /api/roster/sheet (`trainer=&slot=&sheet=<json>`)
///
/// The sheet is authoritative, so the slot's display cache is refreshed
/// from it after saving.
pub fn handle_sheet_post(body: &str) -> String {
    let params = parse_form_body(body);
    let Some(slot) = get_usize(&params, "slot") else {
        return json_error("missing slot");
    };
    let sheet: Value = match get_param(&params, "sheet").map(serde_json::from_str) {
        Some(Ok(sheet @ Value::Object(_))) => sheet,
        Some(Ok(_)) => return json_error("sheet must be a JSON object"),
        Some(Err(e)) => return json_error(&RosterError::from(e).to_string()),
        None => return json_error("missing sheet"),
    };
    with_roster(|roster| {
        let trainer = get_usize(&params, "trainer").unwrap_or(roster.active_index());
        if !roster.save_sheet(trainer, slot, sheet) {
            return refused("sheet save");
        }
        roster.sync_slot_from_sheet(trainer, slot);
        match roster.sheet(trainer, slot) {
            Some(sheet) => json_ok(sheet),
            None => refused("sheet save"),
        }
    })
}

// ── Export / import / maintenance ──────────────────────────────────

/// GET /api/roster/export (`format=base64` for a text backup)
pub fn handle_export_get(query: &str) -> String {
    let params = parse_query(query);
    with_roster(|roster| {
        let document = roster.export_all();
        match get_param(&params, "format") {
            Some("base64") => match encode_backup(&document) {
                Ok(backup) => json_ok(&json!({ "backup": backup })),
                Err(e) => json_error(&e.to_string()),
            },
            _ => json_ok(&document),
        }
    })
}

/// POST /api/roster/import (`mode=replace|merge&data=<json or base64>`)
pub fn handle_import_post(body: &str) -> String {
    let params = parse_form_body(body);
    let mode = match get_param(&params, "mode") {
        None => ImportMode::default(),
        Some(raw) => match ImportMode::parse(raw) {
            Some(mode) => mode,
            None => return json_error("mode must be replace or merge"),
        },
    };
    let Some(data) = get_param(&params, "data") else {
        return json_error("missing data");
    };
    let value = match decode_backup(data) {
        Ok(value) => value,
        Err(e) => return json_error(&e.to_string()),
    };
    with_roster(|roster| match roster.import_all(value, mode) {
        Ok(summary) => json_ok(&summary),
        Err(e) => {
            log::warn!("Import rejected: {}", e);
            json_error(&e.to_string())
        }
    })
}

/// POST /api/roster/gc: run the identity migration, then sweep orphans.
pub fn handle_gc_post(_body: &str) -> String {
    with_roster(|roster| {
        let report = roster.migrate_all_to_uuid_format();
        let removed = roster.collect_orphaned_sheets();
        json_ok(&json!({
            "tokensMinted": report.tokens_minted,
            "sheetsCopied": report.sheets_copied,
            "staleKeysRemoved": report.stale_keys_removed,
            "orphansRemoved": removed,
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{FixedClock, SeededIds};
    use crate::store::{MemoryStore, RecordStore};

    fn reset() {
        replace_session(RosterManager::new(
            MemoryStore::new(),
            RosterConfig::default(),
            Box::new(SeededIds::new(5)),
            Box::new(FixedClock("2026-10-17T08:00:00Z".to_string())),
        ));
    }

    fn parse(body: &str) -> Value {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn roster_get_lists_trainers() {
        reset();
        let body = parse(&handle_roster_get(""));
        assert_eq!(body["activeTrainerIndex"], 0);
        assert_eq!(body["trainers"].as_array().unwrap().len(), 1);
        assert_eq!(body["trainers"][0]["slots"], 6);
    }

    #[test]
    fn lazy_session_opens_on_first_use() {
        reset_session();
        let body = parse(&handle_roster_get(""));
        assert_eq!(body["trainers"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn trainer_actions() {
        reset();
        let body = parse(&handle_trainers_post("action=add&name=Misty"));
        assert_eq!(body["trainers"][1]["name"], "Misty");

        let body = parse(&handle_trainers_post("action=duplicate&index=1"));
        assert_eq!(body["trainers"][2]["name"], "Misty (Copy)");

        let body = parse(&handle_trainers_post("action=rename&index=2&name=Brock"));
        assert_eq!(body["trainers"][2]["name"], "Brock");

        let body = parse(&handle_active_post("index=2"));
        assert_eq!(body["activeTrainerIndex"], 2);

        let body = parse(&handle_trainers_post("action=move&index=2&to=0"));
        assert_eq!(body["activeTrainerIndex"], 0);

        let body = parse(&handle_trainers_post("action=remove&index=1"));
        assert_eq!(body["trainers"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn refusals_are_errors() {
        reset();
        let body = parse(&handle_trainers_post("action=remove&index=0"));
        assert!(body["error"].is_string());
        let body = parse(&handle_trainers_post("action=remove"));
        assert_eq!(body["error"], "missing index");
        let body = parse(&handle_trainers_post("action=explode&index=0"));
        assert!(body["error"].is_string());
        let body = parse(&handle_active_post("index=7"));
        assert_eq!(body["error"], "no trainer at index 7");
    }

    #[test]
    fn assign_then_edit_sheet() {
        reset();
        let body = parse(&handle_slots_post(
            "action=assign&slot=1&species=25&name=Pikachu&types=Electric",
        ));
        assert_eq!(body["pokemonSlots"][1]["pokemonName"], "Pikachu");
        assert!(body["pokemonSlots"][1]["pokemonUuid"].is_string());

        let sheet = parse(&handle_sheet_get("?slot=1"));
        assert_eq!(sheet["pokemonId"], 25);

        let saved = parse(&handle_sheet_post(
            "slot=1&sheet=%7B%22pokemonName%22%3A%22Raichu%22%2C%22hp%22%3A30%7D",
        ));
        assert_eq!(saved["hp"], 30);
        let trainer = parse(&handle_active_get(""));
        assert_eq!(trainer["pokemonSlots"][1]["pokemonName"], "Raichu");
    }

    #[test]
    fn sheet_post_validates_input() {
        reset();
        assert_eq!(parse(&handle_sheet_post("sheet=%7B%7D"))["error"], "missing slot");
        assert_eq!(parse(&handle_sheet_post("slot=0&sheet=5"))["error"], "sheet must be a JSON object");
        assert!(parse(&handle_sheet_post("slot=0&sheet=%7B"))["error"].is_string());
        // empty slot has nowhere to keep a sheet
        assert!(parse(&handle_sheet_post("slot=0&sheet=%7B%7D"))["error"].is_string());
    }

    #[test]
    fn slot_reordering_keeps_tokens() {
        reset();
        let body = parse(&handle_slots_post("action=assign&slot=0&species=1&name=Bulbasaur"));
        let token = body["pokemonSlots"][0]["pokemonUuid"].clone();
        let body = parse(&handle_slots_post("action=swap&slot=0&to=3"));
        assert_eq!(body["pokemonSlots"][3]["pokemonUuid"], token);
        let body = parse(&handle_slots_post("action=move&slot=3&to=5"));
        assert_eq!(body["pokemonSlots"][5]["pokemonUuid"], token);
        assert_eq!(body["pokemonSlots"][5]["index"], 5);
        let body = parse(&handle_slots_post("action=clear&slot=5"));
        assert!(body["pokemonSlots"][5]["pokemonUuid"].is_null());
        let body = parse(&handle_slots_post("action=add"));
        assert_eq!(body["pokemonSlots"].as_array().unwrap().len(), 7);
        assert!(parse(&handle_slots_post("action=assign&slot=0"))["error"].is_string());
        assert!(parse(&handle_slots_post("action=swap&trainer=4&slot=0&to=1"))["error"].is_string());
    }

    #[test]
    fn export_import_through_routes() {
        reset();
        handle_slots_post("action=assign&slot=0&species=7&name=Squirtle");
        let exported = handle_export_get("");
        let backup = parse(&handle_export_get("?format=base64"));
        let backup = backup["backup"].as_str().unwrap().to_string();

        let body = format!("mode=merge&data={}", backup);
        let summary = parse(&handle_import_post(&body));
        assert_eq!(summary["trainersAdded"], 1);
        assert_eq!(summary["format"], "roster");

        let encoded: String = exported
            .bytes()
            .map(|b| format!("%{:02X}", b))
            .collect();
        let summary = parse(&handle_import_post(&format!("mode=replace&data={}", encoded)));
        assert_eq!(summary["replaced"], true);
        let roster = parse(&handle_roster_get(""));
        assert_eq!(roster["trainers"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn import_errors_are_reported() {
        reset();
        assert_eq!(parse(&handle_import_post("mode=merge"))["error"], "missing data");
        assert!(parse(&handle_import_post("mode=sideways&data=%7B%7D"))["error"].is_string());
        let body = parse(&handle_import_post("data=%7B%22garbage%22%3Atrue%7D"));
        assert!(body["error"].as_str().unwrap().starts_with("unrecognized import format"));
    }

    #[test]
    fn gc_reports_orphans() {
        reset();
        handle_slots_post("action=assign&slot=0&species=1&name=Bulbasaur");
        handle_slots_post("action=assign&slot=0&species=4&name=Charmander");
        let body = parse(&handle_gc_post(""));
        assert_eq!(body["orphansRemoved"].as_array().unwrap().len(), 1);
        assert_eq!(body["tokensMinted"], 0);
        let body = parse(&handle_gc_post(""));
        assert!(body["orphansRemoved"].as_array().unwrap().is_empty());
    }

    #[test]
    fn configured_session_uses_host_keys() {
        configure_session(r#"{"rosterKey": "qa-trainers", "initialSlots": 3}"#);
        with_roster(|roster| {
            assert_eq!(roster.config().roster_key, "qa-trainers");
            assert!(roster.store().contains("qa-trainers"));
            assert!(!roster.store().contains(crate::config::ROSTER_KEY));
        });
        let body = parse(&handle_roster_get(""));
        assert_eq!(body["trainers"][0]["slots"], 3);

        configure_session("not json");
        with_roster(|roster| assert_eq!(roster.config(), &RosterConfig::default()));
        reset_session();
    }
}
