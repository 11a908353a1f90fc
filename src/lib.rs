//! Trainer roster persistence for an in-browser tabletop session.
//!
//! Exports `handle_request(method, path, query, body)` for the Service Worker
//! bridge to call. Uses `matchit` for URL routing, the same router engine
//! that powers Axum. All responses are JSON strings.
//!
//! The roster itself (`roster::RosterManager`) is usable directly from Rust;
//! the request surface is a thin layer over one session-wide instance.

use wasm_bindgen::prelude::*;

pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod roster;
pub mod routes;
pub mod store;

/// Install the console logger and panic hook. Called once by the worker
/// before the first request.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn init() {
    console_error_panic_hook::set_once();
    // A second call (worker restart) finds a logger already set
    let _ = console_log::init_with_level(log::Level::Info);
    log::info!("Trainer roster worker ready");
}

/// Reopen the session roster with a JSON config override, e.g.
/// `{"rosterKey": "qa-trainers"}`. Unset fields keep their defaults.
#[wasm_bindgen]
pub fn configure(config_json: &str) {
    routes::roster::configure_session(config_json);
}

/// Process an HTTP-like request and return a JSON body.
///
/// Called from JavaScript (Web Worker) via wasm-bindgen.
///
/// # Arguments
/// * `method`: HTTP method ("GET" or "POST")
/// * `path`:   URL path (e.g., "/api/roster/slots")
/// * `query`:  Query string (e.g., "?trainer=0&slot=2")
/// * `body`:   URL-encoded form body. Empty string for GET requests.
#[wasm_bindgen]
pub fn handle_request(method: &str, path: &str, query: &str, body: &str) -> String {
    let mut router = matchit::Router::new();

    router.insert("/api/roster", "roster").ok();
    router.insert("/api/roster/active", "active").ok();
    router.insert("/api/roster/trainers", "trainers").ok();
    router.insert("/api/roster/slots", "slots").ok();
    router.insert("/api/roster/sheet", "sheet").ok();
    router.insert("/api/roster/export", "export").ok();
    router.insert("/api/roster/import", "import").ok();
    router.insert("/api/roster/gc", "gc").ok();

    match router.at(path) {
        Ok(matched) => match (*matched.value, method) {
            ("roster", "GET") => routes::roster::handle_roster_get(query),
            ("active", "GET") => routes::roster::handle_active_get(query),
            ("active", "POST") => routes::roster::handle_active_post(body),
            ("trainers", "POST") => routes::roster::handle_trainers_post(body),
            ("slots", "POST") => routes::roster::handle_slots_post(body),
            ("sheet", "GET") => routes::roster::handle_sheet_get(query),
            ("sheet", "POST") => routes::roster::handle_sheet_post(body),
            ("export", "GET") => routes::roster::handle_export_get(query),
            ("import", "POST") => routes::roster::handle_import_post(body),
            ("gc", "POST") => routes::roster::handle_gc_post(body),
            _ => method_not_allowed(),
        },
        Err(_) => not_found(),
    }
}

fn not_found() -> String {
    routes::util::json_error("404: route not found")
}

fn method_not_allowed() -> String {
    routes::util::json_error("405: method not allowed")
}
