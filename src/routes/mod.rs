//! Request handlers behind `handle_request`.

pub mod roster;
pub mod util;
