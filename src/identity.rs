//! Identity and time sources, injected into the roster.
//!
//! Creature tokens are UUID-v4 shaped strings. Trainer ids are
//! `trainer_` + 12 hex digits. Both come from an `IdSource` so tests can
//! seed a deterministic PCG32 generator.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Mints identities for trainers and creatures.
pub trait IdSource {
    fn trainer_id(&mut self) -> String;
    fn creature_token(&mut self) -> String;
}

/// Thread RNG backed ids for live sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn trainer_id(&mut self) -> String {
        trainer_id_from(&mut rand::rng())
    }

    fn creature_token(&mut self) -> String {
        uuid_v4_from(&mut rand::rng())
    }
}

/// Deterministic ids for tests and reproducible fixtures.
#[derive(Debug, Clone)]
pub struct SeededIds {
    rng: Pcg32,
}

impl SeededIds {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
        }
    }
}

impl IdSource for SeededIds {
    fn trainer_id(&mut self) -> String {
        trainer_id_from(&mut self.rng)
    }

    fn creature_token(&mut self) -> String {
        uuid_v4_from(&mut self.rng)
    }
}

fn trainer_id_from<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("trainer_{:012x}", rng.random::<u64>() & 0xFFFF_FFFF_FFFF)
}

/// Format 128 random bits as a version-4, RFC 4122 variant UUID.
fn uuid_v4_from<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bits: u128 = rng.random();
    bits = (bits & !(0xFu128 << 76)) | (0x4u128 << 76);
    bits = (bits & !(0x3u128 << 62)) | (0x2u128 << 62);
    let hex = format!("{:032x}", bits);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

// ── Clock ──────────────────────────────────────────────────────────

/// ISO 8601 timestamps for roster and export documents.
pub trait Clock {
    fn now_iso(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(target_arch = "wasm32")]
    fn now_iso(&self) -> String {
        String::from(js_sys::Date::new_0().to_iso_string())
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now_iso(&self) -> String {
        use time::OffsetDateTime;
        use time::format_description::well_known::Rfc3339;
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn now_iso(&self) -> String {
        self.0.clone()
    }
}
