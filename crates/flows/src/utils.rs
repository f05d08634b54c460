//! Shared utilities: the swappable UUID source and result slugs.
//!
//! The UUID generator is process-wide like the random source. Tests swap in
//! a sequential generator through a guard that restores the default on drop.

use once_cell::sync::Lazy;
use std::sync::Mutex;
use uuid::Uuid;

enum UuidMode {
    Random,
    Seeded { counter: u64 },
}

static UUID_SOURCE: Lazy<Mutex<UuidMode>> = Lazy::new(|| Mutex::new(UuidMode::Random));

// serializes seeded scopes so concurrent tests can't interleave sequences
static SWAP_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// A new UUID from the process generator.
pub fn new_uuid() -> Uuid {
    let mut mode = UUID_SOURCE.lock().expect("uuid source poisoned");
    match &mut *mode {
        UuidMode::Random => Uuid::new_v4(),
        UuidMode::Seeded { counter } => {
            *counter += 1;
            Uuid::from_u128(0x1ae96956_4b34_433e_8b1a_000000000000u128 + *counter as u128)
        }
    }
}

/// Swaps the process UUID generator for a deterministic sequence until the
/// guard drops. Scopes are mutually exclusive; never swap inside a resume.
#[must_use = "the sequence is only active while the guard lives"]
pub fn seeded_uuids() -> SeededUuids {
    let lock = SWAP_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    *UUID_SOURCE.lock().expect("uuid source poisoned") = UuidMode::Seeded { counter: 0 };
    SeededUuids { _lock: lock }
}

pub struct SeededUuids {
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl Drop for SeededUuids {
    fn drop(&mut self) {
        *UUID_SOURCE.lock().expect("uuid source poisoned") = UuidMode::Random;
    }
}

/// Slugifies a result name: lowercase with runs of non-alphanumerics
/// collapsed to a single underscore.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_collapse_and_trim() {
        assert_eq!(slugify("Favorite Color"), "favorite_color");
        assert_eq!(slugify("Rating  (1 - 5)"), "rating_1_5");
        assert_eq!(slugify("ok"), "ok");
    }

    #[test]
    fn seeded_uuids_are_sequential_and_restored() {
        let (a, b) = {
            let _guard = seeded_uuids();
            (new_uuid(), new_uuid())
        };
        assert_ne!(a, b);
        let (c, d) = {
            let _guard = seeded_uuids();
            (new_uuid(), new_uuid())
        };
        assert_eq!(a, c);
        assert_eq!(b, d);
    }
}
