//! The process-wide random source.
//!
//! Shared by `rand()`/`rand_between()` and the random router. Tests swap in
//! a seeded source through a guard that restores the default on drop;
//! swapping must never happen inside a resume.

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::Mutex;

static SOURCE: Lazy<Mutex<StdRng>> = Lazy::new(|| Mutex::new(StdRng::from_entropy()));

// serializes seeded scopes so concurrent tests can't interleave draws
static SWAP_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// A uniform random decimal on [0, 1), at 18 decimal places.
pub fn random_decimal() -> Decimal {
    let n: u64 = SOURCE.lock().expect("random source poisoned").gen_range(0..1_000_000_000_000_000_000);
    Decimal::new(n as i64, 18)
}

/// A uniform random integer on [0, bound).
pub fn random_below(bound: u64) -> u64 {
    SOURCE.lock().expect("random source poisoned").gen_range(0..bound)
}

/// Swaps the process random source for a seeded one until the guard drops.
/// Scopes are mutually exclusive; never swap inside a resume.
#[must_use = "the seed is only active while the guard lives"]
pub fn seeded_scope(seed: u64) -> SeededScope {
    let lock = SWAP_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    *SOURCE.lock().expect("random source poisoned") = StdRng::seed_from_u64(seed);
    SeededScope { _lock: lock }
}

pub struct SeededScope {
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl Drop for SeededScope {
    fn drop(&mut self) {
        *SOURCE.lock().expect("random source poisoned") = StdRng::from_entropy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_source_is_deterministic() {
        let first = {
            let _guard = seeded_scope(1234);
            (random_decimal(), random_below(10), random_decimal())
        };
        let second = {
            let _guard = seeded_scope(1234);
            (random_decimal(), random_below(10), random_decimal())
        };
        assert_eq!(first, second);
    }

    #[test]
    fn decimals_stay_in_unit_interval() {
        let _guard = seeded_scope(99);
        for _ in 0..100 {
            let d = random_decimal();
            assert!(d >= Decimal::ZERO && d < Decimal::ONE);
        }
    }
}
