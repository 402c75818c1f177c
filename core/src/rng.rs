//! Deterministic random number generation.
//!
//! RULE: nothing in the engine may call a platform RNG. Every random draw
//! comes from a SimRng derived from an explicit seed, so a fixed seed
//! reproduces identical projections.
//!
//! Each consumer gets its own stream, seeded from (seed XOR slot constant),
//! so adding a new stream never shifts an existing one.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct SimRng {
    pub name: &'static str,
    inner:    Pcg64Mcg,
}

impl SimRng {
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name:  "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// Stable stream assignments. Append only; reordering changes every seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    OutcomeProjection = 0,
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OutcomeProjection => "outcome_projection",
        }
    }

    pub fn rng(self, seed: u64) -> SimRng {
        SimRng::new(seed, self as u64).with_name(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = StreamSlot::OutcomeProjection.rng(42);
        let mut b = StreamSlot::OutcomeProjection.rng(42);
        for _ in 0..100 {
            assert_eq!(a.next_f64().to_bits(), b.next_f64().to_bits());
        }
    }

    #[test]
    fn draws_stay_in_unit_interval() {
        let mut rng = SimRng::new(7, 3);
        for _ in 0..1000 {
            let x = rng.next_f64();
            assert!((0.0..1.0).contains(&x));
        }
        assert!(!rng.chance(0.0));
        assert!(rng.chance(1.0));
    }
}
