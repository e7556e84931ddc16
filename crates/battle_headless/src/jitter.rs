//! Seeded spawn jitter.
//!
//! Batch runs nudge every placement a little so repeated battles of one
//! scenario are not identical. The generator is a plain LCG so a seed
//! reproduces the same rosters on every platform.

use battle_core::world::Placement;

/// Simple deterministic RNG for spawn jitter.
#[derive(Debug, Clone)]
pub struct SpawnRng {
    state: u64,
}

impl SpawnRng {
    /// Create new RNG from seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9E37_79B9_7F4A_7C15),
        }
    }

    /// Get next random value.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(0x5_DEEC_E66D).wrapping_add(11);
        // Low LCG bits cycle quickly.
        self.state >> 16
    }

    /// Get random int in range [min, max).
    pub fn next_range(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let range = (i64::from(max) - i64::from(min)) as u64;
        (i64::from(min) + (self.next() % range) as i64) as i32
    }

    /// Offset every placement by up to `amount` on each axis.
    pub fn jitter(&mut self, roster: &mut [Placement], amount: i32) {
        if amount <= 0 {
            return;
        }
        for (_, (x, y)) in roster.iter_mut() {
            *x += self.next_range(-amount, amount + 1);
            *y += self.next_range(-amount, amount + 1);
        }
    }
}

/// Derive the seed of the `index`-th battle in a batch.
#[must_use]
pub fn battle_seed(base: u64, index: usize) -> u64 {
    let mut rng = SpawnRng::new(base ^ (index as u64).wrapping_mul(0xA24B_AED4_963E_E407));
    rng.next()
}
