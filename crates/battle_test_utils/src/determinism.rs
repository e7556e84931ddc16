//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a battle produces identical results
//! given identical inputs.
//!
//! # Testing Strategy
//!
//! Battles must be 100% deterministic so balance runs are reproducible and
//! replays match. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`battle_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Entities are always visited in spawn order.
//!
//! - **Tie-breaks**: Equal ranking keys fall back to spawn order, never to
//!   slot index or hash order.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual processor behavior
//! 2. **Property tests**: Random rosters must still produce deterministic outputs
//! 3. **Integration tests**: Full battles are reproducible
//! 4. **Parallel tests**: Running N battles on threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use battle_core::config::tick_dt;
use battle_core::view::BattleSnapshot;
use battle_core::world::{BattleWorld, Outcome};

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic battle).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the battle was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Battle is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run any stepped state multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one step
/// * `hash` - Function to compute the state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// [`verify_determinism`] specialized to [`BattleWorld`] with the nominal tick.
pub fn verify_battle_determinism<F>(setup_fn: F, runs: usize, ticks: u64) -> DeterminismResult
where
    F: Fn() -> BattleWorld,
{
    let dt = tick_dt();
    verify_determinism(
        runs,
        ticks,
        setup_fn,
        |world| {
            world.advance(dt);
        },
        BattleWorld::state_hash,
    )
}

/// Run N battles on scoped threads and compare their final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling or
/// memory layout differences.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn verify_parallel_determinism<F>(setup_fn: F, num_battles: usize, ticks: u64) -> DeterminismResult
where
    F: Fn() -> BattleWorld + Sync,
{
    let dt = tick_dt();
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_battles)
            .map(|_| {
                s.spawn(|| {
                    let mut world = setup_fn();
                    for _ in 0..ticks {
                        world.advance(dt);
                    }
                    world.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("battle thread panicked"))
            .collect::<Vec<u64>>()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks,
    }
}

/// Compare two battles tick by tick, finding the first divergence.
///
/// # Returns
///
/// `None` if the battles stay identical, `Some(tick)` if they diverge at
/// that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> BattleWorld,
{
    let dt = tick_dt();
    let mut a = setup_fn();
    let mut b = setup_fn();

    if a.state_hash() != b.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        a.advance(dt);
        b.advance(dt);

        if a.state_hash() != b.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Run a battle to completion and return its outcome with the full trace of
/// per-tick hashes.
pub fn trace_battle(mut world: BattleWorld, max_ticks: u64) -> (Option<Outcome>, Vec<u64>) {
    let dt = tick_dt();
    let mut trace = vec![world.state_hash()];
    for _ in 0..max_ticks {
        if let Some(outcome) = world.advance(dt) {
            return (Some(outcome), trace);
        }
        trace.push(world.state_hash());
    }
    (None, trace)
}

/// Verify that a snapshot survives a bincode round trip unchanged.
pub fn verify_snapshot_roundtrip(world: &BattleWorld) -> bool {
    let snapshot = world.snapshot();
    let Ok(bytes) = snapshot.to_bytes() else {
        return false;
    };
    BattleSnapshot::from_bytes(&bytes).is_ok_and(|restored| restored == snapshot)
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible rosters.
pub mod strategies {
    use battle_core::world::Placement;
    use proptest::prelude::*;

    /// Built-in unit types that can appear in generated rosters.
    pub const ROSTER_UNIT_TYPES: [&str; 11] = [
        "swordsman",
        "archer",
        "barbarian",
        "catapult",
        "crossbow_volley",
        "banner_bearer",
        "pyromancer",
        "cleric",
        "terror_knight",
        "necromancer",
        "grabber",
    ];

    /// Generate a built-in unit type.
    pub fn arb_unit_type() -> impl Strategy<Value = String> {
        proptest::sample::select(&ROSTER_UNIT_TYPES[..]).prop_map(str::to_string)
    }

    /// Generate a placement in the given x band, anywhere vertically on a
    /// default-sized battlefield.
    pub fn arb_placement(x_min: i32, x_max: i32) -> impl Strategy<Value = Placement> {
        (arb_unit_type(), x_min..x_max, 100i32..980i32).prop_map(|(unit_type, x, y)| (unit_type, (x, y)))
    }

    /// Generate a team 1 roster on the left third of the field.
    pub fn arb_left_roster(max_units: usize) -> impl Strategy<Value = Vec<Placement>> {
        proptest::collection::vec(arb_placement(100, 640), 1..=max_units)
    }

    /// Generate a team 2 roster on the right third of the field.
    pub fn arb_right_roster(max_units: usize) -> impl Strategy<Value = Vec<Placement>> {
        proptest::collection::vec(arb_placement(1280, 1820), 1..=max_units)
    }
}
