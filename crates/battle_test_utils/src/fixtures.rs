//! Test fixtures and helpers.
//!
//! Pre-built registries, rosters and battles for consistent testing.

use std::sync::Arc;

use battle_core::config::{tick_dt, BattleConfig};
use battle_core::templates::{TemplateRegistry, UnitTemplate};
use battle_core::world::{BattleWorld, Outcome, Placement};
use fixed::types::I32F32;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Shared registry of the built-in unit types.
#[must_use]
pub fn builtin_registry() -> Arc<TemplateRegistry> {
    Arc::new(TemplateRegistry::builtin())
}

/// Registry holding exactly `templates`.
///
/// # Panics
///
/// Panics if a template is invalid.
#[must_use]
pub fn registry_of(templates: impl IntoIterator<Item = UnitTemplate>) -> Arc<TemplateRegistry> {
    let mut registry = TemplateRegistry::new();
    for template in templates {
        let id = template.id.clone();
        if let Err(error) = registry.register(template) {
            panic!("fixture template '{id}' is invalid: {error}");
        }
    }
    Arc::new(registry)
}

/// Build a roster from `(unit_type, x, y)` triples.
#[must_use]
pub fn roster(units: &[(&str, i32, i32)]) -> Vec<Placement> {
    units
        .iter()
        .map(|&(unit_type, x, y)| (unit_type.to_string(), (x, y)))
        .collect()
}

/// Battle with the default config.
///
/// # Panics
///
/// Panics if the rosters do not resolve against `templates`.
#[must_use]
pub fn battle(
    team1: &[Placement],
    team2: &[Placement],
    templates: Arc<TemplateRegistry>,
    max_seconds: i32,
) -> BattleWorld {
    match BattleWorld::new(
        team1,
        team2,
        templates,
        BattleConfig::default(),
        fixed(max_seconds),
    ) {
        Ok(world) => world,
        Err(error) => panic!("fixture battle failed to build: {error}"),
    }
}

/// Mixed armies of built-in units facing each other across the field.
#[must_use]
pub fn skirmish() -> BattleWorld {
    let team1 = roster(&[
        ("swordsman", 300, 500),
        ("swordsman", 300, 560),
        ("archer", 200, 520),
        ("cleric", 220, 580),
        ("banner_bearer", 260, 540),
    ]);
    let team2 = roster(&[
        ("barbarian", 1600, 500),
        ("terror_knight", 1600, 560),
        ("crossbow_volley", 1720, 520),
        ("pyromancer", 1700, 580),
        ("necromancer", 1740, 540),
    ]);
    battle(&team1, &team2, builtin_registry(), 120)
}

/// Advance with the nominal tick until an outcome or `max_ticks`.
pub fn run_to_outcome(world: &mut BattleWorld, max_ticks: u64) -> Option<Outcome> {
    let dt = tick_dt();
    for _ in 0..max_ticks {
        if let Some(outcome) = world.advance(dt) {
            return Some(outcome);
        }
    }
    None
}

/// Advance exactly `ticks` nominal ticks (or until decided).
pub fn run_ticks(world: &mut BattleWorld, ticks: u64) {
    let dt = tick_dt();
    for _ in 0..ticks {
        if world.advance(dt).is_some() {
            return;
        }
    }
}
