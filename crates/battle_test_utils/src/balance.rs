//! Balance testing utilities for headless battles.
//!
//! Tools for running many simulated battles and comparing unit types, both
//! by simulation and by a quick time-to-kill estimate from template numbers.

use std::sync::Arc;

use battle_core::armor::reduce_damage;
use battle_core::components::Team;
use battle_core::config::{tick_dt, BattleConfig};
use battle_core::math::Fixed;
use battle_core::templates::{TemplateRegistry, UnitTemplate};
use battle_core::world::{BattleWorld, Outcome, Placement};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Result of a simulated battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleResult {
    /// Outcome, `None` if the tick budget ran out first.
    pub outcome: Option<Outcome>,
    /// Ticks simulated.
    pub ticks: u64,
    /// Team 1 units still standing.
    pub survivors_team1: usize,
    /// Team 2 units still standing.
    pub survivors_team2: usize,
}

impl BattleResult {
    /// Advance `world` with the nominal tick until it is decided or
    /// `max_ticks` have run.
    pub fn run(mut world: BattleWorld, max_ticks: u64) -> Self {
        let dt = tick_dt();
        let mut outcome = None;
        for _ in 0..max_ticks {
            outcome = world.advance(dt);
            if outcome.is_some() {
                break;
            }
        }
        Self {
            outcome,
            ticks: world.tick(),
            survivors_team1: world.standing_count(Team::Team1),
            survivors_team2: world.standing_count(Team::Team2),
        }
    }
}

/// Statistics for a set of battles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattleStats {
    /// Total battles run.
    pub total_battles: u32,
    /// Wins for team 1.
    pub wins_team1: u32,
    /// Wins for team 2.
    pub wins_team2: u32,
    /// Timeouts and unfinished battles.
    pub draws: u32,
    /// Average ticks to resolution.
    pub avg_ticks: f64,
}

impl BattleStats {
    /// Fold one result into the statistics.
    pub fn record(&mut self, result: &BattleResult) {
        let previous = f64::from(self.total_battles);
        self.total_battles += 1;
        match result.outcome {
            Some(Outcome::Team1Victory) => self.wins_team1 += 1,
            Some(Outcome::Team2Victory) => self.wins_team2 += 1,
            Some(Outcome::Timeout) | None => self.draws += 1,
        }
        self.avg_ticks =
            (self.avg_ticks * previous + result.ticks as f64) / f64::from(self.total_battles);
    }

    /// Statistics over a batch of results.
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a BattleResult>) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.record(result);
        }
        stats
    }

    /// Win rate for team 1 (0.0 to 1.0).
    pub fn win_rate_team1(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.5;
        }
        f64::from(self.wins_team1) / f64::from(self.total_battles)
    }

    /// Win rate for team 2 (0.0 to 1.0).
    pub fn win_rate_team2(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.5;
        }
        f64::from(self.wins_team2) / f64::from(self.total_battles)
    }

    /// Check if the matchup is balanced (team 1 win rate within range).
    pub fn is_balanced(&self, min_rate: f64, max_rate: f64) -> bool {
        let rate = self.win_rate_team1();
        rate >= min_rate && rate <= max_rate
    }

    /// Pretty RON rendering for reports.
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }
}

/// Line up `count` units of a type, 60 units apart vertically.
fn line(unit_type: &str, count: usize, x: i32) -> Vec<Placement> {
    (0..count)
        .map(|i| (unit_type.to_string(), (x, 300 + 60 * i as i32)))
        .collect()
}

/// Fight `count` of `a` against `count` of `b`, then again with sides
/// swapped, and report from `a`'s point of view (team 1 = `a`).
///
/// Swapping sides cancels the team-1 tie-break.
///
/// # Panics
///
/// Panics if either unit type is not registered.
pub fn mirrored_matchup(
    a: &str,
    b: &str,
    count: usize,
    templates: &Arc<TemplateRegistry>,
    max_seconds: i32,
) -> BattleStats {
    let build = |left: &str, right: &str| {
        match BattleWorld::new(
            &line(left, count, 400),
            &line(right, count, 1500),
            Arc::clone(templates),
            BattleConfig::default(),
            Fixed::from_num(max_seconds),
        ) {
            Ok(world) => world,
            Err(error) => panic!("matchup {left} vs {right} failed to build: {error}"),
        }
    };
    let max_ticks = u64::try_from(max_seconds).unwrap_or(0) * 60 + 1;

    let forward = BattleResult::run(build(a, b), max_ticks);
    let mut swapped = BattleResult::run(build(b, a), max_ticks);
    swapped.outcome = swapped.outcome.map(|outcome| match outcome {
        Outcome::Team1Victory => Outcome::Team2Victory,
        Outcome::Team2Victory => Outcome::Team1Victory,
        Outcome::Timeout => Outcome::Timeout,
    });
    std::mem::swap(&mut swapped.survivors_team1, &mut swapped.survivors_team2);

    let stats = BattleStats::from_results([&forward, &swapped]);
    debug!(a, b, ?stats, "matchup");
    stats
}

/// Seconds `attacker`'s basic attack needs to kill one `defender`, ignoring
/// movement, specials and damage over time. `None` if it never can.
pub fn time_to_kill(attacker: &UnitTemplate, defender: &UnitTemplate, armor_cap: Fixed) -> Option<f64> {
    let attack = attacker.attack.as_ref()?;
    let per_hit = reduce_damage(attack.damage, defender.armor.unwrap_or_default(), armor_cap);
    if per_hit <= Fixed::ZERO {
        return None;
    }
    let hits = (defender.health / per_hit).ceil().to_num::<f64>();
    let interval = attack.cooldown.max(attack.duration).to_num::<f64>();
    Some((hits - 1.0).max(0.0) * interval + attack.duration.to_num::<f64>())
}

/// Time-to-kill for every ordered pair of `unit_types`.
pub fn ttk_matrix(
    templates: &TemplateRegistry,
    unit_types: &[&str],
    armor_cap: Fixed,
) -> Vec<(String, String, Option<f64>)> {
    let mut results = Vec::new();
    for attacker in unit_types {
        for defender in unit_types {
            let (Ok(a), Ok(d)) = (templates.get(attacker), templates.get(defender)) else {
                continue;
            };
            results.push((
                (*attacker).to_string(),
                (*defender).to_string(),
                time_to_kill(a, d, armor_cap),
            ));
        }
    }
    results
}
