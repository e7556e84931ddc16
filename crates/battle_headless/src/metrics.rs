//! Battle metrics collection for balance analysis.
//!
//! A [`MetricsCollector`] watches a battle tick by tick through the events it
//! reports and produces one [`BattleMetrics`] record per battle. Batches of
//! records fold into a [`BatchSummary`].

use std::collections::BTreeMap;

use battle_core::components::Team;
use battle_core::entity::EntityId;
use battle_core::events::BattleEvent;
use battle_core::world::{BattleWorld, Outcome};
use serde::{Deserialize, Serialize};

/// Label used for a team in reports.
#[must_use]
pub fn team_label(team: Team) -> &'static str {
    match team {
        Team::Team1 => "team1",
        Team::Team2 => "team2",
    }
}

/// Winning team label, `None` on timeout.
#[must_use]
pub fn winner_label(outcome: Outcome) -> Option<&'static str> {
    match outcome {
        Outcome::Team1Victory => Some(team_label(Team::Team1)),
        Outcome::Team2Victory => Some(team_label(Team::Team2)),
        Outcome::Timeout => None,
    }
}

/// Complete metrics for a single battle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BattleMetrics {
    /// Unique battle identifier.
    pub battle_id: String,
    /// Scenario name.
    pub scenario: String,
    /// Jitter seed, if any.
    pub seed: Option<u64>,
    /// Ticks simulated.
    pub duration_ticks: u64,
    /// Simulated seconds.
    pub elapsed_seconds: f64,
    /// How the battle ended, `None` if it was cut short.
    pub outcome: Option<Outcome>,
    /// Winning team label.
    pub winner: Option<String>,
    /// Per-team metrics keyed by team label.
    pub teams: BTreeMap<String, TeamMetrics>,
    /// Deaths and summons in tick order.
    pub events: Vec<TimedEvent>,
    /// Final state hash (for determinism validation).
    pub final_state_hash: u64,
}

impl BattleMetrics {
    /// Create a new battle metrics instance.
    #[must_use]
    pub fn new(battle_id: impl Into<String>, scenario: impl Into<String>, seed: Option<u64>) -> Self {
        Self {
            battle_id: battle_id.into(),
            scenario: scenario.into(),
            seed,
            ..Default::default()
        }
    }

    /// Get or create team metrics.
    pub fn team_mut(&mut self, team: Team) -> &mut TeamMetrics {
        self.teams.entry(team_label(team).to_string()).or_default()
    }

    /// Metrics for one team.
    #[must_use]
    pub fn team(&self, team: Team) -> Option<&TeamMetrics> {
        self.teams.get(team_label(team))
    }
}

/// Metrics for one side of a battle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamMetrics {
    /// Units at battle start by type.
    pub units_fielded: BTreeMap<String, u32>,
    /// Units summoned during the battle by type.
    pub units_summoned: BTreeMap<String, u32>,
    /// Own units lost by type.
    pub units_lost: BTreeMap<String, u32>,
    /// Enemy units killed by type.
    pub units_killed: BTreeMap<String, u32>,
    /// Units standing at the end.
    pub survivors: usize,
    /// Remaining health over starting health of the survivors' roster.
    pub health_remaining: f64,
    /// Kill/death ratio.
    pub kd_ratio: f64,
    /// Tick of this team's first kill.
    pub first_kill_tick: Option<u64>,
}

impl TeamMetrics {
    fn bump(map: &mut BTreeMap<String, u32>, unit_type: &str) {
        *map.entry(unit_type.to_string()).or_default() += 1;
    }

    /// Total units lost.
    #[must_use]
    pub fn total_lost(&self) -> u32 {
        self.units_lost.values().sum()
    }

    /// Total enemy units killed.
    #[must_use]
    pub fn total_killed(&self) -> u32 {
        self.units_killed.values().sum()
    }

    /// Calculate final stats.
    pub fn calculate_derived_stats(&mut self) {
        let killed = self.total_killed();
        let lost = self.total_lost();
        // A flawless side reports its kill count.
        self.kd_ratio = f64::from(killed) / f64::from(lost.max(1));
    }
}

/// A timed event during the battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Tick when the event occurred.
    pub tick: u64,
    /// Type of event.
    pub event_type: EventType,
    /// Team involved.
    pub team: String,
    /// Unit type involved.
    pub unit_type: String,
}

/// Types of events that are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// A unit died.
    UnitKilled,
    /// A unit was summoned.
    UnitSummoned,
}

/// Metrics collector that tracks a battle's events.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: BattleMetrics,
    starting_health: BTreeMap<String, f64>,
    // Team and unit type of every unit seen, for entities removed mid-tick.
    known: BTreeMap<EntityId, (Team, String)>,
}

impl MetricsCollector {
    /// Start collecting for `world`, recording its starting rosters.
    #[must_use]
    pub fn new(battle_id: &str, scenario: &str, seed: Option<u64>, world: &BattleWorld) -> Self {
        let mut collector = Self {
            metrics: BattleMetrics::new(battle_id, scenario, seed),
            starting_health: BTreeMap::new(),
            known: BTreeMap::new(),
        };
        for team in [Team::Team1, Team::Team2] {
            collector.metrics.team_mut(team);
        }
        for unit in world.units() {
            TeamMetrics::bump(&mut collector.metrics.team_mut(unit.team).units_fielded, &unit.unit_type);
            *collector
                .starting_health
                .entry(team_label(unit.team).to_string())
                .or_default() += unit.max_health.to_num::<f64>();
            collector.known.insert(unit.id, (unit.team, unit.unit_type));
        }
        collector
    }

    fn identify(&self, world: &BattleWorld, id: EntityId) -> Option<(Team, String)> {
        world
            .view(id)
            .map(|unit| (unit.team, unit.unit_type))
            .or_else(|| self.known.get(&id).cloned())
    }

    /// Fold in the events of the tick `world` just ran.
    pub fn observe(&mut self, world: &BattleWorld) {
        let events = world.last_events();
        let tick = events.tick;
        for event in &events.events {
            match event {
                BattleEvent::KillingBlow { entity, source } => {
                    let Some((victim_team, victim_type)) = self.identify(world, *entity) else {
                        continue;
                    };
                    let killer_team = source
                        .and_then(|id| self.identify(world, id))
                        .map_or(victim_team.other(), |(team, _)| team);
                    if killer_team == victim_team {
                        continue;
                    }
                    let team = self.metrics.team_mut(killer_team);
                    TeamMetrics::bump(&mut team.units_killed, &victim_type);
                    team.first_kill_tick.get_or_insert(tick);
                }
                BattleEvent::Death { entity } => {
                    let Some((team, unit_type)) = self.identify(world, *entity) else {
                        continue;
                    };
                    TeamMetrics::bump(&mut self.metrics.team_mut(team).units_lost, &unit_type);
                    self.metrics.events.push(TimedEvent {
                        tick,
                        event_type: EventType::UnitKilled,
                        team: team_label(team).to_string(),
                        unit_type,
                    });
                }
                BattleEvent::Summoned { entity, .. } => {
                    let Some(unit) = world.view(*entity) else {
                        continue;
                    };
                    TeamMetrics::bump(&mut self.metrics.team_mut(unit.team).units_summoned, &unit.unit_type);
                    self.metrics.events.push(TimedEvent {
                        tick,
                        event_type: EventType::UnitSummoned,
                        team: team_label(unit.team).to_string(),
                        unit_type: unit.unit_type.clone(),
                    });
                    self.known.insert(unit.id, (unit.team, unit.unit_type));
                }
                _ => {}
            }
        }
    }

    /// Close the record with the battle's final state.
    #[must_use]
    pub fn finish(mut self, world: &BattleWorld) -> BattleMetrics {
        let mut standing_health: BTreeMap<String, f64> = BTreeMap::new();
        for unit in world.units() {
            if !unit.state.is_dead() {
                *standing_health.entry(team_label(unit.team).to_string()).or_default() +=
                    unit.health.to_num::<f64>();
            }
        }
        for team in [Team::Team1, Team::Team2] {
            let label = team_label(team);
            let start = self.starting_health.get(label).copied().unwrap_or(0.0);
            let left = standing_health.get(label).copied().unwrap_or(0.0);
            let survivors = world.standing_count(team);
            let metrics = self.metrics.team_mut(team);
            metrics.survivors = survivors;
            metrics.health_remaining = if start > 0.0 { left / start } else { 0.0 };
            metrics.calculate_derived_stats();
        }
        self.metrics.duration_ticks = world.tick();
        self.metrics.elapsed_seconds = world.elapsed().to_num::<f64>();
        self.metrics.outcome = world.outcome();
        self.metrics.winner = world.outcome().and_then(winner_label).map(str::to_string);
        self.metrics.final_state_hash = world.state_hash();
        self.metrics
    }
}

/// Summary statistics across multiple battles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Total battles run.
    pub total_battles: u32,
    /// Battles won by each team.
    pub wins_by_team: BTreeMap<String, u32>,
    /// Win rates by team.
    pub win_rates: BTreeMap<String, f64>,
    /// Timeouts and battles cut short.
    pub draws: u32,
    /// Average battle duration in ticks.
    pub avg_duration_ticks: f64,
    /// Shortest battle.
    pub min_duration_ticks: u64,
    /// Longest battle.
    pub max_duration_ticks: u64,
    /// Average survivors per battle by team.
    pub avg_survivors: BTreeMap<String, f64>,
    /// Average K/D ratio by team.
    pub avg_kd_ratio: BTreeMap<String, f64>,
    /// Deaths per unit type over the whole batch.
    pub losses_by_unit_type: BTreeMap<String, u32>,
}

impl BatchSummary {
    /// Calculate summary from a list of battle metrics.
    #[must_use]
    pub fn from_battles(battles: &[BattleMetrics]) -> Self {
        if battles.is_empty() {
            return Self::default();
        }

        let mut summary = Self {
            total_battles: battles.len() as u32,
            min_duration_ticks: u64::MAX,
            ..Default::default()
        };

        let mut duration_sum = 0u64;
        let mut survivors: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut kd: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for battle in battles {
            duration_sum += battle.duration_ticks;
            summary.min_duration_ticks = summary.min_duration_ticks.min(battle.duration_ticks);
            summary.max_duration_ticks = summary.max_duration_ticks.max(battle.duration_ticks);

            match &battle.winner {
                Some(winner) => *summary.wins_by_team.entry(winner.clone()).or_default() += 1,
                None => summary.draws += 1,
            }

            for (label, team) in &battle.teams {
                survivors.entry(label.clone()).or_default().push(team.survivors);
                kd.entry(label.clone()).or_default().push(team.kd_ratio);
                for (unit_type, lost) in &team.units_lost {
                    *summary.losses_by_unit_type.entry(unit_type.clone()).or_default() += lost;
                }
            }
        }

        summary.avg_duration_ticks = duration_sum as f64 / battles.len() as f64;

        for label in survivors.keys() {
            let wins = summary.wins_by_team.get(label).copied().unwrap_or(0);
            summary
                .win_rates
                .insert(label.clone(), f64::from(wins) / f64::from(summary.total_battles));
        }

        for (label, values) in survivors {
            let avg = values.iter().sum::<usize>() as f64 / values.len() as f64;
            summary.avg_survivors.insert(label, avg);
        }

        for (label, values) in kd {
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            summary.avg_kd_ratio.insert(label, avg);
        }

        summary
    }

    /// Check if both teams' win rates are within `threshold` of 0.5.
    #[must_use]
    pub fn is_balanced(&self, threshold: f64) -> bool {
        self.win_rates.values().all(|rate| (rate - 0.5).abs() <= threshold)
    }

    /// Get the dominant team (if any).
    #[must_use]
    pub fn dominant_team(&self, threshold: f64) -> Option<&str> {
        self.win_rates
            .iter()
            .find(|(_, rate)| **rate > 0.5 + threshold)
            .map(|(label, _)| label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use battle_core::config::tick_dt;
    use battle_test_utils::fixtures::{battle, builtin_registry, roster};

    fn record(winner: Option<&str>, ticks: u64) -> BattleMetrics {
        let mut metrics = BattleMetrics::new("b", "test", None);
        metrics.duration_ticks = ticks;
        metrics.winner = winner.map(str::to_string);
        for team in [Team::Team1, Team::Team2] {
            metrics.team_mut(team).kd_ratio = 1.0;
        }
        metrics
    }

    #[test]
    fn test_team_labels() {
        assert_eq!(team_label(Team::Team1), "team1");
        assert_eq!(winner_label(Outcome::Team2Victory), Some("team2"));
        assert_eq!(winner_label(Outcome::Timeout), None);
    }

    #[test]
    fn test_kd_ratio() {
        let mut team = TeamMetrics::default();
        team.calculate_derived_stats();
        assert!(team.kd_ratio.abs() < f64::EPSILON);

        team.units_killed.insert("archer".to_string(), 3);
        team.calculate_derived_stats();
        assert!((team.kd_ratio - 3.0).abs() < f64::EPSILON);

        team.units_lost.insert("swordsman".to_string(), 2);
        team.calculate_derived_stats();
        assert!((team.kd_ratio - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_batch_summary() {
        let battles = vec![
            record(Some("team1"), 100),
            record(Some("team1"), 300),
            record(Some("team2"), 200),
            record(None, 400),
        ];
        let summary = BatchSummary::from_battles(&battles);

        assert_eq!(summary.total_battles, 4);
        assert_eq!(summary.draws, 1);
        assert_eq!(summary.min_duration_ticks, 100);
        assert_eq!(summary.max_duration_ticks, 400);
        assert!((summary.avg_duration_ticks - 250.0).abs() < f64::EPSILON);
        assert!((summary.win_rates["team1"] - 0.5).abs() < f64::EPSILON);
        assert!((summary.win_rates["team2"] - 0.25).abs() < f64::EPSILON);
        assert!(summary.is_balanced(0.3));
        assert!(!summary.is_balanced(0.2));
        assert_eq!(summary.dominant_team(0.2), None);
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::from_battles(&[]);
        assert_eq!(summary.total_battles, 0);
        assert!(summary.is_balanced(0.0));
    }

    #[test]
    fn test_collector_tracks_a_battle() {
        let mut world = battle(
            &roster(&[("swordsman", 500, 500), ("swordsman", 500, 560)]),
            &roster(&[("archer", 560, 520)]),
            builtin_registry(),
            60,
        );
        let mut collector = MetricsCollector::new("duel-1", "test", None, &world);
        let dt = tick_dt();
        while world.advance(dt).is_none() {
            collector.observe(&world);
        }
        let metrics = collector.finish(&world);

        assert_eq!(metrics.outcome, Some(Outcome::Team1Victory));
        assert_eq!(metrics.winner.as_deref(), Some("team1"));
        let team1 = metrics.team(Team::Team1).unwrap();
        let team2 = metrics.team(Team::Team2).unwrap();
        assert_eq!(team1.units_fielded["swordsman"], 2);
        assert_eq!(team1.units_killed.get("archer"), Some(&1));
        assert_eq!(team2.total_lost(), 1);
        assert_eq!(team2.survivors, 0);
        assert!(team1.first_kill_tick.is_some());
        assert!(team1.health_remaining > 0.0 && team1.health_remaining <= 1.0);
        assert_eq!(metrics.final_state_hash, world.state_hash());
        assert!(metrics
            .events
            .iter()
            .any(|e| e.event_type == EventType::UnitKilled && e.unit_type == "archer"));
    }
}
