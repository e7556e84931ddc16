//! Single battle runner.
//!
//! Drives one scenario to its outcome with the nominal tick, collecting
//! metrics and, optionally, streaming JSON-line snapshots to a writer.

use std::io::Write;
use std::sync::Arc;

use battle_core::config::tick_dt;
use battle_core::math::Fixed;
use battle_core::templates::TemplateRegistry;
use battle_core::view::BattleSnapshot;
use battle_core::world::BattleWorld;
use tracing::{debug, info, warn};

use crate::metrics::{BattleMetrics, MetricsCollector};
use crate::scenario::{Scenario, ScenarioError};

/// Runner configuration.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Battle identifier used in metrics.
    pub battle_id: String,
    /// Jitter seed; `None` spawns exactly as the scenario says.
    pub seed: Option<u64>,
    /// Jitter amount in world units.
    pub jitter: i32,
    /// Write a snapshot every this many ticks (plus one at the end).
    pub snapshot_every: Option<u64>,
    /// Keep the per-tick state hashes.
    pub record_hashes: bool,
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Collected metrics.
    pub metrics: BattleMetrics,
    /// State hash after every tick, if recorded.
    pub hashes: Vec<u64>,
    /// Final snapshot.
    pub final_snapshot: BattleSnapshot,
}

/// Headless runner for a single battle.
#[derive(Debug, Clone)]
pub struct BattleRunner {
    config: RunnerConfig,
}

impl BattleRunner {
    /// Create a runner.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Upper bound on `advance` calls for a scenario.
    #[must_use]
    pub fn tick_budget(max_duration: Fixed) -> u64 {
        (max_duration / tick_dt()).ceil().to_num::<u64>() + 1
    }

    /// Build the scenario's battle and run it to its outcome.
    pub fn run(&self, scenario: &Scenario) -> Result<RunReport, ScenarioError> {
        let templates = scenario.registry()?;
        self.run_with(scenario, &templates, None)
    }

    /// Run with a prepared registry, writing snapshots to `out` if given.
    pub fn run_with(
        &self,
        scenario: &Scenario,
        templates: &Arc<TemplateRegistry>,
        mut out: Option<&mut dyn Write>,
    ) -> Result<RunReport, ScenarioError> {
        let mut world = scenario.build(templates, self.config.seed, self.config.jitter)?;
        let mut collector =
            MetricsCollector::new(&self.config.battle_id, &scenario.name, self.config.seed, &world);
        let dt = tick_dt();
        let mut hashes = Vec::new();

        debug!(scenario = %scenario.name, seed = ?self.config.seed, "battle started");
        for _ in 0..Self::tick_budget(scenario.max_duration) {
            if world.advance(dt).is_some() {
                break;
            }
            collector.observe(&world);
            if self.config.record_hashes {
                hashes.push(world.state_hash());
            }
            if let (Some(every), Some(out)) = (self.config.snapshot_every, out.as_deref_mut()) {
                if every > 0 && world.tick() % every == 0 {
                    write_snapshot(out, &world)?;
                }
            }
        }
        if world.outcome().is_none() {
            warn!(scenario = %scenario.name, tick = world.tick(), "tick budget ran out");
        }
        if let Some(out) = out {
            write_snapshot(out, &world)?;
        }

        let final_snapshot = world.snapshot();
        let metrics = collector.finish(&world);
        info!(
            scenario = %scenario.name,
            outcome = ?metrics.outcome,
            ticks = metrics.duration_ticks,
            "battle finished"
        );
        Ok(RunReport {
            metrics,
            hashes,
            final_snapshot,
        })
    }
}

fn write_snapshot(out: &mut dyn Write, world: &BattleWorld) -> Result<(), ScenarioError> {
    let line = serde_json::to_string(&world.snapshot())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(out, "{line}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duel_runs_to_an_outcome() {
        let runner = BattleRunner::new(RunnerConfig {
            battle_id: "duel".to_string(),
            record_hashes: true,
            ..Default::default()
        });
        let report = runner.run(&Scenario::duel()).unwrap();

        assert!(report.metrics.outcome.is_some());
        assert_eq!(report.hashes.len() as u64, report.metrics.duration_ticks);
        assert_eq!(report.hashes.last().copied(), Some(report.metrics.final_state_hash));
        assert_eq!(report.final_snapshot.outcome, report.metrics.outcome);
    }

    #[test]
    fn test_runs_are_reproducible() {
        let runner = BattleRunner::new(RunnerConfig {
            seed: Some(99),
            jitter: 20,
            ..Default::default()
        });
        let scenario = Scenario::kiting();
        let a = runner.run(&scenario).unwrap();
        let b = runner.run(&scenario).unwrap();
        assert_eq!(a.metrics.final_state_hash, b.metrics.final_state_hash);
        assert_eq!(a.metrics.duration_ticks, b.metrics.duration_ticks);
    }

    #[test]
    fn test_snapshots_stream_as_json_lines() {
        let runner = BattleRunner::new(RunnerConfig {
            snapshot_every: Some(60),
            ..Default::default()
        });
        let scenario = Scenario::duel();
        let templates = scenario.registry().unwrap();
        let mut out = Vec::new();
        let report = runner.run_with(&scenario, &templates, Some(&mut out as &mut dyn Write)).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len() as u64, report.metrics.duration_ticks / 60 + 1);
        let last: BattleSnapshot = serde_json::from_str(lines[lines.len() - 1]).unwrap();
        assert_eq!(last.tick, report.metrics.duration_ticks);
    }

    #[test]
    fn test_tick_budget_covers_duration() {
        assert_eq!(BattleRunner::tick_budget(Fixed::from_num(1)), 62);
    }
}
