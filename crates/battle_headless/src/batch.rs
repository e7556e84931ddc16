//! Batch battle runner for balance testing.
//!
//! Runs many jittered copies of one scenario in parallel with rayon and
//! folds their metrics into a summary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use battle_core::templates::TemplateRegistry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::jitter::battle_seed;
use crate::metrics::{BatchSummary, BattleMetrics};
use crate::runner::{BattleRunner, RunnerConfig};
use crate::scenario::{Scenario, ScenarioError};

/// Configuration for a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Built-in scenario name or scenario file path
    pub scenario: String,
    /// Number of battles to run
    pub battle_count: u32,
    /// Maximum parallel battles (0 = use rayon default)
    pub parallel_battles: u32,
    /// Output directory for results
    pub output_dir: PathBuf,
    /// Base seed; each battle derives its own from it
    pub seed_start: u64,
    /// Spawn jitter in world units
    pub jitter: i32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "skirmish".to_string(),
            battle_count: 100,
            parallel_battles: 0,
            output_dir: PathBuf::from("results"),
            seed_start: 0,
            jitter: 24,
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario
    #[must_use]
    pub fn new(scenario: &str, battle_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            battle_count,
            ..Default::default()
        }
    }

    /// Set output directory
    #[must_use]
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set spawn jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: i32) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the number of worker threads
    #[must_use]
    pub fn with_parallelism(mut self, threads: u32) -> Self {
        self.parallel_battles = threads;
        self
    }
}

/// Results from a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual battle metrics, in battle order
    pub battles: Vec<BattleMetrics>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Error during batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Battle index
    pub battle_index: u32,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Progress tracking for batch runs
#[derive(Debug)]
pub struct BatchProgress {
    /// Total battles
    pub total: u32,
    completed: AtomicU32,
    start_time: Instant,
    partial_wins: Mutex<BTreeMap<String, u32>>,
}

impl BatchProgress {
    /// Create new progress tracker
    #[must_use]
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: AtomicU32::new(0),
            start_time: Instant::now(),
            partial_wins: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a completed battle
    pub fn record_completion(&self, winner: Option<&str>) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if let Some(w) = winner {
            if let Ok(mut wins) = self.partial_wins.lock() {
                *wins.entry(w.to_string()).or_insert(0) += 1;
            }
        }
    }

    /// Get current completion count
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Get completion percentage
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Get estimated time remaining
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::from_secs(0);
        }
        let per_battle = self.start_time.elapsed().as_secs_f64() / f64::from(completed);
        let remaining = self.total.saturating_sub(completed);
        Duration::from_secs_f64(per_battle * f64::from(remaining))
    }

    /// Get current win rates
    pub fn current_win_rates(&self) -> BTreeMap<String, f64> {
        let completed = self.current();
        if completed == 0 {
            return BTreeMap::new();
        }
        match self.partial_wins.lock() {
            Ok(wins) => wins
                .iter()
                .map(|(k, v)| (k.clone(), f64::from(*v) / f64::from(completed)))
                .collect(),
            Err(_) => BTreeMap::new(),
        }
    }

    /// Log progress
    pub fn report(&self) {
        let eta = self.eta();
        info!(
            completed = self.current(),
            total = self.total,
            percent = %format!("{:.1}", self.percentage()),
            eta = %format!("{}m {}s", eta.as_secs() / 60, eta.as_secs() % 60),
            win_rates = ?self.current_win_rates(),
            "batch progress"
        );
    }
}

fn run_single_battle(
    scenario: &Scenario,
    templates: &Arc<TemplateRegistry>,
    index: u32,
    seed: u64,
    jitter: i32,
) -> Result<BattleMetrics, ScenarioError> {
    let runner = BattleRunner::new(RunnerConfig {
        battle_id: format!("{}_{index}", scenario.name),
        seed: Some(seed),
        jitter,
        ..Default::default()
    });
    Ok(runner.run_with(scenario, templates, None)?.metrics)
}

/// Run a batch of battles
///
/// The scenario and its templates are loaded once; a failure there fails the
/// whole batch. Failures of single battles are collected in
/// [`BatchResults::errors`].
pub fn run_batch(config: BatchConfig) -> Result<BatchResults, ScenarioError> {
    let start = Instant::now();
    let scenario = Scenario::resolve(&config.scenario)?;
    let templates = scenario.registry()?;
    let progress = BatchProgress::new(config.battle_count);

    info!(
        "Starting batch run: {} battles of '{}'",
        config.battle_count, scenario.name
    );

    let run_all = || -> Vec<Result<BattleMetrics, BatchError>> {
        (0..config.battle_count)
            .into_par_iter()
            .map(|i| {
                let seed = battle_seed(config.seed_start, i as usize);
                match run_single_battle(&scenario, &templates, i, seed, config.jitter) {
                    Ok(metrics) => {
                        progress.record_completion(metrics.winner.as_deref());
                        let completed = progress.current();
                        if completed % 10 == 0 {
                            debug!("Progress: {}/{}", completed, config.battle_count);
                        }
                        if completed % 100 == 0 {
                            progress.report();
                        }
                        Ok(metrics)
                    }
                    Err(e) => {
                        warn!("Battle {} failed: {}", i, e);
                        Err(BatchError {
                            battle_index: i,
                            seed,
                            message: e.to_string(),
                        })
                    }
                }
            })
            .collect()
    };

    let results = if config.parallel_battles > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_battles as usize)
            .build()
        {
            Ok(pool) => pool.install(run_all),
            Err(e) => {
                warn!("Failed to build thread pool: {}, using the global pool", e);
                run_all()
            }
        }
    } else {
        run_all()
    };

    let (battles, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let battles: Vec<BattleMetrics> = battles.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_battles(&battles);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} battles in {:.1}s ({:.1} battles/sec)",
        battles.len(),
        duration_seconds,
        battles.len() as f64 / duration_seconds.max(f64::EPSILON)
    );

    Ok(BatchResults {
        config,
        battles,
        summary,
        duration_seconds,
        errors,
    })
}

/// Outcome of a determinism check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminismCheck {
    /// Number of runs compared.
    pub runs: u32,
    /// Ticks in the reference run.
    pub ticks: u64,
    /// Final state hash of the reference run.
    pub final_hash: u64,
    /// First tick (1-based) where some run's hash differed, if any.
    pub first_divergence: Option<u64>,
}

impl DeterminismCheck {
    /// Whether every run matched the reference.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.first_divergence.is_none()
    }
}

/// Run the same seeded battle `runs` times across threads and compare the
/// per-tick state hashes.
pub fn verify_determinism(
    scenario: &Scenario,
    seed: u64,
    jitter: i32,
    runs: u32,
) -> Result<DeterminismCheck, ScenarioError> {
    let templates = scenario.registry()?;
    let runner = BattleRunner::new(RunnerConfig {
        battle_id: format!("{}_verify", scenario.name),
        seed: Some(seed),
        jitter,
        snapshot_every: None,
        record_hashes: true,
    });
    let traces = (0..runs.max(1))
        .into_par_iter()
        .map(|_| runner.run_with(scenario, &templates, None).map(|report| report.hashes))
        .collect::<Result<Vec<_>, _>>()?;

    let reference = &traces[0];
    let first_divergence = traces[1..]
        .iter()
        .filter_map(|trace| {
            let common = reference.iter().zip(trace).position(|(a, b)| a != b);
            match common {
                Some(index) => Some(index as u64 + 1),
                None if trace.len() != reference.len() => {
                    Some(trace.len().min(reference.len()) as u64 + 1)
                }
                None => None,
            }
        })
        .min();

    Ok(DeterminismCheck {
        runs: runs.max(1),
        ticks: reference.len() as u64,
        final_hash: reference.last().copied().unwrap_or_default(),
        first_divergence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_config_default() {
        let config = BatchConfig::default();
        assert_eq!(config.battle_count, 100);
        assert_eq!(config.scenario, "skirmish");
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new("duel", 500)
            .with_output(PathBuf::from("/tmp/results"))
            .with_seed(12345)
            .with_jitter(5)
            .with_parallelism(2);

        assert_eq!(config.scenario, "duel");
        assert_eq!(config.battle_count, 500);
        assert_eq!(config.seed_start, 12345);
        assert_eq!(config.jitter, 5);
        assert_eq!(config.parallel_battles, 2);
    }

    #[test]
    fn test_progress_tracking() {
        let progress = BatchProgress::new(100);
        assert_eq!(progress.current(), 0);
        assert!(progress.percentage().abs() < f64::EPSILON);

        progress.record_completion(Some("team1"));
        progress.record_completion(Some("team2"));
        progress.record_completion(Some("team1"));
        progress.record_completion(None);

        assert_eq!(progress.current(), 4);
        let rates = progress.current_win_rates();
        assert!((rates["team1"] - 0.5).abs() < 0.01);
        assert!((rates["team2"] - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_run_batch_small() {
        let results = run_batch(BatchConfig::new("duel", 6).with_seed(3)).unwrap();

        assert_eq!(results.battles.len(), 6);
        assert!(results.errors.is_empty());
        assert_eq!(results.summary.total_battles, 6);
        let ids: Vec<&str> = results.battles.iter().map(|b| b.battle_id.as_str()).collect();
        assert_eq!(ids, ["duel_0", "duel_1", "duel_2", "duel_3", "duel_4", "duel_5"]);
    }

    #[test]
    fn test_batch_is_independent_of_thread_count() {
        let one = run_batch(BatchConfig::new("kiting", 4).with_seed(9).with_parallelism(1)).unwrap();
        let many = run_batch(BatchConfig::new("kiting", 4).with_seed(9).with_parallelism(4)).unwrap();
        let hashes = |r: &BatchResults| r.battles.iter().map(|b| b.final_state_hash).collect::<Vec<_>>();
        assert_eq!(hashes(&one), hashes(&many));
    }

    #[test]
    fn test_unknown_scenario_fails_the_batch() {
        assert!(matches!(
            run_batch(BatchConfig::new("no_such_scenario.ron", 2)),
            Err(ScenarioError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_verify_determinism() {
        let check = verify_determinism(&Scenario::skirmish(), 12345, 16, 3).unwrap();
        assert!(check.is_deterministic(), "{check:?}");
        assert_eq!(check.runs, 3);
        assert!(check.ticks > 0);
    }

    #[test]
    fn test_batch_results_save_load() {
        let results = run_batch(BatchConfig::new("duel", 3)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.json");

        results.save(&path).unwrap();
        assert!(path.exists());

        let loaded = BatchResults::load(&path).unwrap();
        assert_eq!(loaded.battles.len(), 3);
        assert_eq!(loaded.config.scenario, "duel");
        assert_eq!(loaded.summary.total_battles, 3);
    }
}
