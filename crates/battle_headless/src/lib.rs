//! Headless battle runner for balance testing and determinism checks.
//!
//! Battles run without any renderer:
//!
//! - **Single runs**: play one scenario to its outcome, optionally streaming
//!   JSON-line snapshots
//! - **Batches**: run many jittered copies of a scenario in parallel and
//!   summarize win rates
//! - **Verification**: replay one seeded battle several times and compare
//!   per-tick state hashes
//!
//! # Example
//!
//! ```bash
//! # Run a built-in scenario
//! cargo run -p battle_headless -- run --scenario skirmish
//!
//! # Balance batch from a scenario file
//! cargo run -p battle_headless -- batch --scenario scenarios/militia.ron --count 200
//!
//! # Verify determinism
//! cargo run -p battle_headless -- verify --scenario kiting --runs 8
//! ```

pub mod batch;
pub mod jitter;
pub mod metrics;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, verify_determinism, BatchConfig, BatchResults, DeterminismCheck};
pub use jitter::SpawnRng;
pub use metrics::{BatchSummary, BattleMetrics, MetricsCollector, TeamMetrics};
pub use runner::{BattleRunner, RunReport, RunnerConfig};
pub use scenario::{Scenario, ScenarioError, UnitPlacement};
