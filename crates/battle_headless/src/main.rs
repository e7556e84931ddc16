//! Headless battle runner.
//!
//! # Usage
//!
//! ```bash
//! # Run one battle and print its metrics as JSON
//! cargo run -p battle_headless -- run --scenario duel
//!
//! # Stream snapshots every second of battle time
//! cargo run -p battle_headless -- run --scenario skirmish --snapshots out.jsonl --every 60
//!
//! # Balance batch
//! cargo run -p battle_headless -- batch --scenario skirmish --count 500 --output results/
//!
//! # Summarize saved batch results
//! cargo run -p battle_headless -- summary --input results/batch_results.json
//!
//! # Verify determinism
//! cargo run -p battle_headless -- verify --scenario skirmish --seed 12345 --runs 5
//!
//! # List unit types
//! cargo run -p battle_headless -- units --templates scenarios/templates/militia.ron
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides the level unless `--verbose` is
//! given.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use battle_core::templates::TemplateRegistry;
use battle_headless::{
    batch::{run_batch, verify_determinism, BatchConfig, BatchResults},
    runner::{BattleRunner, RunnerConfig},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "battle_headless")]
#[command(about = "Headless battle runner for balance testing and determinism checks")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single battle
    Run {
        /// Built-in scenario name or scenario file
        #[arg(short, long, default_value = "skirmish")]
        scenario: String,

        /// Jitter seed (no jitter without one)
        #[arg(long)]
        seed: Option<u64>,

        /// Spawn jitter in world units
        #[arg(long, default_value = "24")]
        jitter: i32,

        /// Write JSON-line snapshots to this file
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Ticks between snapshots
        #[arg(long, default_value = "60")]
        every: u64,

        /// Write the final snapshot as bincode to this file
        #[arg(long)]
        final_state: Option<PathBuf>,
    },

    /// Run a batch of battles for balance testing
    Batch {
        /// Built-in scenario name or scenario file
        #[arg(short, long, default_value = "skirmish")]
        scenario: String,

        /// Number of battles to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel battles (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Base seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Spawn jitter in world units
        #[arg(long, default_value = "24")]
        jitter: i32,

        /// Allowed deviation of win rates from 50%
        #[arg(long, default_value = "0.1")]
        threshold: f64,
    },

    /// Summarize saved batch results
    Summary {
        /// Batch results JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Allowed deviation of win rates from 50%
        #[arg(long, default_value = "0.1")]
        threshold: f64,
    },

    /// Verify determinism by running the same seed multiple times
    Verify {
        /// Built-in scenario name or scenario file
        #[arg(short, long, default_value = "skirmish")]
        scenario: String,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Spawn jitter in world units
        #[arg(long, default_value = "24")]
        jitter: i32,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// List unit types
    Units {
        /// Extra RON template file
        #[arg(short, long)]
        templates: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            seed,
            jitter,
            snapshots,
            every,
            final_state,
        } => cmd_run(&scenario, seed, jitter, snapshots, every, final_state),
        Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
            jitter,
            threshold,
        } => cmd_batch(scenario, count, parallel, output, seed, jitter, threshold),
        Commands::Summary { input, threshold } => cmd_summary(&input, threshold),
        Commands::Verify {
            scenario,
            seed,
            jitter,
            runs,
        } => cmd_verify(&scenario, seed, jitter, runs),
        Commands::Units { templates } => cmd_units(templates),
    };

    if let Err(message) = result {
        tracing::error!("{message}");
        std::process::exit(1);
    }
}

/// Run a single battle
fn cmd_run(
    scenario: &str,
    seed: Option<u64>,
    jitter: i32,
    snapshots: Option<PathBuf>,
    every: u64,
    final_state: Option<PathBuf>,
) -> Result<(), String> {
    let scenario = Scenario::resolve(scenario).map_err(|e| e.to_string())?;
    let templates = scenario.registry().map_err(|e| e.to_string())?;
    tracing::info!(scenario = %scenario.name, seed = ?seed, "Running battle");

    let runner = BattleRunner::new(RunnerConfig {
        battle_id: scenario.name.clone(),
        seed,
        jitter,
        snapshot_every: Some(every),
        record_hashes: false,
    });

    let report = match snapshots {
        Some(path) => {
            let file = File::create(&path)
                .map_err(|e| format!("Cannot create '{}': {e}", path.display()))?;
            let mut out = BufWriter::new(file);
            let report = runner
                .run_with(&scenario, &templates, Some(&mut out as &mut dyn Write))
                .map_err(|e| e.to_string())?;
            out.flush().map_err(|e| e.to_string())?;
            report
        }
        None => runner
            .run_with(&scenario, &templates, None)
            .map_err(|e| e.to_string())?,
    };

    if let Some(path) = final_state {
        let bytes = report.final_snapshot.to_bytes().map_err(|e| e.to_string())?;
        std::fs::write(&path, bytes)
            .map_err(|e| format!("Cannot write '{}': {e}", path.display()))?;
        tracing::info!(path = %path.display(), "Final state written");
    }

    let json = serde_json::to_string_pretty(&report.metrics).map_err(|e| e.to_string())?;
    println!("{json}");

    eprintln!(
        "Outcome: {:?} after {} ticks ({:.2}s)",
        report.metrics.outcome, report.metrics.duration_ticks, report.metrics.elapsed_seconds
    );
    Ok(())
}

/// Run batch of battles for balance testing
fn cmd_batch(
    scenario: String,
    count: u32,
    parallel: u32,
    output: PathBuf,
    seed: u64,
    jitter: i32,
    threshold: f64,
) -> Result<(), String> {
    let num_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);

    tracing::info!(
        scenario = %scenario,
        count,
        parallel,
        seed,
        jitter,
        output = %output.display(),
        cpus_available = num_cpus,
        "Batch configuration"
    );

    std::fs::create_dir_all(&output)
        .map_err(|e| format!("Cannot create output directory '{}': {e}", output.display()))?;

    let config = BatchConfig::new(&scenario, count)
        .with_output(output.clone())
        .with_seed(seed)
        .with_jitter(jitter)
        .with_parallelism(parallel);
    let results = run_batch(config).map_err(|e| e.to_string())?;

    let results_path = output.join("batch_results.json");
    results
        .save(&results_path)
        .map_err(|e| format!("Failed to save results: {e}"))?;

    print_summary(&results, threshold);
    eprintln!("\nResults saved to: {}", results_path.display());
    Ok(())
}

/// Summarize saved batch results
fn cmd_summary(input: &Path, threshold: f64) -> Result<(), String> {
    tracing::info!("Loading batch results from: {}", input.display());
    let results = BatchResults::load(input).map_err(|e| format!("Failed to load results: {e}"))?;
    print_summary(&results, threshold);
    Ok(())
}

fn print_summary(results: &BatchResults, threshold: f64) {
    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE: {}", results.config.scenario);
    eprintln!("{}", "=".repeat(50));
    eprintln!("Battles played: {}", results.battles.len());
    if !results.errors.is_empty() {
        eprintln!("Battles FAILED: {}", results.errors.len());
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!(
        "Throughput: {:.1} battles/sec",
        results.battles.len() as f64 / results.duration_seconds.max(0.001)
    );
    eprintln!(
        "Battle length: avg {:.0} ticks (min {}, max {})",
        summary.avg_duration_ticks, summary.min_duration_ticks, summary.max_duration_ticks
    );
    eprintln!("\nWin Rates:");
    for (team, rate) in &summary.win_rates {
        let survivors = summary.avg_survivors.get(team).copied().unwrap_or(0.0);
        eprintln!("  {team}: {:.1}% (avg survivors {survivors:.1})", rate * 100.0);
    }
    eprintln!("  timeouts: {}", summary.draws);

    if !summary.losses_by_unit_type.is_empty() {
        eprintln!("\nLosses by unit type:");
        for (unit_type, lost) in &summary.losses_by_unit_type {
            eprintln!("  {unit_type:<16} {lost}");
        }
    }

    if let Some(team) = summary.dominant_team(threshold) {
        eprintln!("\nBalance: {team} dominates (threshold {threshold})");
    } else if summary.is_balanced(threshold) {
        eprintln!("\nBalance: within {threshold} of even");
    }

    if !results.errors.is_empty() {
        eprintln!("\nBATTLE FAILURES:");
        for error in results.errors.iter().take(10) {
            eprintln!(
                "  Battle {} (seed {}): {}",
                error.battle_index, error.seed, error.message
            );
        }
        if results.errors.len() > 10 {
            eprintln!("  ... and {} more failures", results.errors.len() - 10);
        }
    }
}

/// Verify determinism
fn cmd_verify(scenario: &str, seed: u64, jitter: i32, runs: u32) -> Result<(), String> {
    tracing::info!(
        "Verifying determinism: {} with seed {} ({} runs)",
        scenario,
        seed,
        runs
    );
    let scenario = Scenario::resolve(scenario).map_err(|e| e.to_string())?;
    let check = verify_determinism(&scenario, seed, jitter, runs).map_err(|e| e.to_string())?;

    if check.is_deterministic() {
        eprintln!(
            "PASS: All {} runs produced identical hashes over {} ticks (final {:016x})",
            check.runs, check.ticks, check.final_hash
        );
        Ok(())
    } else {
        Err(format!(
            "FAIL: Non-determinism detected at tick {}",
            check.first_divergence.unwrap_or_default()
        ))
    }
}

/// List unit types
fn cmd_units(templates: Option<PathBuf>) -> Result<(), String> {
    let mut registry = TemplateRegistry::builtin();
    if let Some(path) = templates {
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| format!("Cannot read '{}': {e}", path.display()))?;
        registry
            .load_ron_str(&path.display().to_string(), &contents)
            .map_err(|e| e.to_string())?;
    }
    registry.validate().map_err(|e| e.to_string())?;

    println!("{:<16} {:>7} {:>6} {:>7} {:>7}", "unit", "health", "speed", "range", "damage");
    for unit_type in registry.unit_types() {
        let Ok(template) = registry.get(unit_type) else {
            continue;
        };
        let (range, damage) = template
            .attack
            .as_ref()
            .map_or((0.0, 0.0), |a| (a.range.to_num::<f64>(), a.damage.to_num::<f64>()));
        println!(
            "{:<16} {:>7.1} {:>6.1} {:>7.1} {:>7.1}",
            unit_type,
            template.health.to_num::<f64>(),
            template.speed.to_num::<f64>(),
            range,
            damage
        );
    }
    Ok(())
}
